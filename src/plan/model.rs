use super::PlanError;
use crate::shared::ids::{PlanId, StepId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Action,
    AgentInit,
    ModelValidation,
    Checkpoint,
    Recovery,
}

impl StepType {
    pub const ALL: [StepType; 5] = [
        StepType::Action,
        StepType::AgentInit,
        StepType::ModelValidation,
        StepType::Checkpoint,
        StepType::Recovery,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepType::Action => "action",
            StepType::AgentInit => "agent_init",
            StepType::ModelValidation => "model_validation",
            StepType::Checkpoint => "checkpoint",
            StepType::Recovery => "recovery",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

impl StepStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Pending, StepStatus::Paused)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Failed)
                | (StepStatus::Running, StepStatus::Paused)
                | (StepStatus::Paused, StepStatus::Running)
                | (StepStatus::Paused, StepStatus::Pending)
                | (StepStatus::Failed, StepStatus::Pending)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Paused => write!(f, "paused"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: StepId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
    #[serde(default)]
    pub status: StepStatus,
    /// Insertion-ordered, duplicate-free.
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

/// Caller-supplied part of a step; id, status and dependencies are owned by the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInput {
    pub name: String,
    pub description: Option<String>,
    pub step_type: StepType,
    pub input: Option<Value>,
    pub config: Option<Map<String, Value>>,
}

impl StepInput {
    pub fn new(name: impl Into<String>, step_type: StepType) -> Self {
        Self {
            name: name.into(),
            description: None,
            step_type,
            input: None,
            config: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = Some(config);
        self
    }
}

fn default_max_steps() -> usize {
    100
}

fn default_timeout_ms() -> u64 {
    300_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

/// Execution limits declared on a plan. Retry fields are advisory: enforcing them
/// is the orchestrator's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(rename = "timeout", default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(rename = "retryDelay", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub config: PlanConfig,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Plan {
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id.as_str() == step_id)
    }

    pub fn index_of(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.id.as_str() == step_id)
    }

    pub fn contains_step(&self, step_id: &str) -> bool {
        self.index_of(step_id).is_some()
    }

    pub fn step_ids(&self) -> BTreeSet<&str> {
        self.steps.iter().map(|step| step.id.as_str()).collect()
    }

    /// Ids of completed steps, in plan order.
    pub fn completed_step_ids(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Completed)
            .map(|step| step.id.clone())
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.steps.iter().all(|step| step.status.is_terminal())
    }

    pub fn touch(&mut self, now: i64) {
        self.updated_at = self.updated_at.max(now);
    }

    pub fn mark_step_running(&mut self, step_id: &str, now: i64) -> Result<(), PlanError> {
        let step = self.transition_step(step_id, StepStatus::Running, now)?;
        step.start_time = Some(now);
        step.end_time = None;
        step.error = None;
        Ok(())
    }

    pub fn mark_step_completed(
        &mut self,
        step_id: &str,
        output: Option<Value>,
        now: i64,
    ) -> Result<(), PlanError> {
        let step = self.transition_step(step_id, StepStatus::Completed, now)?;
        step.output = output;
        step.end_time = Some(now);
        Ok(())
    }

    pub fn mark_step_failed(
        &mut self,
        step_id: &str,
        error: impl Into<String>,
        now: i64,
    ) -> Result<(), PlanError> {
        let step = self.transition_step(step_id, StepStatus::Failed, now)?;
        step.error = Some(error.into());
        step.end_time = Some(now);
        Ok(())
    }

    pub fn mark_step_paused(&mut self, step_id: &str, now: i64) -> Result<(), PlanError> {
        self.transition_step(step_id, StepStatus::Paused, now)?;
        Ok(())
    }

    /// Returns a failed or paused step to `pending` so the orchestrator can retry it.
    pub fn reset_step(&mut self, step_id: &str, now: i64) -> Result<(), PlanError> {
        let step = self.transition_step(step_id, StepStatus::Pending, now)?;
        step.start_time = None;
        step.end_time = None;
        Ok(())
    }

    fn transition_step(
        &mut self,
        step_id: &str,
        next: StepStatus,
        now: i64,
    ) -> Result<&mut Step, PlanError> {
        let index = self
            .index_of(step_id)
            .ok_or_else(|| PlanError::StepNotFound {
                step_id: step_id.to_string(),
            })?;
        let current = self.steps[index].status;
        if !current.can_transition_to(next) {
            return Err(PlanError::InvalidStepTransition {
                step_id: self.steps[index].id.clone(),
                from: current,
                to: next,
            });
        }
        self.touch(now);
        let step = &mut self.steps[index];
        step.status = next;
        Ok(step)
    }
}
