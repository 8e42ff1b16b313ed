use crate::shared::ids::{CheckpointId, PlanId, StepId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

pub const REASON_KEY: &str = "reason";
pub const SEQUENCE_KEY: &str = "sequence";
pub const ERROR_KEY: &str = "error";

/// Why a checkpoint was taken. Stored under `metadata.reason`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointReason {
    Periodic,
    ErrorRecovery,
    Cancelled,
    Completed,
    Custom(String),
}

impl CheckpointReason {
    pub fn as_str(&self) -> &str {
        match self {
            CheckpointReason::Periodic => "periodic",
            CheckpointReason::ErrorRecovery => "error_recovery",
            CheckpointReason::Cancelled => "cancelled",
            CheckpointReason::Completed => "completed",
            CheckpointReason::Custom(value) => value,
        }
    }
}

impl std::fmt::Display for CheckpointReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of which steps of a plan had completed at `timestamp`.
///
/// Serializes to the interchange shape
/// `{ id, planId, completedSteps, timestamp, metadata }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    id: CheckpointId,
    plan_id: PlanId,
    completed_steps: Vec<StepId>,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl Checkpoint {
    /// Duplicate completed ids are dropped, first occurrence wins.
    pub fn new(
        id: CheckpointId,
        plan_id: PlanId,
        completed_steps: impl IntoIterator<Item = StepId>,
        timestamp: i64,
        metadata: Map<String, Value>,
    ) -> Self {
        let mut unique: Vec<StepId> = Vec::new();
        for step_id in completed_steps {
            if !unique.contains(&step_id) {
                unique.push(step_id);
            }
        }
        Self {
            id,
            plan_id,
            completed_steps: unique,
            timestamp,
            metadata,
        }
    }

    pub fn id(&self) -> &CheckpointId {
        &self.id
    }

    pub fn plan_id(&self) -> &PlanId {
        &self.plan_id
    }

    pub fn completed_steps(&self) -> &[StepId] {
        &self.completed_steps
    }

    pub fn is_completed(&self, step_id: &str) -> bool {
        self.completed_steps
            .iter()
            .any(|completed| completed.as_str() == step_id)
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn reason(&self) -> Option<&str> {
        self.metadata.get(REASON_KEY).and_then(Value::as_str)
    }

    /// Logical sequence assigned when the checkpoint was persisted; 0 if absent.
    pub fn sequence(&self) -> u64 {
        self.metadata
            .get(SEQUENCE_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Chronological order with `sequence` and then `id` breaking timestamp ties.
    pub fn chronological_cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.sequence().cmp(&other.sequence()))
            .then_with(|| self.id.cmp(&other.id))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses an interchange document. `id` and `planId` must be strings and
    /// `completedSteps` an array; `timestamp` defaults to 0 and `metadata` to `{}`.
    pub fn from_json(raw: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(raw).map_err(|err| format!("not valid json: {err}"))?;
        let Some(object) = value.as_object() else {
            return Err("checkpoint must be a json object".to_string());
        };
        for field in ["id", "planId"] {
            if !object.get(field).is_some_and(Value::is_string) {
                return Err(format!("`{field}` must be present as a string"));
            }
        }
        if !object.get("completedSteps").is_some_and(Value::is_array) {
            return Err("`completedSteps` must be present as an array".to_string());
        }
        if object
            .get("timestamp")
            .is_some_and(|timestamp| !timestamp.is_i64())
        {
            return Err("`timestamp` must be an integer epoch-ms value".to_string());
        }
        if object
            .get("metadata")
            .is_some_and(|metadata| !metadata.is_object())
        {
            return Err("`metadata` must be an object".to_string());
        }
        let parsed: Checkpoint = serde_json::from_value(value).map_err(|err| err.to_string())?;
        Ok(Self::new(
            parsed.id,
            parsed.plan_id,
            parsed.completed_steps,
            parsed.timestamp,
            parsed.metadata,
        ))
    }
}
