use super::model::{PlanConfig, StepType};
use super::PlanError;
use crate::shared::ids::PlanId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Declarative description of a plan, as authored by the orchestrator or loaded
/// from a YAML/JSON file. Nothing here is trusted until
/// [`validate_plan_definition`] has accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDefinition {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: Option<PlanConfig>,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Local name other steps use in `depends_on`; falls back to `name`.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub step_type: String,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
    #[serde(default, alias = "depends_on")]
    pub depends_on: Vec<String>,
}

impl StepDefinition {
    pub fn reference(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }
}

impl PlanDefinition {
    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn from_yaml_path(path: &Path) -> Result<Self, PlanError> {
        let raw = fs::read_to_string(path).map_err(|source| PlanError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw).map_err(|source| PlanError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

pub fn validate_plan_definition(definition: &PlanDefinition) -> Result<(), PlanError> {
    if definition.name.trim().is_empty() {
        return Err(invalid("plan `name` must be non-empty"));
    }
    if let Some(raw) = definition.id.as_deref() {
        PlanId::parse(raw).map_err(|err| invalid(format!("plan `id`: {err}")))?;
    }
    if definition.steps.is_empty() {
        return Err(invalid("plan must declare at least one step"));
    }
    if let Some(config) = definition.config.as_ref() {
        if config.max_steps == 0 {
            return Err(invalid("config.maxSteps must be >= 1"));
        }
    }

    let mut references = BTreeSet::new();
    for (index, step) in definition.steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(invalid(format!("steps[{index}] `name` must be non-empty")));
        }
        if StepType::parse(&step.step_type).is_none() {
            let allowed = StepType::ALL
                .iter()
                .map(|kind| kind.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(invalid(format!(
                "steps[{index}] `type` `{}` is not one of: {allowed}",
                step.step_type
            )));
        }
        if !references.insert(step.reference()) {
            return Err(invalid(format!(
                "steps[{index}] key `{}` is declared more than once",
                step.reference()
            )));
        }
    }

    for (index, step) in definition.steps.iter().enumerate() {
        for dependency in &step.depends_on {
            if !references.contains(dependency.as_str()) {
                return Err(invalid(format!(
                    "steps[{index}] depends on unknown step `{dependency}`"
                )));
            }
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> PlanError {
    PlanError::InvalidPlanDefinition(message.into())
}
