pub mod builder;
pub mod definition;
pub mod graph;
pub mod model;

pub use builder::{add_dependency, add_step, build_plan, build_plan_with_defaults, create_plan};
pub use definition::{validate_plan_definition, PlanDefinition, StepDefinition};
pub use graph::{execution_batches, resolve_dependencies, StepGraph};
pub use model::{Plan, PlanConfig, Step, StepInput, StepStatus, StepType};

use crate::shared::ids::StepId;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan capacity exceeded: plan already holds the maximum of {max_steps} steps")]
    PlanCapacityExceeded { max_steps: usize },
    #[error("step `{step_id}` not found in plan")]
    StepNotFound { step_id: String },
    #[error("adding dependency `{dependent}` -> `{dependency}` would create a cycle")]
    CircularDependency {
        dependent: StepId,
        dependency: StepId,
    },
    #[error("circular dependency detected at step `{step_id}` while resolving execution order")]
    CircularDependencyDetected { step_id: StepId },
    #[error("step id `{step_id}` appears more than once in plan")]
    DuplicateStepId { step_id: StepId },
    #[error("invalid plan definition: {0}")]
    InvalidPlanDefinition(String),
    #[error("step `{step_id}` status transition `{from}` -> `{to}` is invalid")]
    InvalidStepTransition {
        step_id: StepId,
        from: StepStatus,
        to: StepStatus,
    },
    #[error("failed to allocate identifier: {0}")]
    IdAllocation(String),
    #[error("failed to read plan definition {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in plan definition {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
