use crate::checkpoint::CheckpointStoreError;
use crate::config::ConfigError;
use crate::orchestration::RunnerError;
use crate::plan::{PlanError, StepStatus};
use crate::recovery::RecoveryError;

/// How an orchestrator should surface a failure to its operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The plan itself is unusable (capacity, cycle, bad definition, unknown step).
    /// The operator must fix the plan.
    PlanInvalid,
    /// Recovery data is missing or damaged. The operator may need to restart the
    /// workflow from scratch.
    RecoveryDataDamaged,
    /// The checkpoint backend could not be reached or written.
    StoreUnavailable,
    /// Configuration could not be loaded.
    Configuration,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error(transparent)]
    Store(#[from] CheckpointStoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<RunnerError> for EngineError {
    fn from(value: RunnerError) -> Self {
        match value {
            RunnerError::StepNotRunnable { step_id, status } => {
                Self::Plan(PlanError::InvalidStepTransition {
                    step_id,
                    from: status,
                    to: StepStatus::Running,
                })
            }
            RunnerError::Plan(err) => Self::Plan(err),
            RunnerError::Recovery(err) => Self::Recovery(err),
        }
    }
}

impl EngineError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            EngineError::Plan(_) => FailureClass::PlanInvalid,
            EngineError::Recovery(err) => recovery_failure_class(err),
            EngineError::Store(err) => store_failure_class(err),
            EngineError::Config(ConfigError::Store(err)) => store_failure_class(err),
            EngineError::Config(_) => FailureClass::Configuration,
        }
    }
}

fn recovery_failure_class(error: &RecoveryError) -> FailureClass {
    match error {
        RecoveryError::Store(err) => store_failure_class(err),
        RecoveryError::CheckpointNotFound { .. }
        | RecoveryError::InvalidCheckpointFormat(_)
        | RecoveryError::CheckpointIntegrityViolation { .. }
        | RecoveryError::Serialize { .. }
        | RecoveryError::IdAllocation(_) => FailureClass::RecoveryDataDamaged,
    }
}

fn store_failure_class(error: &CheckpointStoreError) -> FailureClass {
    match error {
        CheckpointStoreError::Corrupt { .. } | CheckpointStoreError::Json { .. } => {
            FailureClass::RecoveryDataDamaged
        }
        _ => FailureClass::StoreUnavailable,
    }
}
