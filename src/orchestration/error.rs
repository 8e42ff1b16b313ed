use crate::plan::{PlanError, StepStatus};
use crate::recovery::RecoveryError;
use crate::shared::ids::StepId;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("step `{step_id}` is `{status}` and cannot be run; resume the plan first")]
    StepNotRunnable { step_id: StepId, status: StepStatus },
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}
