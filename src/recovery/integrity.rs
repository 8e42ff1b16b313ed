use super::RecoveryError;
use crate::checkpoint::Checkpoint;
use crate::plan::Plan;
use crate::shared::ids::{CheckpointId, PlanId, StepId};
use serde_json::Value;

pub const REPAIRED_FROM_KEY: &str = "repairedFrom";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointViolation {
    PlanMismatch { expected: PlanId, actual: PlanId },
    UnknownStep { step_id: StepId },
    NonPositiveTimestamp { timestamp: i64 },
    FutureTimestamp { timestamp: i64, now: i64 },
}

impl std::fmt::Display for CheckpointViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointViolation::PlanMismatch { expected, actual } => {
                write!(f, "plan id `{actual}` does not match plan `{expected}`")
            }
            CheckpointViolation::UnknownStep { step_id } => {
                write!(f, "completed step `{step_id}` is not part of the plan")
            }
            CheckpointViolation::NonPositiveTimestamp { timestamp } => {
                write!(f, "timestamp {timestamp} must be > 0")
            }
            CheckpointViolation::FutureTimestamp { timestamp, now } => {
                write!(f, "timestamp {timestamp} is later than now ({now})")
            }
        }
    }
}

/// Every reason `checkpoint` cannot be trusted for `plan` at time `now`.
pub fn checkpoint_violations(
    checkpoint: &Checkpoint,
    plan: &Plan,
    now: i64,
) -> Vec<CheckpointViolation> {
    let mut violations = Vec::new();
    if checkpoint.plan_id() != &plan.id {
        violations.push(CheckpointViolation::PlanMismatch {
            expected: plan.id.clone(),
            actual: checkpoint.plan_id().clone(),
        });
    }

    let known = plan.step_ids();
    for step_id in checkpoint.completed_steps() {
        if !known.contains(step_id.as_str()) {
            violations.push(CheckpointViolation::UnknownStep {
                step_id: step_id.clone(),
            });
        }
    }

    let timestamp = checkpoint.timestamp();
    if timestamp <= 0 {
        violations.push(CheckpointViolation::NonPositiveTimestamp { timestamp });
    } else if timestamp > now {
        violations.push(CheckpointViolation::FutureTimestamp { timestamp, now });
    }
    violations
}

/// Never fails; the caller decides whether to discard, repair or halt.
pub fn validate_checkpoint(checkpoint: &Checkpoint, plan: &Plan, now: i64) -> bool {
    checkpoint_violations(checkpoint, plan, now).is_empty()
}

pub fn ensure_valid_checkpoint(
    checkpoint: &Checkpoint,
    plan: &Plan,
    now: i64,
) -> Result<(), RecoveryError> {
    let violations = checkpoint_violations(checkpoint, plan, now);
    if violations.is_empty() {
        return Ok(());
    }
    Err(RecoveryError::CheckpointIntegrityViolation {
        checkpoint_id: checkpoint.id().clone(),
        violations,
    })
}

/// Derives a new checkpoint that keeps only completed ids known to `plan` and
/// clamps an untrustworthy timestamp to `now`. The original is left untouched
/// and the result is not persisted. A checkpoint for another plan cannot be
/// repaired.
pub fn repair_checkpoint(
    checkpoint: &Checkpoint,
    plan: &Plan,
    now: i64,
) -> Result<Checkpoint, RecoveryError> {
    let violations = checkpoint_violations(checkpoint, plan, now);
    if violations
        .iter()
        .any(|violation| matches!(violation, CheckpointViolation::PlanMismatch { .. }))
    {
        return Err(RecoveryError::CheckpointIntegrityViolation {
            checkpoint_id: checkpoint.id().clone(),
            violations,
        });
    }

    let known = plan.step_ids();
    let completed = checkpoint
        .completed_steps()
        .iter()
        .filter(|step_id| known.contains(step_id.as_str()))
        .cloned()
        .collect::<Vec<_>>();
    let timestamp = if checkpoint.timestamp() > 0 && checkpoint.timestamp() <= now {
        checkpoint.timestamp()
    } else {
        now
    };
    let mut metadata = checkpoint.metadata().clone();
    metadata.insert(
        REPAIRED_FROM_KEY.to_string(),
        Value::String(checkpoint.id().to_string()),
    );
    let id = CheckpointId::generate(now).map_err(RecoveryError::IdAllocation)?;
    Ok(Checkpoint::new(
        id,
        plan.id.clone(),
        completed,
        timestamp,
        metadata,
    ))
}
