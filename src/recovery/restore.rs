use crate::checkpoint::Checkpoint;
use crate::plan::{Plan, Step, StepStatus};
use std::collections::HashSet;

/// Steps of `plan` that `checkpoint` does not record as completed, in plan order.
pub fn get_remaining_steps<'p>(checkpoint: &Checkpoint, plan: &'p Plan) -> Vec<&'p Step> {
    let completed = completed_set(checkpoint);
    plan.steps
        .iter()
        .filter(|step| !completed.contains(step.id.as_str()))
        .collect()
}

/// Resets every step to `completed` or `pending` from the checkpoint alone.
///
/// In-memory `running`/`failed`/`paused` statuses were captured before the
/// interruption and are discarded, along with their partial results. Must not
/// run while steps of this plan are executing.
pub fn restore_from_checkpoint(checkpoint: &Checkpoint, plan: &mut Plan, now: i64) {
    let completed = completed_set(checkpoint);
    for step in &mut plan.steps {
        if completed.contains(step.id.as_str()) {
            step.status = StepStatus::Completed;
        } else {
            step.status = StepStatus::Pending;
            step.output = None;
            step.error = None;
            step.start_time = None;
            step.end_time = None;
        }
    }
    plan.touch(now);
}

fn completed_set(checkpoint: &Checkpoint) -> HashSet<&str> {
    checkpoint
        .completed_steps()
        .iter()
        .map(|step_id| step_id.as_str())
        .collect()
}
