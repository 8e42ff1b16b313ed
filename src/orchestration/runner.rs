use super::error::RunnerError;
use super::executor::StepExecutor;
use crate::checkpoint::{Checkpoint, CheckpointReason};
use crate::plan::{execution_batches, Plan, Step, StepStatus};
use crate::recovery::{RecoveryManager, RetentionPolicy};
use crate::shared::ids::StepId;
use crate::shared::logging::record_event;
use crate::shared::time::now_millis;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

pub const TIMEOUT_REASON: &str = "timeout";

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    /// The batch containing `failed_steps` ran to the end; later batches did not start.
    Failed {
        failed_steps: Vec<StepId>,
    },
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub batches_executed: usize,
    pub steps_executed: usize,
    /// Checkpoint written when the run stopped.
    pub checkpoint: Checkpoint,
}

/// Drives a plan batch by batch through a [`StepExecutor`], snapshotting
/// progress through a [`RecoveryManager`].
///
/// Completed steps are skipped, so running a restored plan resumes it. Failed
/// or still-running steps make `run` refuse the plan before anything changes;
/// `resume` resets them first.
#[derive(Debug, Clone)]
pub struct PlanRunner {
    manager: RecoveryManager,
    checkpoint_every_batches: u32,
    retention: Option<RetentionPolicy>,
    cancel: Option<Arc<AtomicBool>>,
}

impl PlanRunner {
    pub fn new(manager: RecoveryManager) -> Self {
        Self {
            manager,
            checkpoint_every_batches: 1,
            retention: None,
            cancel: None,
        }
    }

    pub fn with_checkpoint_every_batches(mut self, batches: u32) -> Self {
        self.checkpoint_every_batches = batches.max(1);
        self
    }

    /// Applied after the final checkpoint of every run.
    pub fn with_retention(mut self, policy: RetentionPolicy) -> Self {
        self.retention = Some(policy);
        self
    }

    /// Checked before each batch; once set, no further batch starts.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn manager(&self) -> &RecoveryManager {
        &self.manager
    }

    /// Restores `plan` from its latest checkpoint (if any) and runs what is left.
    pub fn resume<E>(&self, plan: &mut Plan, executor: &E) -> Result<RunReport, RunnerError>
    where
        E: StepExecutor + ?Sized,
    {
        self.manager.prepare_resume(plan, now_millis())?;
        self.run(plan, executor)
    }

    pub fn run<E>(&self, plan: &mut Plan, executor: &E) -> Result<RunReport, RunnerError>
    where
        E: StepExecutor + ?Sized,
    {
        let started_at = now_millis();
        ensure_runnable(plan)?;
        let batches = pending_batches(plan)?;
        let mut batches_executed = 0_usize;
        let mut steps_executed = 0_usize;
        let mut since_checkpoint = 0_u32;

        for (index, batch) in batches.iter().enumerate() {
            if self.is_cancelled() {
                let checkpoint = self.snapshot(plan, CheckpointReason::Cancelled, Map::new())?;
                record_event(
                    self.manager.event_log(),
                    "run.cancelled",
                    &[
                        ("plan_id", Value::from(plan.id.as_str())),
                        ("batch", Value::from(index)),
                    ],
                );
                return self.finish(
                    plan,
                    RunOutcome::Cancelled,
                    batches_executed,
                    steps_executed,
                    checkpoint,
                );
            }
            let elapsed = now_millis().saturating_sub(started_at);
            if u64::try_from(elapsed).unwrap_or(0) > plan.config.timeout_ms {
                let mut metadata = Map::new();
                metadata.insert("elapsedMs".to_string(), Value::from(elapsed));
                let checkpoint = self.snapshot(
                    plan,
                    CheckpointReason::Custom(TIMEOUT_REASON.to_string()),
                    metadata,
                )?;
                return self.finish(
                    plan,
                    RunOutcome::TimedOut,
                    batches_executed,
                    steps_executed,
                    checkpoint,
                );
            }

            record_event(
                self.manager.event_log(),
                "batch.started",
                &[
                    ("plan_id", Value::from(plan.id.as_str())),
                    ("batch", Value::from(index)),
                    ("steps", Value::from(batch.len())),
                ],
            );
            let now = now_millis();
            for step_id in batch {
                plan.mark_step_running(step_id.as_str(), now)?;
            }
            let steps: Vec<Step> = batch
                .iter()
                .filter_map(|step_id| plan.step(step_id.as_str()).cloned())
                .collect();
            let results = execute_batch(&steps, executor);

            let mut failures: Vec<(StepId, String)> = Vec::new();
            for (step_id, result) in results {
                let now = now_millis();
                match result {
                    Ok(output) => plan.mark_step_completed(step_id.as_str(), Some(output), now)?,
                    Err(error) => {
                        record_event(
                            self.manager.event_log(),
                            "step.failed",
                            &[
                                ("plan_id", Value::from(plan.id.as_str())),
                                ("step_id", Value::from(step_id.as_str())),
                                ("error", Value::from(error.as_str())),
                            ],
                        );
                        plan.mark_step_failed(step_id.as_str(), error.clone(), now)?;
                        failures.push((step_id, error));
                    }
                }
            }
            batches_executed += 1;
            steps_executed += steps.len();
            record_event(
                self.manager.event_log(),
                "batch.finished",
                &[
                    ("plan_id", Value::from(plan.id.as_str())),
                    ("batch", Value::from(index)),
                    ("failed", Value::from(failures.len())),
                ],
            );

            if let Some((first_step, first_error)) = failures.first() {
                let mut metadata = Map::new();
                metadata.insert(
                    "failedSteps".to_string(),
                    Value::Array(
                        failures
                            .iter()
                            .map(|(step_id, _)| Value::from(step_id.as_str()))
                            .collect(),
                    ),
                );
                let checkpoint = self.manager.create_error_recovery_point(
                    plan,
                    &plan.completed_step_ids(),
                    &format!("step `{first_step}` failed: {first_error}"),
                    metadata,
                    now_millis(),
                )?;
                let failed_steps = failures.into_iter().map(|(step_id, _)| step_id).collect();
                return self.finish(
                    plan,
                    RunOutcome::Failed { failed_steps },
                    batches_executed,
                    steps_executed,
                    checkpoint,
                );
            }

            since_checkpoint += 1;
            let is_last = index + 1 == batches.len();
            if since_checkpoint >= self.checkpoint_every_batches && !is_last {
                self.snapshot(plan, CheckpointReason::Periodic, Map::new())?;
                since_checkpoint = 0;
            }
        }

        let checkpoint = self.snapshot(plan, CheckpointReason::Completed, Map::new())?;
        self.finish(
            plan,
            RunOutcome::Completed,
            batches_executed,
            steps_executed,
            checkpoint,
        )
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|cancel| cancel.load(Ordering::Relaxed))
    }

    fn snapshot(
        &self,
        plan: &Plan,
        reason: CheckpointReason,
        metadata: Map<String, Value>,
    ) -> Result<Checkpoint, RunnerError> {
        Ok(self.manager.create_recovery_point(
            plan,
            &plan.completed_step_ids(),
            reason,
            metadata,
            now_millis(),
        )?)
    }

    fn finish(
        &self,
        plan: &Plan,
        outcome: RunOutcome,
        batches_executed: usize,
        steps_executed: usize,
        checkpoint: Checkpoint,
    ) -> Result<RunReport, RunnerError> {
        if let Some(policy) = self.retention {
            self.manager
                .cleanup_old_checkpoints(&plan.id, policy, now_millis())?;
        }
        Ok(RunReport {
            outcome,
            batches_executed,
            steps_executed,
            checkpoint,
        })
    }
}

/// Every unfinished step must be able to enter `running`.
fn ensure_runnable(plan: &Plan) -> Result<(), RunnerError> {
    let blocked = plan.steps.iter().find(|step| {
        step.status != StepStatus::Completed
            && !step.status.can_transition_to(StepStatus::Running)
    });
    match blocked {
        Some(step) => Err(RunnerError::StepNotRunnable {
            step_id: step.id.clone(),
            status: step.status,
        }),
        None => Ok(()),
    }
}

/// Execution batches restricted to steps that still need to run.
fn pending_batches(plan: &Plan) -> Result<Vec<Vec<StepId>>, RunnerError> {
    Ok(execution_batches(plan)?
        .into_iter()
        .map(|batch| {
            batch
                .into_iter()
                .filter(|step| step.status != StepStatus::Completed)
                .map(|step| step.id.clone())
                .collect::<Vec<_>>()
        })
        .filter(|batch| !batch.is_empty())
        .collect())
}

/// One scoped thread per step; a panicking executor fails only its own step.
fn execute_batch<E>(steps: &[Step], executor: &E) -> Vec<(StepId, Result<Value, String>)>
where
    E: StepExecutor + ?Sized,
{
    thread::scope(|scope| {
        let handles = steps
            .iter()
            .map(|step| scope.spawn(move || executor.execute(step)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .zip(steps)
            .map(|(handle, step)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err("step executor panicked".to_string()));
                (step.id.clone(), result)
            })
            .collect()
    })
}
