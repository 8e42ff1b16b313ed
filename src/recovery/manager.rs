use super::integrity::{checkpoint_violations, CheckpointViolation};
use super::restore::restore_from_checkpoint;
use super::retention::{select_expired_checkpoints, RetentionPolicy};
use super::stats::CheckpointStats;
use super::RecoveryError;
use crate::checkpoint::model::{ERROR_KEY, REASON_KEY, SEQUENCE_KEY};
use crate::checkpoint::{Checkpoint, CheckpointReason, CheckpointStore};
use crate::plan::Plan;
use crate::shared::ids::{CheckpointId, PlanId, StepId, ID_MAX_GENERATION_ATTEMPTS};
use crate::shared::logging::record_event;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Snapshots plan progress into a [`CheckpointStore`] and turns stored
/// snapshots back into plan state.
///
/// The store is injected; the manager holds no other shared state, so one
/// instance can serve many plans concurrently.
#[derive(Clone)]
pub struct RecoveryManager {
    store: Arc<dyn CheckpointStore>,
    event_log: Option<PathBuf>,
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("event_log", &self.event_log)
            .finish_non_exhaustive()
    }
}

impl RecoveryManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            event_log: None,
        }
    }

    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.event_log = Some(path.into());
        self
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn event_log(&self) -> Option<&Path> {
        self.event_log.as_deref()
    }

    /// Builds a checkpoint without persisting it. Every id in `completed_steps`
    /// must belong to `plan`.
    pub fn create_checkpoint(
        &self,
        plan: &Plan,
        completed_steps: &[StepId],
        metadata: Map<String, Value>,
        now: i64,
    ) -> Result<Checkpoint, RecoveryError> {
        let id = CheckpointId::generate(now).map_err(RecoveryError::IdAllocation)?;
        let checkpoint = Checkpoint::new(
            id,
            plan.id.clone(),
            completed_steps.iter().cloned(),
            now,
            metadata,
        );
        let unknown = checkpoint_violations(&checkpoint, plan, now)
            .into_iter()
            .filter(|violation| matches!(violation, CheckpointViolation::UnknownStep { .. }))
            .collect::<Vec<_>>();
        if !unknown.is_empty() {
            return Err(RecoveryError::CheckpointIntegrityViolation {
                checkpoint_id: checkpoint.id().clone(),
                violations: unknown,
            });
        }
        Ok(checkpoint)
    }

    /// Creates and persists a checkpoint tagged with `reason` and the next
    /// logical `sequence` for the plan (unless `metadata` already carries one).
    pub fn create_recovery_point(
        &self,
        plan: &Plan,
        completed_steps: &[StepId],
        reason: CheckpointReason,
        mut metadata: Map<String, Value>,
        now: i64,
    ) -> Result<Checkpoint, RecoveryError> {
        metadata.insert(
            REASON_KEY.to_string(),
            Value::String(reason.as_str().to_string()),
        );
        if !metadata.contains_key(SEQUENCE_KEY) {
            let next_sequence = self
                .get_latest_checkpoint(&plan.id)?
                .map(|latest| latest.sequence() + 1)
                .unwrap_or(1);
            metadata.insert(SEQUENCE_KEY.to_string(), Value::from(next_sequence));
        }

        for _ in 0..ID_MAX_GENERATION_ATTEMPTS {
            let checkpoint =
                self.create_checkpoint(plan, completed_steps, metadata.clone(), now)?;
            if self.store.load(checkpoint.id().as_str())?.is_some() {
                continue;
            }
            self.save_checkpoint(&checkpoint)?;
            record_event(
                self.event_log(),
                "checkpoint.created",
                &[
                    ("checkpoint_id", Value::from(checkpoint.id().as_str())),
                    ("plan_id", Value::from(plan.id.as_str())),
                    ("reason", Value::from(reason.as_str())),
                    ("completed", Value::from(checkpoint.completed_steps().len())),
                ],
            );
            return Ok(checkpoint);
        }
        Err(RecoveryError::IdAllocation(format!(
            "failed to allocate unique checkpoint id after {ID_MAX_GENERATION_ATTEMPTS} attempts"
        )))
    }

    /// Recovery point taken because a step failed; embeds the error message.
    pub fn create_error_recovery_point(
        &self,
        plan: &Plan,
        completed_steps: &[StepId],
        error: &str,
        mut metadata: Map<String, Value>,
        now: i64,
    ) -> Result<Checkpoint, RecoveryError> {
        metadata.insert(ERROR_KEY.to_string(), Value::String(error.to_string()));
        self.create_recovery_point(
            plan,
            completed_steps,
            CheckpointReason::ErrorRecovery,
            metadata,
            now,
        )
    }

    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), RecoveryError> {
        let body = checkpoint
            .to_json()
            .map_err(|source| RecoveryError::Serialize {
                checkpoint_id: checkpoint.id().clone(),
                source,
            })?;
        self.store.save(checkpoint.id().as_str(), &body)?;
        Ok(())
    }

    pub fn load_checkpoint(
        &self,
        checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>, RecoveryError> {
        let Some(raw) = self.store.load(checkpoint_id)? else {
            return Ok(None);
        };
        parse_stored(checkpoint_id, &raw).map(Some)
    }

    pub fn delete_checkpoint(&self, checkpoint_id: &str) -> Result<bool, RecoveryError> {
        let removed = self.store.delete(checkpoint_id)?;
        if removed {
            record_event(
                self.event_log(),
                "checkpoint.deleted",
                &[("checkpoint_id", Value::from(checkpoint_id))],
            );
        }
        Ok(removed)
    }

    /// All stored checkpoints for `plan_id`, oldest first.
    ///
    /// A malformed entry fails the scan unless its `planId` names another plan;
    /// such entries are skipped and logged as `checkpoint.skipped`.
    pub fn get_previous_checkpoints(
        &self,
        plan_id: &PlanId,
    ) -> Result<Vec<Checkpoint>, RecoveryError> {
        let mut checkpoints = Vec::new();
        for key in self.store.list()? {
            let Some(raw) = self.store.load(&key)? else {
                continue;
            };
            let checkpoint = match parse_stored(&key, &raw) {
                Ok(checkpoint) => checkpoint,
                Err(err) => match stored_plan_id(&raw) {
                    Some(owner) if owner != plan_id.as_str() => {
                        record_event(
                            self.event_log(),
                            "checkpoint.skipped",
                            &[
                                ("checkpoint_id", Value::from(key.as_str())),
                                ("plan_id", Value::from(owner)),
                                ("error", Value::from(err.to_string())),
                            ],
                        );
                        continue;
                    }
                    _ => return Err(err),
                },
            };
            if checkpoint.plan_id() == plan_id {
                checkpoints.push(checkpoint);
            }
        }
        checkpoints.sort_by(Checkpoint::chronological_cmp);
        Ok(checkpoints)
    }

    pub fn get_latest_checkpoint(
        &self,
        plan_id: &PlanId,
    ) -> Result<Option<Checkpoint>, RecoveryError> {
        Ok(self.get_previous_checkpoints(plan_id)?.pop())
    }

    /// Loads, validates and applies the latest checkpoint for `plan`.
    ///
    /// Returns `Ok(None)` when nothing has been stored yet (the plan is left as
    /// is) and `CheckpointIntegrityViolation` when the latest checkpoint does not
    /// fit the plan (the plan is left as is).
    pub fn prepare_resume(
        &self,
        plan: &mut Plan,
        now: i64,
    ) -> Result<Option<Checkpoint>, RecoveryError> {
        let Some(checkpoint) = self.get_latest_checkpoint(&plan.id)? else {
            return Ok(None);
        };
        let violations = checkpoint_violations(&checkpoint, plan, now);
        if !violations.is_empty() {
            return Err(RecoveryError::CheckpointIntegrityViolation {
                checkpoint_id: checkpoint.id().clone(),
                violations,
            });
        }
        restore_from_checkpoint(&checkpoint, plan, now);
        record_event(
            self.event_log(),
            "checkpoint.restored",
            &[
                ("checkpoint_id", Value::from(checkpoint.id().as_str())),
                ("plan_id", Value::from(plan.id.as_str())),
                ("completed", Value::from(checkpoint.completed_steps().len())),
            ],
        );
        Ok(Some(checkpoint))
    }

    /// Deletes the checkpoints `policy` marks as expired and returns their ids.
    pub fn cleanup_old_checkpoints(
        &self,
        plan_id: &PlanId,
        policy: RetentionPolicy,
        now: i64,
    ) -> Result<Vec<CheckpointId>, RecoveryError> {
        if policy.is_noop() {
            return Ok(Vec::new());
        }
        let chronological = self.get_previous_checkpoints(plan_id)?;
        let expired = select_expired_checkpoints(&chronological, policy, now);
        for checkpoint_id in &expired {
            self.delete_checkpoint(checkpoint_id.as_str())?;
        }
        Ok(expired)
    }

    pub fn get_checkpoint_stats(
        &self,
        plan_id: &PlanId,
        now: i64,
    ) -> Result<CheckpointStats, RecoveryError> {
        let checkpoints = self.get_previous_checkpoints(plan_id)?;
        Ok(CheckpointStats::from_checkpoints(&checkpoints, now))
    }

    pub fn export_checkpoint(&self, checkpoint_id: &str) -> Result<String, RecoveryError> {
        let checkpoint = self.load_checkpoint(checkpoint_id)?.ok_or_else(|| {
            RecoveryError::CheckpointNotFound {
                checkpoint_id: checkpoint_id.to_string(),
            }
        })?;
        checkpoint
            .to_json()
            .map_err(|source| RecoveryError::Serialize {
                checkpoint_id: checkpoint.id().clone(),
                source,
            })
    }

    /// Parses an exported document and stores it under its own id. Nothing is
    /// written when the document is malformed.
    pub fn import_checkpoint(&self, raw: &str) -> Result<Checkpoint, RecoveryError> {
        let checkpoint =
            Checkpoint::from_json(raw).map_err(RecoveryError::InvalidCheckpointFormat)?;
        self.save_checkpoint(&checkpoint)?;
        record_event(
            self.event_log(),
            "checkpoint.imported",
            &[
                ("checkpoint_id", Value::from(checkpoint.id().as_str())),
                ("plan_id", Value::from(checkpoint.plan_id().as_str())),
            ],
        );
        Ok(checkpoint)
    }
}

/// Reads `planId` from a document that may not parse as a checkpoint.
fn stored_plan_id(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    value.get("planId")?.as_str().map(str::to_string)
}

fn parse_stored(key: &str, raw: &str) -> Result<Checkpoint, RecoveryError> {
    Checkpoint::from_json(raw).map_err(|reason| {
        RecoveryError::InvalidCheckpointFormat(format!("stored entry `{key}`: {reason}"))
    })
}
