pub mod integrity;
pub mod manager;
pub mod restore;
pub mod retention;
pub mod stats;

pub use integrity::{
    checkpoint_violations, ensure_valid_checkpoint, repair_checkpoint, validate_checkpoint,
    CheckpointViolation,
};
pub use manager::RecoveryManager;
pub use restore::{get_remaining_steps, restore_from_checkpoint};
pub use retention::{select_expired_checkpoints, RetentionPolicy};
pub use stats::CheckpointStats;

use crate::checkpoint::CheckpointStoreError;
use crate::shared::ids::CheckpointId;

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("checkpoint `{checkpoint_id}` not found")]
    CheckpointNotFound { checkpoint_id: String },
    #[error("invalid checkpoint format: {0}")]
    InvalidCheckpointFormat(String),
    #[error(
        "checkpoint `{checkpoint_id}` failed integrity validation: {}",
        join_violations(.violations)
    )]
    CheckpointIntegrityViolation {
        checkpoint_id: CheckpointId,
        violations: Vec<CheckpointViolation>,
    },
    #[error("failed to serialize checkpoint `{checkpoint_id}`: {source}")]
    Serialize {
        checkpoint_id: CheckpointId,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to allocate checkpoint id: {0}")]
    IdAllocation(String),
    #[error(transparent)]
    Store(#[from] CheckpointStoreError),
}

fn join_violations(violations: &[CheckpointViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
