use crate::checkpoint::Checkpoint;
use crate::shared::ids::CheckpointId;
use serde::{Deserialize, Serialize};

/// Age/count retention rule for one plan's checkpoints.
///
/// The two limits are independent: a checkpoint is expired when it is older than
/// `max_age_ms` OR when it falls outside the newest `keep` checkpoints. `keep` is
/// therefore not a floor; with both limits set, an old enough checkpoint is
/// removed even if it is among the newest `keep`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionPolicy {
    pub max_age_ms: Option<u64>,
    pub keep: Option<usize>,
}

impl RetentionPolicy {
    pub fn keep_latest(keep: usize) -> Self {
        Self {
            max_age_ms: None,
            keep: Some(keep),
        }
    }

    pub fn max_age(max_age_ms: u64) -> Self {
        Self {
            max_age_ms: Some(max_age_ms),
            keep: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.max_age_ms.is_none() && self.keep.is_none()
    }
}

/// `chronological` must be sorted oldest first. Returned ids keep that order.
pub fn select_expired_checkpoints(
    chronological: &[Checkpoint],
    policy: RetentionPolicy,
    now: i64,
) -> Vec<CheckpointId> {
    let total = chronological.len();
    let outside_window = policy
        .keep
        .map(|keep| total.saturating_sub(keep))
        .unwrap_or(0);

    chronological
        .iter()
        .enumerate()
        .filter(|(index, checkpoint)| {
            let too_old = policy.max_age_ms.is_some_and(|max_age| {
                let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
                now.saturating_sub(checkpoint.timestamp()) > max_age
            });
            too_old || *index < outside_window
        })
        .map(|(_, checkpoint)| checkpoint.id().clone())
        .collect()
}
