use crate::checkpoint::Checkpoint;
use serde::Serialize;

/// Observability summary of one plan's stored checkpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointStats {
    pub count: usize,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
    pub average_age_ms: Option<f64>,
}

impl CheckpointStats {
    pub fn from_checkpoints(checkpoints: &[Checkpoint], now: i64) -> Self {
        if checkpoints.is_empty() {
            return Self::default();
        }
        let total_age: f64 = checkpoints
            .iter()
            .map(|checkpoint| now.saturating_sub(checkpoint.timestamp()) as f64)
            .sum();
        Self {
            count: checkpoints.len(),
            oldest_timestamp: checkpoints.iter().map(Checkpoint::timestamp).min(),
            newest_timestamp: checkpoints.iter().map(Checkpoint::timestamp).max(),
            average_age_ms: Some(total_age / checkpoints.len() as f64),
        }
    }
}
