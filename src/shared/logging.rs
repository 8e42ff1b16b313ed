use super::time::now_millis;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Appends one JSON object per line: `timestamp` (epoch ms), `event`, then `fields`.
pub fn append_event_line(
    path: &Path,
    event: &str,
    fields: &[(&str, Value)],
) -> Result<(), std::io::Error> {
    let mut payload = Map::new();
    payload.insert("timestamp".to_string(), Value::from(now_millis()));
    payload.insert("event".to_string(), Value::String(event.to_string()));
    for (key, value) in fields {
        payload.insert((*key).to_string(), value.clone());
    }

    let line = serde_json::to_string(&payload)
        .map_err(|source| std::io::Error::other(source.to_string()))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")
}

/// Best-effort variant for callers that must not fail on a broken log sink.
pub fn record_event(path: Option<&Path>, event: &str, fields: &[(&str, Value)]) {
    if let Some(path) = path {
        let _ = append_event_line(path, event, fields);
    }
}
