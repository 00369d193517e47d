//! Wait state delay computation.
//!
//! The four delay sources are honoured additively, in field order:
//! `Seconds`, then `SecondsPath`, then `Timestamp`, then `TimestampPath`.
//! Timestamps contribute only while they lie in the future.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

use crate::catalog::marshal::parse_timestamp;
use crate::definition::State;
use crate::paths::{lookup, parse_path, PathError};

pub(crate) fn wait_duration(
    state: &State,
    data: &Value,
    global: &Value,
    now: DateTime<Utc>,
) -> Result<Duration, PathError> {
    let mut total = Duration::ZERO;

    if let Some(seconds) = state.seconds {
        total += Duration::from_secs(seconds);
    }

    if let Some(path) = state.seconds_path.as_deref() {
        if let Some(seconds) = read_path(data, global, path)?.and_then(|v| as_seconds(&v)) {
            total += Duration::from_secs(seconds);
        }
    }

    if let Some(text) = state.timestamp.as_deref() {
        total += until(text, now);
    }

    if let Some(path) = state.timestamp_path.as_deref() {
        if let Some(Value::String(text)) = read_path(data, global, path)? {
            total += until(&text, now);
        }
    }

    Ok(total)
}

fn read_path(data: &Value, global: &Value, path: &str) -> Result<Option<Value>, PathError> {
    let segments = parse_path(path)?;
    Ok(lookup(data, &segments)
        .filter(|v| !v.is_null())
        .or_else(|| lookup(global, &segments))
        .cloned())
}

fn as_seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn until(text: &str, now: DateTime<Utc>) -> Duration {
    match parse_timestamp(text) {
        Some(instant) if instant > now => (instant - now).to_std().unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    }
}
