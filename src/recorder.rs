//! Recorded-output side channel and its plain-text rendering.
//!
//! Domain handlers append `(category, content)` pairs during a run; after
//! interpretation the orchestrator renders the list into the
//! indentation-sensitive text block fed to the final LLM prompt.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::sync::Mutex;

/// One recorded entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOutput {
    pub category: String,
    pub content: Value,
}

/// Thread-safe, ordered collection of recorded outputs.
///
/// Safe to call from concurrently-running Task handlers; entries keep
/// their append order.
#[derive(Debug, Default)]
pub struct OutputRecorder {
    entries: Mutex<Vec<RecordedOutput>>,
}

/// Nesting depth past which rendering emits the `∞` sentinel, keeping
/// output bounded for pathological nesting.
const MAX_DEPTH: usize = 16;

const DEPTH_SENTINEL: &str = "∞";

impl OutputRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, category: impl Into<String>, content: Value) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(RecordedOutput {
            category: category.into(),
            content,
        });
    }

    /// Snapshot of the entries in append order.
    pub fn entries(&self) -> Vec<RecordedOutput> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Renders all entries: simple contents inline after their category,
    /// composites descending with tab indentation, homogeneous rows as a
    /// column-header table, and temporals as `yyyy-MM-dd HH:mm:ssK`.
    pub fn render(&self) -> String {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = String::new();
        for entry in entries.iter() {
            if is_simple(&entry.content) {
                out.push_str(&format!(
                    "{}: {}\n",
                    entry.category,
                    scalar_text(&entry.content)
                ));
            } else {
                out.push_str(&format!("{}:\n", entry.category));
                render_value(&mut out, &entry.content, 1);
            }
        }
        out
    }
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push('\t');
    }
    out.push_str(text);
    out.push('\n');
}

fn render_value(out: &mut String, value: &Value, depth: usize) {
    if depth > MAX_DEPTH {
        line(out, depth, DEPTH_SENTINEL);
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if is_simple(child) {
                    line(out, depth, &format!("{key}: {}", scalar_text(child)));
                } else {
                    line(out, depth, &format!("{key}:"));
                    render_value(out, child, depth + 1);
                }
            }
        }
        Value::Array(items) => {
            if let Some(columns) = table_columns(items) {
                line(out, depth, &columns.join("\t"));
                for item in items {
                    if let Value::Object(row) = item {
                        let cells: Vec<String> = columns
                            .iter()
                            .map(|c| row.get(c).map(scalar_text).unwrap_or_default())
                            .collect();
                        line(out, depth + 1, &cells.join("\t"));
                    }
                }
            } else {
                for item in items {
                    if is_simple(item) {
                        line(out, depth, &scalar_text(item));
                    } else {
                        render_value(out, item, depth + 1);
                    }
                }
            }
        }
        scalar => line(out, depth, &scalar_text(scalar)),
    }
}

/// A sequence renders as a table when it is a non-empty run of objects
/// sharing one key set whose values are all simple.
fn table_columns(items: &[Value]) -> Option<Vec<String>> {
    let first = match items.first() {
        Some(Value::Object(map)) if !map.is_empty() => map,
        _ => return None,
    };
    let columns: Vec<String> = first.keys().cloned().collect();
    for item in items {
        let Value::Object(map) = item else {
            return None;
        };
        if map.len() != columns.len() || !columns.iter().all(|c| map.get(c).is_some_and(is_simple))
        {
            return None;
        }
    }
    Some(columns)
}

fn is_simple(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => match parse_rendered_timestamp(s) {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%SZ").to_string(),
            None => s.clone(),
        },
        _ => String::new(),
    }
}

/// Strings only count as temporal when they carry a full date-time; bare
/// dates and arbitrary text stay verbatim.
fn parse_rendered_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if !text.contains('T') {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
