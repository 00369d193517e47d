//! Path-based reads, writes, and merging over `serde_json::Value`.
//!
//! Every value travelling through the interpreter is addressed with dotted
//! paths of the form `$` or `$.a.b.0.c`. Numeric segments index into
//! sequences; everything else is a map key. Writes are copy-on-write: the
//! caller receives a new root and rebinds.

use miette::Diagnostic;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised for syntactically invalid paths.
///
/// A *missed* lookup is not an error: reads resolve to `Value::Null` when
/// any segment is absent. Only malformed path strings are rejected.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    /// The path does not start with the `$` root marker.
    #[error("path '{path}' must start with '$'")]
    #[diagnostic(
        code(statesman::paths::missing_root),
        help("Paths are '$' or '$.segment(.segment)*'.")
    )]
    MissingRoot { path: String },

    /// The path contains an empty segment, e.g. `$.a..b` or a trailing dot.
    #[error("path '{path}' contains an empty segment")]
    #[diagnostic(code(statesman::paths::empty_segment))]
    EmptySegment { path: String },
}

/// Splits a path into its segments, validating the `$` prefix.
///
/// `$` alone yields no segments (the identity path).
pub fn parse_path(path: &str) -> Result<Vec<&str>, PathError> {
    if path == "$" {
        return Ok(Vec::new());
    }
    let Some(rest) = path.strip_prefix("$.") else {
        return Err(PathError::MissingRoot {
            path: path.to_string(),
        });
    };
    let segments: Vec<&str> = rest.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(PathError::EmptySegment {
            path: path.to_string(),
        });
    }
    Ok(segments)
}

/// Reads the value at `path`, returning `Value::Null` on any missed lookup
/// or out-of-range index.
///
/// # Examples
///
/// ```rust
/// use serde_json::json;
/// use statesman::paths::get_by_path;
///
/// let data = json!({"user": {"scores": [10, 20]}});
/// assert_eq!(get_by_path(&data, "$.user.scores.1").unwrap(), json!(20));
/// assert_eq!(get_by_path(&data, "$.user.missing").unwrap(), json!(null));
/// ```
pub fn get_by_path(value: &Value, path: &str) -> Result<Value, PathError> {
    let segments = parse_path(path)?;
    Ok(lookup(value, &segments).cloned().unwrap_or(Value::Null))
}

/// Borrowing lookup used internally to distinguish "absent" from an
/// explicit null when chaining current-data and accumulator roots.
pub(crate) fn lookup<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        match current {
            Value::Object(map) => current = map.get(*segment)?,
            Value::Array(seq) => {
                let index: usize = segment.parse().ok()?;
                current = seq.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Applies an `InputPath`: identity for `None`, empty, or `$`; otherwise a
/// read that resolves missing segments to null.
pub fn apply_input_path(value: &Value, path: Option<&str>) -> Result<Value, PathError> {
    match path {
        None | Some("") | Some("$") => Ok(value.clone()),
        Some(p) => get_by_path(value, p),
    }
}

/// Applies an `OutputPath`; same identity rules as [`apply_input_path`].
pub fn apply_output_path(value: &Value, path: Option<&str>) -> Result<Value, PathError> {
    apply_input_path(value, path)
}

/// Writes `value` at `path` inside a clone of `root` and returns the new
/// root. `$` (or an empty path) replaces the root outright.
///
/// Intermediate containers are materialised on the way down: maps for named
/// segments, sequences for numeric ones, with sequences padded by nulls up
/// to the target index. Existing non-container values along the path are
/// replaced.
///
/// # Examples
///
/// ```rust
/// use serde_json::json;
/// use statesman::paths::place_by_path;
///
/// let root = json!({"keep": true});
/// let out = place_by_path(&root, "$.items.2", json!("c")).unwrap();
/// assert_eq!(out, json!({"keep": true, "items": [null, null, "c"]}));
/// ```
pub fn place_by_path(root: &Value, path: &str, value: Value) -> Result<Value, PathError> {
    if path.is_empty() {
        return Ok(value);
    }
    let segments = parse_path(path)?;
    let mut out = root.clone();
    place_into(&mut out, &segments, value);
    Ok(out)
}

fn place_into(node: &mut Value, segments: &[&str], value: Value) {
    let Some((segment, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if let Ok(index) = segment.parse::<usize>() {
        if !matches!(node, Value::Array(_)) {
            *node = Value::Array(Vec::new());
        }
        if let Value::Array(seq) = node {
            while seq.len() <= index {
                seq.push(Value::Null);
            }
            place_into(&mut seq[index], rest, value);
        }
    } else {
        if !matches!(node, Value::Object(_)) {
            *node = Value::Object(Map::new());
        }
        if let Value::Object(map) = node {
            let slot = map.entry((*segment).to_string()).or_insert(Value::Null);
            place_into(slot, rest, value);
        }
    }
}

/// Merges two values:
///
/// - either side null → the other side;
/// - map × map → recursive key-wise merge, right wins on scalar conflict;
/// - sequence × sequence → concatenation, left then right;
/// - anything else → the right side.
///
/// The merge is commutative on disjoint map keys, which is what lets
/// Parallel branches interleave their writes safely.
pub fn merge_values(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Null, other) => other.clone(),
        (other, Value::Null) => other.clone(),
        (Value::Object(a), Value::Object(b)) => {
            let mut out = a.clone();
            for (key, bv) in b {
                let merged = match out.get(key) {
                    Some(av) => merge_values(av, bv),
                    None => bv.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        (Value::Array(a), Value::Array(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Value::Array(out)
        }
        (_, other) => other.clone(),
    }
}
