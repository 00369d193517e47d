//! Type-directed coercion between JSON arguments and declared kinds.
//!
//! Coercion is deliberately lossy rather than fallible: an argument that
//! cannot be read as its declared kind becomes `null`, and the handler is
//! expected to cope. A single unparseable element never fails a call.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};

use super::schema::{AslKind, Descriptor, ValueFormat};
use super::CompiledParam;

/// Canonical wire form for timestamps, matching the advertised
/// `yyyy-MM-ddTHH:mm:ssZ` format.
const CANONICAL_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%SZ";

pub(crate) fn coerce_argument(value: &Value, param: &CompiledParam) -> Value {
    coerce(
        value,
        &param.descriptor.kind,
        param.descriptor.format.as_ref(),
        param.enum_members.as_ref().map(|m| m.as_slice()),
    )
}

fn coerce(
    value: &Value,
    kind: &AslKind,
    format: Option<&ValueFormat>,
    enum_members: Option<&[String]>,
) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match kind {
        AslKind::String => match format {
            Some(ValueFormat::Timestamp) => coerce_timestamp(value),
            Some(ValueFormat::Enum(_)) => coerce_enum(value, enum_members),
            None => coerce_string(value),
        },
        AslKind::Number => coerce_number(value),
        AslKind::Boolean => coerce_boolean(value),
        AslKind::Null => Value::Null,
        AslKind::Array(element) => match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| coerce(item, element, format, enum_members))
                    .collect(),
            ),
            _ => Value::Null,
        },
        // Composites pass through raw; the handler owns their shape.
        AslKind::Object(_) => value.clone(),
    }
}

fn coerce_string(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.clone()),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        _ => Value::Null,
    }
}

fn coerce_number(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(n.clone()),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(parsed) => number_value(parsed),
            Err(_) => Value::Null,
        },
        _ => Value::Null,
    }
}

fn number_value(parsed: f64) -> Value {
    if parsed.fract() == 0.0 && parsed.abs() < i64::MAX as f64 {
        Value::Number(Number::from(parsed as i64))
    } else {
        Number::from_f64(parsed).map_or(Value::Null, Value::Number)
    }
}

fn coerce_boolean(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::Bool(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

fn coerce_timestamp(value: &Value) -> Value {
    match value {
        Value::String(s) => parse_timestamp(s)
            .map(|dt| Value::String(dt.format(CANONICAL_TIMESTAMP).to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// ISO-8601 parse normalised to UTC; tolerates a missing offset (read as
/// UTC) and bare dates (midnight UTC).
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

fn coerce_enum(value: &Value, members: Option<&[String]>) -> Value {
    let text = match value {
        Value::String(s) => s.as_str(),
        _ => return Value::Null,
    };
    match members {
        Some(members) => members
            .iter()
            .find(|m| m.eq_ignore_ascii_case(text))
            .map(|m| Value::String(m.clone()))
            .unwrap_or(Value::Null),
        // Unregistered enum names keep the caller's spelling.
        None => Value::String(text.to_string()),
    }
}

/// Normalises a handler's result per its declared return descriptor.
/// Today this means canonical timestamp formatting, applied element-wise
/// through arrays; everything else passes through untouched.
pub(crate) fn canonicalise_return(value: Value, returns: &Descriptor) -> Value {
    match (&returns.format, value) {
        (Some(ValueFormat::Timestamp), Value::String(s)) => parse_timestamp(&s)
            .map(|dt| Value::String(dt.format(CANONICAL_TIMESTAMP).to_string()))
            .unwrap_or(Value::String(s)),
        (Some(ValueFormat::Timestamp), Value::Array(items)) => Value::Array(
            items
                .into_iter()
                .map(|item| canonicalise_return(item, returns))
                .collect(),
        ),
        (_, value) => value,
    }
}
