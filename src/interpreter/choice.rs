//! Choice state evaluation.
//!
//! Rules are tried in order; the first rule with a `Next` whose
//! comparators fire wins. Multiple comparators on one rule are
//! disjunctive: any of them firing fires the rule. Generated definitions
//! depend on that reading, so it must not be tightened to the conjunctive
//! AWS interpretation.

use serde_json::Value;

use super::{InterpreterError, StateOutcome};
use crate::catalog::marshal::parse_timestamp;
use crate::definition::{ChoiceRule, State};
use crate::paths::get_by_path;

pub(crate) fn handle_choice(
    state_name: &str,
    state: &State,
    data: &Value,
) -> Result<StateOutcome, InterpreterError> {
    let rules = state
        .choices
        .as_deref()
        .filter(|rules| !rules.is_empty())
        .ok_or_else(|| InterpreterError::Choice {
            state: state_name.to_string(),
        })?;

    for rule in rules {
        let variable = match rule.variable.as_deref() {
            Some(path) => get_by_path(data, path)?,
            None => Value::Null,
        };
        if rule.next.is_some() && rule_fires(rule, &variable) {
            return Ok(StateOutcome {
                output: data.clone(),
                next: rule.next.clone(),
            });
        }
    }

    // No rule matched: fall to Default, else the run ends here.
    Ok(StateOutcome {
        output: data.clone(),
        next: state.default.clone(),
    })
}

fn rule_fires(rule: &ChoiceRule, variable: &Value) -> bool {
    numeric_fires(rule, variable)
        || string_fires(rule, variable)
        || timestamp_fires(rule, variable)
        || boolean_fires(rule, variable)
        || type_test_fires(rule, variable)
}

fn numeric_fires(rule: &ChoiceRule, variable: &Value) -> bool {
    let Some(var) = as_number(variable) else {
        return false;
    };
    rule.numeric_equals.is_some_and(|rhs| var == rhs)
        || rule.numeric_greater_than.is_some_and(|rhs| var > rhs)
        || rule.numeric_greater_than_equals.is_some_and(|rhs| var >= rhs)
        || rule.numeric_less_than.is_some_and(|rhs| var < rhs)
        || rule.numeric_less_than_equals.is_some_and(|rhs| var <= rhs)
}

fn string_fires(rule: &ChoiceRule, variable: &Value) -> bool {
    let Some(var) = as_text(variable) else {
        return false;
    };
    let var = var.as_str();
    rule.string_equals.as_deref().is_some_and(|rhs| var == rhs)
        || rule.string_greater_than.as_deref().is_some_and(|rhs| var > rhs)
        || rule
            .string_greater_than_equals
            .as_deref()
            .is_some_and(|rhs| var >= rhs)
        || rule.string_less_than.as_deref().is_some_and(|rhs| var < rhs)
        || rule
            .string_less_than_equals
            .as_deref()
            .is_some_and(|rhs| var <= rhs)
}

fn timestamp_fires(rule: &ChoiceRule, variable: &Value) -> bool {
    let Some(var) = variable.as_str().and_then(parse_timestamp) else {
        return false;
    };
    let parsed = |rhs: Option<&String>| rhs.and_then(|s| parse_timestamp(s));
    parsed(rule.timestamp_equals.as_ref()).is_some_and(|rhs| var == rhs)
        || parsed(rule.timestamp_greater_than.as_ref()).is_some_and(|rhs| var > rhs)
        || parsed(rule.timestamp_greater_than_equals.as_ref()).is_some_and(|rhs| var >= rhs)
        || parsed(rule.timestamp_less_than.as_ref()).is_some_and(|rhs| var < rhs)
        || parsed(rule.timestamp_less_than_equals.as_ref()).is_some_and(|rhs| var <= rhs)
}

fn boolean_fires(rule: &ChoiceRule, variable: &Value) -> bool {
    let Some(rhs) = rule.boolean_equals else {
        return false;
    };
    as_bool(variable).is_some_and(|var| var == rhs)
}

fn type_test_fires(rule: &ChoiceRule, variable: &Value) -> bool {
    rule.is_null.is_some_and(|expected| variable.is_null() == expected)
        || rule
            .is_numeric
            .is_some_and(|expected| variable.is_number() == expected)
        || rule
            .is_string
            .is_some_and(|expected| variable.is_string() == expected)
        || rule
            .is_boolean
            .is_some_and(|expected| variable.is_boolean() == expected)
        || rule.is_timestamp.is_some_and(|expected| {
            variable.as_str().and_then(parse_timestamp).is_some() == expected
        })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
