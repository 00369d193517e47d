//! ASL definition data model and static validation.
//!
//! A definition is a `(StartAt, States)` pair. States carry a `Type`
//! discriminator plus the kind-dependent fields of the ASL subset this
//! interpreter executes. The model deserializes the JSON an LLM produces
//! and is validated once, before interpretation begins.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Static-validation failures, raised at interpret entry.
#[derive(Debug, Error, Diagnostic)]
pub enum DefinitionError {
    /// The definition text was not a valid state machine document.
    #[error("definition is not valid state machine JSON: {source}")]
    #[diagnostic(
        code(statesman::definition::parse),
        help("The document must be an object with 'StartAt' and 'States'.")
    )]
    Parse {
        #[from]
        source: serde_json::Error,
    },

    /// `StartAt` names a state that is not present in `States`.
    #[error("start state '{name}' is not defined")]
    #[diagnostic(code(statesman::definition::missing_start))]
    MissingStart { name: String },

    /// A `Next` (state, choice, default, or catch) references an unknown state.
    #[error("state '{from}' routes to undefined state '{to}'")]
    #[diagnostic(
        code(statesman::definition::dangling_next),
        help("Every 'Next' and 'Default' must name a state in the same 'States' map.")
    )]
    DanglingNext { from: String, to: String },

    /// The `States` map is empty.
    #[error("definition has no states")]
    #[diagnostic(code(statesman::definition::empty))]
    Empty,

    /// A state carries no `Type` discriminator.
    #[error("state '{name}' has no Type")]
    #[diagnostic(code(statesman::definition::untyped_state))]
    UntypedState { name: String },
}

/// The eight state kinds this interpreter executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateType {
    Pass,
    Task,
    Choice,
    Wait,
    Succeed,
    Fail,
    Map,
    Parallel,
}

/// A complete state machine definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachine {
    #[serde(rename = "StartAt")]
    pub start_at: String,
    #[serde(rename = "States")]
    pub states: FxHashMap<String, State>,
}

/// One state. Fields irrelevant to a state's `Type` are simply absent; the
/// interpreter checks kind-specific requirements in flight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct State {
    #[serde(rename = "Type")]
    pub state_type: Option<StateType>,

    // Data plumbing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    // Control
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<bool>,

    // Task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<Vec<RetryRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catch: Option<Vec<CatchRule>>,

    // Choice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<ChoiceRule>>,
    #[serde(rename = "Default", skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    // Wait
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_path: Option<String>,

    // Map
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterator: Option<Box<StateMachine>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    // Parallel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<StateMachine>>,

    // Fail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// One rule of a Choice state.
///
/// Multiple comparator fields on a single rule are disjunctive: the rule
/// fires when *any* of them holds. Generated definitions rely on this, so
/// it must not be tightened to the conjunctive AWS reading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChoiceRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_equals: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_greater_than: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_greater_than_equals: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_less_than: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_less_than_equals: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_equals: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_greater_than: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_greater_than_equals: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_less_than: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_less_than_equals: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_equals: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_greater_than: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_greater_than_equals: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_less_than: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_less_than_equals: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub boolean_equals: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_null: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_numeric: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_string: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_boolean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_timestamp: Option<bool>,
}

/// A retry rule for a Task invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetryRule {
    #[serde(default)]
    pub error_equals: Vec<String>,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_rate")]
    pub backoff_rate: f64,
}

fn default_interval_seconds() -> f64 {
    1.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_rate() -> f64 {
    2.0
}

/// A catch rule for a Task invocation: redirects to `Next`, writing
/// `{"Error", "Cause"}` at `ResultPath` (default: the synthetic state path).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatchRule {
    #[serde(default)]
    pub error_equals: Vec<String>,
    pub next: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
}

/// Wildcard error name matched by every error.
pub const ERROR_WILDCARD: &str = "States.ALL";

/// Resource string selecting the lambda-invoke dispatch pattern, where
/// `Parameters.FunctionName` / `Parameters.Payload` drive the call.
pub const LAMBDA_INVOKE_RESOURCE: &str = "arn:aws:states:::lambda:invoke";

impl StateMachine {
    /// Parses a definition from JSON text.
    pub fn from_json(text: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Runs the static checks: a non-empty `States` map, a resolvable
    /// `StartAt`, and no dangling `Next` anywhere, including Choice rules,
    /// defaults, catch rules, and nested Iterator/Branches definitions.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.states.is_empty() {
            return Err(DefinitionError::Empty);
        }
        if !self.states.contains_key(&self.start_at) {
            return Err(DefinitionError::MissingStart {
                name: self.start_at.clone(),
            });
        }
        for (name, state) in &self.states {
            if state.state_type.is_none() {
                return Err(DefinitionError::UntypedState { name: name.clone() });
            }
            let mut check = |target: &str| -> Result<(), DefinitionError> {
                if self.states.contains_key(target) {
                    Ok(())
                } else {
                    Err(DefinitionError::DanglingNext {
                        from: name.clone(),
                        to: target.to_string(),
                    })
                }
            };
            if let Some(next) = &state.next {
                check(next)?;
            }
            if let Some(default) = &state.default {
                check(default)?;
            }
            for rule in state.choices.iter().flatten() {
                if let Some(next) = &rule.next {
                    check(next)?;
                }
            }
            for rule in state.catch.iter().flatten() {
                check(&rule.next)?;
            }
            if let Some(iterator) = &state.iterator {
                iterator.validate()?;
            }
            for branch in state.branches.iter().flatten() {
                branch.validate()?;
            }
        }
        Ok(())
    }
}

impl RetryRule {
    /// Delay before retry attempt `attempt` (1-based):
    /// `IntervalSeconds × BackoffRate^(attempt-1)`.
    pub fn delay_seconds(&self, attempt: u32) -> f64 {
        self.interval_seconds * self.backoff_rate.powi(attempt.saturating_sub(1) as i32)
    }

    /// Whether this rule applies to the given error name.
    pub fn matches(&self, error_name: &str) -> bool {
        matches_error(&self.error_equals, error_name)
    }
}

impl CatchRule {
    /// Whether this rule applies to the given error name.
    pub fn matches(&self, error_name: &str) -> bool {
        matches_error(&self.error_equals, error_name)
    }
}

fn matches_error(patterns: &[String], error_name: &str) -> bool {
    patterns
        .iter()
        .any(|p| p == ERROR_WILDCARD || p == error_name)
}
