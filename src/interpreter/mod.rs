//! The state machine dispatch loop.
//!
//! An interpretation owns two values: the *current* data handed from state
//! to state and a *global* accumulator every state output is merged into.
//! Each iteration applies `InputPath`, resolves `Parameters`, dispatches on
//! the state kind, merges the state's output into the accumulator, and
//! either finishes (returning the accumulator) or rebinds the current data
//! and follows `Next`.
//!
//! `Map` and `Parallel` fork concurrent sub-interpretations that share the
//! owning run's catalog and cancellation token; their outputs are returned
//! and merged serially by the owning loop, so the accumulator is only ever
//! mutated between state transitions.

mod choice;
mod wait;

use futures_util::future::{try_join_all, BoxFuture};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use futures_util::FutureExt;
use miette::Diagnostic;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::catalog::{CatalogError, HostError, MethodCatalog};
use crate::definition::{
    DefinitionError, State, StateMachine, StateType, LAMBDA_INVOKE_RESOURCE,
};
use crate::paths::{
    apply_input_path, apply_output_path, lookup, merge_values, parse_path, place_by_path, PathError,
};

/// Fatal interpretation failures. In-flight errors bubble up the
/// interpreter call stack, dropping still-in-flight sibling branches, and
/// surface to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum InterpreterError {
    /// Static validation failed at interpret entry.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Definition(#[from] DefinitionError),

    /// A path string was syntactically invalid.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    /// The loop was routed to a state name with no definition.
    #[error("no state named '{name}'")]
    #[diagnostic(code(statesman::interpreter::missing_state))]
    MissingState { name: String },

    /// A state's fields do not satisfy its kind's requirements.
    #[error("state '{state}': {reason}")]
    #[diagnostic(code(statesman::interpreter::invalid_state))]
    InvalidState { state: String, reason: String },

    /// A Choice state with no Choices.
    #[error("choice state '{state}' has no choices")]
    #[diagnostic(code(statesman::interpreter::choiceless))]
    Choice { state: String },

    /// A Task with an empty Resource, or no catalog method matched.
    #[error("state '{state}': {reason}")]
    #[diagnostic(
        code(statesman::interpreter::resource),
        help("Task states need a Resource naming a catalog method (or the lambda-invoke ARN).")
    )]
    Resource { state: String, reason: String },

    /// A user-authored Fail state fired.
    #[error("{error}: {cause}")]
    #[diagnostic(code(statesman::interpreter::fail_state))]
    FailState { error: String, cause: String },

    /// A domain method reported a failure.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Host(#[from] HostError),

    /// The run was cancelled cooperatively.
    #[error("interpretation cancelled: {reason}")]
    #[diagnostic(code(statesman::interpreter::cancelled))]
    Cancelled { reason: String },
}

impl InterpreterError {
    /// The taxonomy name used by `Retry`/`Catch` `ErrorEquals` matching.
    pub fn error_name(&self) -> &'static str {
        match self {
            InterpreterError::Definition(_)
            | InterpreterError::MissingState { .. }
            | InterpreterError::InvalidState { .. } => "DefinitionError",
            InterpreterError::Path(_) => "PathError",
            InterpreterError::Choice { .. } => "ChoiceError",
            InterpreterError::Resource { .. } => "ResourceError",
            InterpreterError::FailState { .. } => "FailState",
            InterpreterError::Host(_) => "HostError",
            InterpreterError::Cancelled { .. } => "CancelledError",
        }
    }
}

/// Output of one state plus where to go next; `next == None` ends the run.
pub(crate) struct StateOutcome {
    pub output: Value,
    pub next: Option<String>,
}

/// Drives ASL definitions against a method catalog.
///
/// The interpreter itself is cheap to construct and stateless between
/// runs; all run state lives on the stack of [`interpret`](Self::interpret).
/// Timeouts are the caller's concern (`tokio::time::timeout` around
/// `interpret`); cancellation is cooperative via the attached token.
pub struct Interpreter {
    catalog: Arc<MethodCatalog>,
    cancel: CancellationToken,
}

impl Interpreter {
    pub fn new(catalog: Arc<MethodCatalog>) -> Self {
        Self {
            catalog,
            cancel: CancellationToken::new(),
        }
    }

    /// Attaches an externally-owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A clone of the token governing this interpreter's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The terminal error for a cancelled run, carrying the recorded
    /// reason.
    fn cancelled_error(&self) -> InterpreterError {
        InterpreterError::Cancelled {
            reason: self
                .cancel
                .reason()
                .unwrap_or_else(|| "no reason recorded".to_string()),
        }
    }

    /// Validates and executes a definition, returning the accumulator.
    #[instrument(skip_all, fields(run = %Uuid::new_v4(), start = %machine.start_at))]
    pub async fn interpret(
        &self,
        machine: &StateMachine,
        input: Value,
    ) -> Result<Value, InterpreterError> {
        machine.validate()?;
        self.run_machine(machine, input).await
    }

    /// One (sub-)machine run. Boxed because Map/Parallel recurse.
    fn run_machine<'a>(
        &'a self,
        machine: &'a StateMachine,
        input: Value,
    ) -> BoxFuture<'a, Result<Value, InterpreterError>> {
        async move {
            let mut global = input;
            let mut current = global.clone();
            let mut state_name = machine.start_at.clone();
            loop {
                if self.cancel.is_cancelled() {
                    return Err(self.cancelled_error());
                }
                let state =
                    machine
                        .states
                        .get(&state_name)
                        .ok_or_else(|| InterpreterError::MissingState {
                            name: state_name.clone(),
                        })?;
                let kind = state.state_type.ok_or_else(|| {
                    DefinitionError::UntypedState {
                        name: state_name.clone(),
                    }
                })?;
                debug!(state = state_name.as_str(), kind = ?kind, "entering state");

                let input_value = apply_input_path(&current, state.input_path.as_deref())?;
                // Map applies its template per item, not to the whole input.
                let effective = match &state.parameters {
                    Some(template) if kind != StateType::Map => {
                        resolve_parameters(&input_value, template, &global)?
                    }
                    _ => input_value,
                };

                let outcome = match kind {
                    StateType::Pass => self.handle_pass(&state_name, state, effective, &current)?,
                    StateType::Task => {
                        self.handle_task(&state_name, state, effective, &current)
                            .await?
                    }
                    StateType::Choice => choice::handle_choice(&state_name, state, &effective)?,
                    StateType::Wait => self.handle_wait(state, effective, &global).await?,
                    StateType::Succeed => StateOutcome {
                        output: effective,
                        next: None,
                    },
                    StateType::Fail => {
                        return Err(InterpreterError::FailState {
                            error: state.error.clone().unwrap_or_else(|| "FailState".into()),
                            cause: state.cause.clone().unwrap_or_else(|| "Failure".into()),
                        })
                    }
                    StateType::Map => {
                        self.handle_map(&state_name, state, effective, &current, &global)
                            .await?
                    }
                    StateType::Parallel => {
                        self.handle_parallel(&state_name, state, effective, &current)
                            .await?
                    }
                };

                global = merge_values(&global, &outcome.output);
                match outcome.next {
                    None => return Ok(global),
                    Some(next) => {
                        current = outcome.output;
                        state_name = next;
                    }
                }
            }
        }
        .boxed()
    }

    fn handle_pass(
        &self,
        state_name: &str,
        state: &State,
        effective: Value,
        current: &Value,
    ) -> Result<StateOutcome, InterpreterError> {
        let result = state.result.clone().unwrap_or(effective);
        let placed = place_by_path(current, &result_path(state, state_name), result)?;
        Ok(StateOutcome {
            output: apply_output_path(&placed, state.output_path.as_deref())?,
            next: advance(state),
        })
    }

    async fn handle_task(
        &self,
        state_name: &str,
        state: &State,
        effective: Value,
        current: &Value,
    ) -> Result<StateOutcome, InterpreterError> {
        let resource = state
            .resource
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| InterpreterError::Resource {
                state: state_name.to_string(),
                reason: "Task state has no Resource".into(),
            })?;

        let (method_name, args) = if resource == LAMBDA_INVOKE_RESOURCE {
            lambda_invoke_call(state_name, effective)
        } else {
            (resource.to_string(), build_argument_array(effective))
        };

        let value = self
            .invoke_with_retry(state_name, state, &method_name, args, current)
            .await?;
        match value {
            TaskResolution::Value(value) => {
                let placed = place_by_path(current, &result_path(state, state_name), value)?;
                Ok(StateOutcome {
                    output: apply_output_path(&placed, state.output_path.as_deref())?,
                    next: advance(state),
                })
            }
            TaskResolution::Caught(outcome) => Ok(outcome),
        }
    }

    /// Runs the invocation under the state's Retry rules, consulting Catch
    /// when retries are exhausted or never matched.
    async fn invoke_with_retry(
        &self,
        state_name: &str,
        state: &State,
        method_name: &str,
        args: Vec<Value>,
        current: &Value,
    ) -> Result<TaskResolution, InterpreterError> {
        let retry_rules = state.retry.as_deref().unwrap_or(&[]);
        let mut attempts = vec![0u32; retry_rules.len()];
        loop {
            let err = match self
                .catalog
                .invoke(method_name, args.clone(), &self.cancel)
                .await
            {
                Ok(value) => return Ok(TaskResolution::Value(value)),
                Err(CatalogError::Cancelled) => return Err(self.cancelled_error()),
                Err(CatalogError::UnknownMethod { name, arity }) => InterpreterError::Resource {
                    state: state_name.to_string(),
                    reason: format!("no method '{name}' taking {arity} argument(s)"),
                },
                Err(CatalogError::Host(host)) => InterpreterError::Host(host),
            };
            let error_name = err.error_name();

            if let Some((slot, rule)) = retry_rules
                .iter()
                .enumerate()
                .find(|(_, rule)| rule.matches(error_name))
            {
                if attempts[slot] < rule.max_attempts {
                    attempts[slot] += 1;
                    let delay = Duration::from_secs_f64(rule.delay_seconds(attempts[slot]));
                    debug!(
                        state = state_name,
                        attempt = attempts[slot],
                        delay_s = delay.as_secs_f64(),
                        "retrying task"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(self.cancelled_error()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            }

            if let Some(rule) = state
                .catch
                .iter()
                .flatten()
                .find(|rule| rule.matches(error_name))
            {
                let error_object = serde_json::json!({
                    "Error": error_name,
                    "Cause": err.to_string(),
                });
                let target = rule
                    .result_path
                    .clone()
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| format!("$.{state_name}"));
                let placed = place_by_path(current, &target, error_object)?;
                return Ok(TaskResolution::Caught(StateOutcome {
                    output: placed,
                    next: Some(rule.next.clone()),
                }));
            }

            return Err(err);
        }
    }

    async fn handle_wait(
        &self,
        state: &State,
        effective: Value,
        global: &Value,
    ) -> Result<StateOutcome, InterpreterError> {
        let delay = wait::wait_duration(state, &effective, global, chrono::Utc::now())?;
        if !delay.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(self.cancelled_error()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(StateOutcome {
            output: effective,
            next: advance(state),
        })
    }

    async fn handle_map(
        &self,
        state_name: &str,
        state: &State,
        effective: Value,
        current: &Value,
        global: &Value,
    ) -> Result<StateOutcome, InterpreterError> {
        let iterator = state
            .iterator
            .as_deref()
            .ok_or_else(|| InterpreterError::InvalidState {
                state: state_name.to_string(),
                reason: "Map state has no Iterator".into(),
            })?;

        let items_value = match state.items_path.as_deref() {
            None | Some("") | Some("$") => effective.clone(),
            Some(path) => {
                let segments = parse_path(path)?;
                lookup(&effective, &segments)
                    .filter(|v| !v.is_null())
                    .or_else(|| lookup(global, &segments))
                    .cloned()
                    .unwrap_or(Value::Null)
            }
        };
        let items = match items_value {
            Value::Array(items) => items,
            _ => {
                return Err(InterpreterError::InvalidState {
                    state: state_name.to_string(),
                    reason: "ItemsPath did not resolve to a sequence".into(),
                })
            }
        };

        let cap = match state.max_concurrency {
            None | Some(0) => items.len().max(1),
            Some(n) => n,
        };

        let sub_inputs = items
            .iter()
            .map(|item| match &state.parameters {
                Some(template) => resolve_parameters(item, template, global),
                None => Ok(item.clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Ordered buffering keeps results aligned with input positions no
        // matter which sub-runs finish first.
        let results: Vec<Value> = stream::iter(
            sub_inputs
                .into_iter()
                .map(|sub_input| self.run_machine(iterator, sub_input)),
        )
        .buffered(cap)
        .try_collect()
        .await?;

        let placed = place_by_path(current, &result_path(state, state_name), Value::Array(results))?;
        Ok(StateOutcome {
            output: apply_output_path(&placed, state.output_path.as_deref())?,
            next: advance(state),
        })
    }

    async fn handle_parallel(
        &self,
        state_name: &str,
        state: &State,
        effective: Value,
        current: &Value,
    ) -> Result<StateOutcome, InterpreterError> {
        let branches = state
            .branches
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| InterpreterError::InvalidState {
                state: state_name.to_string(),
                reason: "Parallel state has no Branches".into(),
            })?;

        let outputs = try_join_all(
            branches
                .iter()
                .map(|branch| self.run_machine(branch, effective.clone())),
        )
        .await?;

        let merged = outputs
            .iter()
            .fold(Value::Null, |acc, output| merge_values(&acc, output));
        let placed = place_by_path(current, &result_path(state, state_name), merged)?;
        Ok(StateOutcome {
            output: apply_output_path(&placed, state.output_path.as_deref())?,
            next: advance(state),
        })
    }
}

enum TaskResolution {
    Value(Value),
    Caught(StateOutcome),
}

/// `End: true` or a missing `Next` ends the run.
fn advance(state: &State) -> Option<String> {
    if state.end == Some(true) {
        None
    } else {
        state.next.clone()
    }
}

/// Explicit `ResultPath`, or the synthetic `$.<stateName>` that keeps each
/// state's output observable in the accumulator.
fn result_path(state: &State, state_name: &str) -> String {
    state
        .result_path
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| format!("$.{state_name}"))
}

/// Renders a `Parameters` template: map keys ending in `.$` resolve their
/// (string) value as a path against the state input first and the
/// accumulator second; other entries recurse; scalars are verbatim.
pub(crate) fn resolve_parameters(
    data: &Value,
    template: &Value,
    global: &Value,
) -> Result<Value, PathError> {
    match template {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if let Some(stripped) = key.strip_suffix(".$") {
                    let resolved = match value.as_str() {
                        Some(path) => {
                            let segments = parse_path(path)?;
                            lookup(data, &segments)
                                .filter(|v| !v.is_null())
                                .or_else(|| lookup(global, &segments))
                                .cloned()
                                .unwrap_or(Value::Null)
                        }
                        None => value.clone(),
                    };
                    out.insert(stripped.to_string(), resolved);
                } else {
                    out.insert(key.clone(), resolve_parameters(data, value, global)?);
                }
            }
            Ok(Value::Object(out))
        }
        Value::Array(seq) => Ok(Value::Array(
            seq.iter()
                .map(|item| resolve_parameters(data, item, global))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        scalar => Ok(scalar.clone()),
    }
}

/// The positional argument array for a Task call: map values in iteration
/// order, sequence elements, or a single-element wrap.
fn build_argument_array(built: Value) -> Vec<Value> {
    match built {
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        Value::Array(seq) => seq,
        other => vec![other],
    }
}

/// The lambda-invoke indirection: `FunctionName` names the method (falling
/// back to the state name) and `Payload` carries the arguments (falling
/// back to the remaining map). A non-map value falls back to the plain
/// argument-array construction.
fn lambda_invoke_call(state_name: &str, built: Value) -> (String, Vec<Value>) {
    match built {
        Value::Object(mut map) => {
            let method = match map.shift_remove("FunctionName") {
                Some(Value::String(name)) => name,
                _ => state_name.to_string(),
            };
            let payload = map.shift_remove("Payload");
            let args = build_argument_array(payload.unwrap_or(Value::Object(map)));
            (method, args)
        }
        other => (state_name.to_string(), build_argument_array(other)),
    }
}
