mod common;

use common::*;
use futures_util::FutureExt;
use serde_json::json;
use statesman::cancel::CancellationToken;
use statesman::catalog::{Descriptor, HostError, MethodCatalog, MethodOutput, MethodSpec};
use statesman::definition::StateMachine;
use statesman::interpreter::{Interpreter, InterpreterError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn parse_machine(text: &str) -> StateMachine {
    StateMachine::from_json(text).unwrap()
}

fn market_interpreter() -> Interpreter {
    let (catalog, _recorder) = market_fixture();
    Interpreter::new(catalog)
}

#[tokio::test]
async fn test_pass_through_state_only_adds_its_synthetic_write() {
    let machine = parse_machine(
        r#"{
            "StartAt": "Noop",
            "States": {
                "Noop": {"Type": "Pass", "InputPath": "$", "OutputPath": "$", "End": true}
            }
        }"#,
    );
    let input = json!({"payload": {"x": 1}});
    let out = market_interpreter().interpret(&machine, input.clone()).await.unwrap();
    assert_eq!(
        out,
        json!({"payload": {"x": 1}, "Noop": {"payload": {"x": 1}}})
    );
}

#[tokio::test]
async fn test_parameter_substitution_prefers_current_then_global() {
    let machine = parse_machine(
        r#"{
            "StartAt": "Seed",
            "States": {
                "Seed": {"Type": "Pass", "Result": {"d": "x"}, "Next": "Narrow"},
                "Narrow": {
                    "Type": "Pass",
                    "InputPath": "$.Seed",
                    "Parameters": {
                        "fromCurrent.$": "$.d",
                        "fromGlobal.$": "$.Seed.d",
                        "missing.$": "$.nowhere",
                        "literal": 7
                    },
                    "End": true
                }
            }
        }"#,
    );
    let out = market_interpreter().interpret(&machine, json!({})).await.unwrap();
    assert_eq!(
        out["Narrow"],
        json!({"fromCurrent": "x", "fromGlobal": "x", "missing": null, "literal": 7})
    );
}

#[tokio::test]
async fn test_explicit_result_path_overrides_the_synthetic_one() {
    let machine = parse_machine(
        r#"{
            "StartAt": "Put",
            "States": {
                "Put": {"Type": "Pass", "Result": 42, "ResultPath": "$.deep.slot", "End": true}
            }
        }"#,
    );
    let out = market_interpreter().interpret(&machine, json!({})).await.unwrap();
    assert_eq!(out, json!({"deep": {"slot": 42}}));
}

#[tokio::test]
async fn test_choice_first_matching_rule_wins() {
    let machine = parse_machine(
        r#"{
            "StartAt": "C",
            "States": {
                "C": {
                    "Type": "Choice",
                    "Choices": [
                        {"Variable": "$.n", "NumericGreaterThan": 0, "Next": "First"},
                        {"Variable": "$.n", "NumericGreaterThan": 1, "Next": "Second"}
                    ],
                    "Default": "Fallback"
                },
                "First": {"Type": "Pass", "Result": "first", "End": true},
                "Second": {"Type": "Pass", "Result": "second", "End": true},
                "Fallback": {"Type": "Pass", "Result": "fallback", "End": true}
            }
        }"#,
    );
    let out = market_interpreter()
        .interpret(&machine, json!({"n": 5}))
        .await
        .unwrap();
    assert_eq!(out["First"], json!("first"));
    assert!(out.get("Second").is_none());
}

#[tokio::test]
async fn test_choice_without_match_or_default_ends_the_run() {
    let machine = parse_machine(
        r#"{
            "StartAt": "C",
            "States": {
                "C": {
                    "Type": "Choice",
                    "Choices": [{"Variable": "$.n", "NumericGreaterThan": 100, "Next": "Never"}]
                },
                "Never": {"Type": "Pass", "End": true}
            }
        }"#,
    );
    let out = market_interpreter()
        .interpret(&machine, json!({"n": 1}))
        .await
        .unwrap();
    assert_eq!(out, json!({"n": 1}));
}

#[tokio::test]
async fn test_choice_multiple_comparators_are_disjunctive() {
    let machine = parse_machine(
        r#"{
            "StartAt": "C",
            "States": {
                "C": {
                    "Type": "Choice",
                    "Choices": [
                        {
                            "Variable": "$.v",
                            "NumericGreaterThan": 100,
                            "IsString": true,
                            "Next": "Hit"
                        }
                    ],
                    "Default": "Miss"
                },
                "Hit": {"Type": "Pass", "Result": "hit", "End": true},
                "Miss": {"Type": "Pass", "Result": "miss", "End": true}
            }
        }"#,
    );
    // A string variable fails the numeric test but fires IsString.
    let out = market_interpreter()
        .interpret(&machine, json!({"v": "text"}))
        .await
        .unwrap();
    assert_eq!(out["Hit"], json!("hit"));
}

#[tokio::test]
async fn test_choice_timestamp_and_boolean_comparators() {
    let machine = parse_machine(
        r#"{
            "StartAt": "C",
            "States": {
                "C": {
                    "Type": "Choice",
                    "Choices": [
                        {
                            "Variable": "$.when",
                            "TimestampGreaterThan": "2024-01-01T00:00:00Z",
                            "Next": "Late"
                        },
                        {"Variable": "$.flag", "BooleanEquals": true, "Next": "Flagged"}
                    ],
                    "Default": "Neither"
                },
                "Late": {"Type": "Succeed"},
                "Flagged": {"Type": "Succeed"},
                "Neither": {"Type": "Succeed"}
            }
        }"#,
    );
    let interpreter = market_interpreter();
    let out = interpreter
        .interpret(&machine, json!({"when": "2024-06-01T00:00:00+00:00"}))
        .await
        .unwrap();
    assert_eq!(out["when"], json!("2024-06-01T00:00:00+00:00"));

    let out = interpreter
        .interpret(&machine, json!({"when": "2020-01-01T00:00:00Z", "flag": "true"}))
        .await
        .unwrap();
    // Reached Flagged via the string-form boolean.
    assert_eq!(out["flag"], json!("true"));
}

#[tokio::test]
async fn test_choice_state_without_choices_is_an_error() {
    let machine = parse_machine(
        r#"{"StartAt": "C", "States": {"C": {"Type": "Choice"}}}"#,
    );
    let err = market_interpreter()
        .interpret(&machine, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, InterpreterError::Choice { .. }));
}

#[tokio::test]
async fn test_fail_state_raises_error_and_cause() {
    let machine = parse_machine(
        r#"{
            "StartAt": "F",
            "States": {"F": {"Type": "Fail", "Error": "Boom", "Cause": "because"}}
        }"#,
    );
    let err = market_interpreter()
        .interpret(&machine, json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Boom: because");
    assert_eq!(err.error_name(), "FailState");

    let machine = parse_machine(r#"{"StartAt": "F", "States": {"F": {"Type": "Fail"}}}"#);
    let err = market_interpreter()
        .interpret(&machine, json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "FailState: Failure");
}

#[tokio::test]
async fn test_task_without_resource_is_a_resource_error() {
    let machine = parse_machine(
        r#"{"StartAt": "T", "States": {"T": {"Type": "Task", "End": true}}}"#,
    );
    let err = market_interpreter()
        .interpret(&machine, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, InterpreterError::Resource { .. }));
    assert_eq!(err.error_name(), "ResourceError");
}

#[tokio::test]
async fn test_task_with_unknown_method_is_a_resource_error() {
    let machine = parse_machine(
        r#"{
            "StartAt": "T",
            "States": {"T": {"Type": "Task", "Resource": "NoSuchMethod", "End": true}}
        }"#,
    );
    let err = market_interpreter()
        .interpret(&machine, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, InterpreterError::Resource { .. }));
}

#[tokio::test]
async fn test_task_without_parameters_uses_input_values_positionally() {
    let machine = parse_machine(
        r#"{
            "StartAt": "T",
            "States": {"T": {"Type": "Task", "Resource": "AddTime", "End": true}}
        }"#,
    );
    let input = json!({"date": "2024-01-01T00:00:00Z", "value": 2, "timeUnit": "Hours"});
    let out = market_interpreter().interpret(&machine, input).await.unwrap();
    assert_eq!(out["T"], json!("2024-01-01T02:00:00Z"));
}

fn flaky_catalog(failures: u32, calls: Arc<AtomicU32>) -> Arc<MethodCatalog> {
    Arc::new(
        MethodCatalog::builder()
            .method(
                MethodSpec::new("Flaky")
                    .returns(Descriptor::string())
                    .handler(move |_| {
                        let calls = Arc::clone(&calls);
                        async move {
                            let n = calls.fetch_add(1, Ordering::SeqCst);
                            if n < failures {
                                Err(HostError::msg("Flaky", "not yet"))
                            } else {
                                MethodOutput::value(json!("finally"))
                            }
                        }
                        .boxed()
                    }),
            )
            .build(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_retry_reinvokes_until_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let catalog = flaky_catalog(2, Arc::clone(&calls));
    let machine = parse_machine(
        r#"{
            "StartAt": "T",
            "States": {
                "T": {
                    "Type": "Task",
                    "Resource": "Flaky",
                    "Parameters": {},
                    "Retry": [{
                        "ErrorEquals": ["HostError"],
                        "IntervalSeconds": 1,
                        "MaxAttempts": 3,
                        "BackoffRate": 2.0
                    }],
                    "End": true
                }
            }
        }"#,
    );
    let out = Interpreter::new(catalog).interpret(&machine, json!({})).await.unwrap();
    assert_eq!(out["T"], json!("finally"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_surfaces_the_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let catalog = flaky_catalog(u32::MAX, Arc::clone(&calls));
    let machine = parse_machine(
        r#"{
            "StartAt": "T",
            "States": {
                "T": {
                    "Type": "Task",
                    "Resource": "Flaky",
                    "Parameters": {},
                    "Retry": [{"ErrorEquals": ["HostError"], "MaxAttempts": 2}],
                    "End": true
                }
            }
        }"#,
    );
    let err = Interpreter::new(catalog)
        .interpret(&machine, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, InterpreterError::Host(_)));
    // Initial call plus two retries.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_catch_redirects_and_records_the_error_object() {
    let (catalog, _recorder) = market_fixture();
    let machine = parse_machine(
        r#"{
            "StartAt": "T",
            "States": {
                "T": {
                    "Type": "Task",
                    "Resource": "AlwaysFails",
                    "Parameters": {},
                    "Catch": [{"ErrorEquals": ["States.ALL"], "Next": "Recover"}],
                    "Next": "Unreached"
                },
                "Unreached": {"Type": "Pass", "End": true},
                "Recover": {"Type": "Pass", "Result": "recovered", "End": true}
            }
        }"#,
    );
    let out = Interpreter::new(catalog).interpret(&machine, json!({})).await.unwrap();
    assert_eq!(out["T"]["Error"], json!("HostError"));
    assert!(out["T"]["Cause"].as_str().unwrap().contains("synthetic failure"));
    assert_eq!(out["Recover"], json!("recovered"));
    assert!(out.get("Unreached").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_wait_sources_are_additive() {
    let machine = parse_machine(
        r#"{
            "StartAt": "W",
            "States": {
                "W": {"Type": "Wait", "Seconds": 1, "SecondsPath": "$.delay", "End": true}
            }
        }"#,
    );
    let started = tokio::time::Instant::now();
    market_interpreter()
        .interpret(&machine, json!({"delay": 2}))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_a_pending_wait() {
    let machine = parse_machine(
        r#"{
            "StartAt": "W",
            "States": {"W": {"Type": "Wait", "Seconds": 3600, "End": true}}
        }"#,
    );
    let (catalog, _recorder) = market_fixture();
    let cancel = CancellationToken::new();
    let interpreter = Interpreter::new(catalog).with_cancellation(cancel.clone());

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel("operator abandoned the run");
    });

    let started = tokio::time::Instant::now();
    let err = interpreter.interpret(&machine, json!({})).await.unwrap_err();
    assert!(matches!(err, InterpreterError::Cancelled { .. }));
    assert!(err.to_string().contains("operator abandoned the run"));
    assert!(started.elapsed() < Duration::from_secs(3600));
}
