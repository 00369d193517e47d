use statesman::definition::{DefinitionError, StateMachine, StateType, LAMBDA_INVOKE_RESOURCE};

fn parse(text: &str) -> StateMachine {
    StateMachine::from_json(text).unwrap()
}

#[test]
fn test_parse_minimal_machine() {
    let machine = parse(
        r#"{"StartAt": "A", "States": {"A": {"Type": "Pass", "End": true}}}"#,
    );
    assert_eq!(machine.start_at, "A");
    assert_eq!(machine.states["A"].state_type, Some(StateType::Pass));
    assert_eq!(machine.states["A"].end, Some(true));
    machine.validate().unwrap();
}

#[test]
fn test_parse_rejects_unknown_state_type() {
    let err = StateMachine::from_json(
        r#"{"StartAt": "A", "States": {"A": {"Type": "Banana"}}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, DefinitionError::Parse { .. }));
}

#[test]
fn test_validate_missing_start() {
    let machine = parse(r#"{"StartAt": "Nope", "States": {"A": {"Type": "Succeed"}}}"#);
    assert!(matches!(
        machine.validate(),
        Err(DefinitionError::MissingStart { .. })
    ));
}

#[test]
fn test_validate_dangling_next() {
    let machine = parse(
        r#"{"StartAt": "A", "States": {"A": {"Type": "Pass", "Next": "Ghost"}}}"#,
    );
    assert!(matches!(
        machine.validate(),
        Err(DefinitionError::DanglingNext { .. })
    ));
}

#[test]
fn test_validate_dangling_choice_and_default() {
    let machine = parse(
        r#"{
            "StartAt": "C",
            "States": {
                "C": {
                    "Type": "Choice",
                    "Choices": [{"Variable": "$.n", "NumericLessThan": 10, "Next": "Ghost"}]
                }
            }
        }"#,
    );
    assert!(matches!(
        machine.validate(),
        Err(DefinitionError::DanglingNext { .. })
    ));

    let machine = parse(
        r#"{
            "StartAt": "C",
            "States": {
                "C": {"Type": "Choice", "Choices": [], "Default": "Ghost"}
            }
        }"#,
    );
    assert!(matches!(
        machine.validate(),
        Err(DefinitionError::DanglingNext { .. })
    ));
}

#[test]
fn test_validate_recurses_into_iterator_and_branches() {
    let machine = parse(
        r#"{
            "StartAt": "M",
            "States": {
                "M": {
                    "Type": "Map",
                    "ItemsPath": "$.items",
                    "Iterator": {
                        "StartAt": "Inner",
                        "States": {"Inner": {"Type": "Pass", "Next": "Ghost"}}
                    },
                    "End": true
                }
            }
        }"#,
    );
    assert!(matches!(
        machine.validate(),
        Err(DefinitionError::DanglingNext { .. })
    ));

    let machine = parse(
        r#"{
            "StartAt": "P",
            "States": {
                "P": {
                    "Type": "Parallel",
                    "Branches": [
                        {"StartAt": "Missing", "States": {"B": {"Type": "Succeed"}}}
                    ],
                    "End": true
                }
            }
        }"#,
    );
    assert!(matches!(
        machine.validate(),
        Err(DefinitionError::MissingStart { .. })
    ));
}

#[test]
fn test_validate_catch_targets() {
    let machine = parse(
        r#"{
            "StartAt": "T",
            "States": {
                "T": {
                    "Type": "Task",
                    "Resource": "DoWork",
                    "Catch": [{"ErrorEquals": ["States.ALL"], "Next": "Ghost"}],
                    "End": true
                }
            }
        }"#,
    );
    assert!(matches!(
        machine.validate(),
        Err(DefinitionError::DanglingNext { .. })
    ));
}

#[test]
fn test_retry_rule_defaults_and_backoff() {
    let machine = parse(
        r#"{
            "StartAt": "T",
            "States": {
                "T": {
                    "Type": "Task",
                    "Resource": "DoWork",
                    "Retry": [{"ErrorEquals": ["HostError"]}],
                    "End": true
                }
            }
        }"#,
    );
    let retry = &machine.states["T"].retry.as_ref().unwrap()[0];
    assert_eq!(retry.interval_seconds, 1.0);
    assert_eq!(retry.max_attempts, 3);
    assert_eq!(retry.backoff_rate, 2.0);
    assert_eq!(retry.delay_seconds(1), 1.0);
    assert_eq!(retry.delay_seconds(2), 2.0);
    assert_eq!(retry.delay_seconds(3), 4.0);
    assert!(retry.matches("HostError"));
    assert!(!retry.matches("PathError"));
}

#[test]
fn test_error_wildcard_matches_everything() {
    let machine = parse(
        r#"{
            "StartAt": "T",
            "States": {
                "T": {
                    "Type": "Task",
                    "Resource": "DoWork",
                    "Catch": [{"ErrorEquals": ["States.ALL"], "Next": "T"}],
                    "End": true
                }
            }
        }"#,
    );
    let rule = &machine.states["T"].catch.as_ref().unwrap()[0];
    assert!(rule.matches("HostError"));
    assert!(rule.matches("ResourceError"));
}

#[test]
fn test_lambda_invoke_resource_constant() {
    assert_eq!(LAMBDA_INVOKE_RESOURCE, "arn:aws:states:::lambda:invoke");
}

#[test]
fn test_wait_fields_deserialize() {
    let machine = parse(
        r#"{
            "StartAt": "W",
            "States": {
                "W": {
                    "Type": "Wait",
                    "Seconds": 2,
                    "SecondsPath": "$.delay",
                    "Timestamp": "2030-01-01T00:00:00Z",
                    "TimestampPath": "$.until",
                    "End": true
                }
            }
        }"#,
    );
    let wait = &machine.states["W"];
    assert_eq!(wait.seconds, Some(2));
    assert_eq!(wait.seconds_path.as_deref(), Some("$.delay"));
    assert_eq!(wait.timestamp.as_deref(), Some("2030-01-01T00:00:00Z"));
    assert_eq!(wait.timestamp_path.as_deref(), Some("$.until"));
}
