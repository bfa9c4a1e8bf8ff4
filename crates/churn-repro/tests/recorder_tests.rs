use std::fs;

use churn_core::{Action, ActionLog, StepFault, Violation};
use churn_repro::{simplify_message, RecordError, Recorder, ScriptDialect};
use serde_json::json;

fn failing_log() -> ActionLog {
    ActionLog::from(vec![
        Action::new("inc", json!(1)),
        Action::new("configure", json!({ "mode": "odd", "limits": [1, 2] })),
    ])
}

fn parity_fault() -> StepFault {
    StepFault::from(Violation::assert_equal(&0, &1).unwrap_err()).attributed("count_is_even")
}

#[test]
fn test_capture_writes_one_file_named_by_run_id() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::new(dir.path().join("artifacts"), ScriptDialect::default());

    let path = recorder
        .capture(&parity_fault(), "1700000000123", &failing_log())
        .unwrap();

    assert_eq!(path.file_name().unwrap(), "fuzz-1700000000123.js");
    let entries: Vec<_> = fs::read_dir(recorder.dir()).unwrap().collect();
    assert_eq!(entries.len(), 1);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("/*\nInvariantViolation: expected 1 to deeply equal 0"));
    assert!(text.contains("at count_is_even"));
    assert!(text.contains("Expected: 0"));
    assert!(text.contains("Actual:   1"));
    assert!(text.contains("app.actions.inc(1);"));
    assert!(text.contains(r#"app.actions.configure(fromJS({ "limits": [ 1, 2 ], "mode": "odd" }));"#));
}

#[test]
fn test_capture_never_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::new(dir.path(), ScriptDialect::default());
    let existing = dir.path().join("fuzz-42.js");
    fs::write(&existing, "keep me").unwrap();

    let first = recorder.capture(&parity_fault(), "42", &failing_log()).unwrap();
    let second = recorder.capture(&parity_fault(), "42", &failing_log()).unwrap();

    assert_eq!(fs::read_to_string(&existing).unwrap(), "keep me");
    assert_eq!(first.file_name().unwrap(), "fuzz-42.1.js");
    assert_eq!(second.file_name().unwrap(), "fuzz-42.2.js");
}

#[test]
fn test_load_round_trips_the_action_log() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::new(dir.path(), ScriptDialect::default());
    let log = failing_log();

    let path = recorder.capture(&parity_fault(), "7", &log).unwrap();
    let actions = recorder.load(&path).unwrap();
    assert_eq!(actions, log.actions());
}

#[test]
fn test_load_reads_back_names_that_are_not_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::new(dir.path(), ScriptDialect::default());
    let log = ActionLog::from(vec![
        Action::new("counter-added", json!({ "name": "a" })),
        Action::new("edit.updated", json!(1)),
        Action::new("", json!(null)),
        Action::new("inc", json!(2)),
    ]);

    let path = recorder.capture(&parity_fault(), "8", &log).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains(r#"app.actions["counter-added"](fromJS({ "name": "a" }));"#));
    assert!(text.contains(r#"app.actions[""](null);"#));
    assert_eq!(recorder.load(&path).unwrap(), log.actions());
}

#[test]
fn test_load_reports_missing_and_malformed_files() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::new(dir.path(), ScriptDialect::default());

    let missing = recorder.load(&dir.path().join("nope.js")).unwrap_err();
    assert!(matches!(missing, RecordError::Read { .. }));

    let bogus = dir.path().join("bogus.js");
    fs::write(&bogus, "/* unterminated").unwrap();
    assert!(matches!(recorder.load(&bogus).unwrap_err(), RecordError::Parse(_)));
}

#[test]
fn test_terse_line_matches_first_line_of_message() {
    let fault = parity_fault();
    assert_eq!(simplify_message(fault.message()), "expected 1 to deeply equal 0");
}
