//! Tests for the JSONL run ledger.

use report::{InstallStep, LedgerPhase, RunLedger, StepOutcome};
use serde_json::Value;

fn read_lines(path: &std::path::Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_ledger_appends_one_object_per_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let ledger = RunLedger::open(&path).unwrap();

    ledger.set_state("preflight");
    ledger.begin("scan tools");
    let step = InstallStep::begin("scan tools")
        .finish(StepOutcome::Ok, serde_json::json!({ "missing": 0 }));
    ledger.end_step(&step);
    ledger.set_state("create_cluster");
    ledger.warn("port 6443 busy", Value::Null);

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 3);

    assert_eq!(lines[0]["state"], "preflight");
    assert_eq!(lines[0]["phase"], "begin");
    assert_eq!(lines[0]["label"], "scan tools");
    assert!(lines[0].get("outcome").is_none());

    assert_eq!(lines[1]["phase"], "end");
    assert_eq!(lines[1]["outcome"], "ok");
    assert_eq!(lines[1]["detail"]["missing"], 0);

    assert_eq!(lines[2]["state"], "create_cluster");
    assert_eq!(lines[2]["phase"], "warn");
}

#[test]
fn test_ledger_timestamps_are_rfc3339() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let ledger = RunLedger::open(&path).unwrap();
    ledger.info("hello");

    let lines = read_lines(&path);
    let ts = lines[0]["ts"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok(), "bad ts: {}", ts);
}

#[test]
fn test_ledger_open_creates_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs/20250101-000000/ledger.jsonl");
    let ledger = RunLedger::open(&path).unwrap();
    ledger.begin("x");
    assert!(path.exists());
}

#[test]
fn test_phase_serialization_is_lowercase() {
    assert_eq!(
        serde_json::to_string(&LedgerPhase::Begin).unwrap(),
        "\"begin\""
    );
    assert_eq!(serde_json::to_string(&LedgerPhase::End).unwrap(), "\"end\"");
}
