use std::fs;
use tempfile::tempdir;

use radiofrag_cli::{
    commands::simulate::{self, SimulateOptions},
    CodingArgs,
};
use radiofrag_core::link::LinkStatus;

#[test]
fn simulate_with_injected_drops_writes_report() {
    let td = tempdir().unwrap();
    let report_path = td.path().join("report.json");

    let options = SimulateOptions {
        drop: vec![3, 8],
        report: Some(report_path.to_str().unwrap().to_string()),
        ..SimulateOptions::default()
    };
    let report = simulate::execute(None, None, &CodingArgs::default(), &options).unwrap();

    assert_eq!(report.status, LinkStatus::Completed { recovered: 2 });
    assert!(report.is_success());
    assert_eq!(report.receiver.frames_dropped, 2);
    assert_eq!(report.sender.frames_sent, 15);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["status"]["status"], "completed");
    assert_eq!(json["status"]["recovered"], 2);
    assert_eq!(json["receiver"]["frames_dropped"], 2);
}

#[test]
fn simulate_total_loss_never_completes() {
    let options = SimulateOptions {
        loss: 1.0,
        max_polls: 200,
        ..SimulateOptions::default()
    };
    let report = simulate::execute(None, None, &CodingArgs::default(), &options).unwrap();

    assert_eq!(report.status, LinkStatus::Active);
    assert_eq!(report.frames_lost, 15);
    assert!(!report.is_success());
}

#[test]
fn simulate_random_loss_is_reproducible() {
    let options = SimulateOptions {
        loss: 0.25,
        seed: 7,
        ..SimulateOptions::default()
    };
    let first = simulate::execute(None, None, &CodingArgs::default(), &options).unwrap();
    let second = simulate::execute(None, None, &CodingArgs::default(), &options).unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.frames_lost, second.frames_lost);
    assert_eq!(first.receiver, second.receiver);
    if let LinkStatus::Completed { .. } = first.status {
        assert!(first.is_success());
    }
}

#[test]
fn simulate_input_file() {
    let td = tempdir().unwrap();
    let in_path = td.path().join("data.bin");
    fs::write(&in_path, b"telemetry burst").unwrap();

    let report = simulate::execute(
        in_path.to_str(),
        None,
        &CodingArgs::default(),
        &SimulateOptions::default(),
    )
    .unwrap();
    assert!(report.is_success());
}
