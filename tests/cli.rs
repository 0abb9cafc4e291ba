//! Exit status and log flushing of the command-line tools.

use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;

use chrono::Utc;

use epitrace::adapters::SqliteClientStore;
use epitrace::domain::{ephid_from_seed, epoch_from_time, generate_seed, ContagiousReport};
use epitrace::{ContactTracer, TracerRoles, TracingBatch};

fn check_infection_risk(args: &[&Path], log_file: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_check_infection_risk"))
        .args(args)
        .env("EPITRACE_LOG_MODE", "file")
        .env("EPITRACE_LOG_FILE", log_file)
        .env("RUST_LOG", "info")
        .output()
        .expect("Should run check_infection_risk")
}

#[test]
fn test_match_exit_code_keeps_buffered_logs() {
    let dir = tempfile::tempdir().expect("Should create dir");
    let database = dir.path().join("client.db");
    let filter = dir.path().join("filter.bin");
    let log_file = dir.path().join("epitrace.log");

    let now = Utc::now();
    let seed = generate_seed();
    {
        let store = Arc::new(SqliteClientStore::new(&database).expect("Should open"));
        let tracer = ContactTracer::starting_on(store, now, TracerRoles::RECEIVER).expect("Should create");
        tracer
            .record_observation(&ephid_from_seed(&seed), now, -55)
            .expect("Should record");
    }

    let epoch = epoch_from_time(now);
    let report = ContagiousReport {
        epochs: epoch..=epoch,
        seeds: vec![seed],
    };
    let batch: TracingBatch = TracingBatch::from_reports(&[report]).expect("Should build");
    batch.publish(&filter).expect("Should publish");

    let output = check_infection_risk(&[&filter, Path::new("--database"), &database], &log_file);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "1");
    let log = std::fs::read_to_string(&log_file).expect("Should read log");
    assert!(log.contains("1 matches"), "log was: {log}");
}

#[test]
fn test_usage_error_exit_code() {
    let dir = tempfile::tempdir().expect("Should create dir");
    let log_file = dir.path().join("epitrace.log");

    let output = check_infection_risk(&[Path::new("--help")], &log_file);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage: check_infection_risk"));
}
