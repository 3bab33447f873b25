//! Integration tests for the vitals binary.
//!
//! These tests verify end-to-end behavior including:
//! - Reading capture and statistics
//! - Scheduler ticks writing to the outbox
//! - Workout and medication flows through the control commands
//! - Refusal to clobber a corrupt store

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Temp dir holding a config with a single UTC user and the outbox enabled
fn setup_test_dir() -> TempDir {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = format!(
        r#"
[data]
data_dir = {:?}

[[users]]
id = "ana"
name = "Ana"
utc_offset_minutes = 0

[channels.log]
enabled = false

[channels.outbox]
enabled = true
max_actions = 2
"#,
        temp_dir.path().to_string_lossy()
    );
    fs::write(temp_dir.path().join("config.toml"), config).expect("Failed to write config");
    temp_dir
}

/// CLI command pointed at the test config
fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vitals"));
    cmd.arg("--config").arg(dir.join("config.toml"));
    cmd
}

fn read_store(dir: &Path) -> serde_json::Value {
    let contents = fs::read_to_string(dir.join("vitals.json")).expect("Failed to read store");
    serde_json::from_str(&contents).expect("Store is not valid JSON")
}

fn read_outbox(dir: &Path) -> String {
    fs::read_to_string(dir.join("outbox.jsonl")).unwrap_or_default()
}

#[test]
fn test_cli_help() {
    Command::new(assert_cmd::cargo::cargo_bin!("vitals"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Health measurement, medication and workout reminders",
        ));
}

#[test]
fn test_bp_add_persists_reading() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["bp", "add", "142", "91", "--pulse", "72"])
        .assert()
        .success()
        .stdout(predicate::str::contains("High BP Stage 2"));

    let store = read_store(temp_dir.path());
    let readings = store["blood_pressure"].as_array().unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0]["systolic"], 142);
    assert_eq!(readings[0]["user_id"], "ana");
}

#[test]
fn test_unknown_user_is_rejected() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["--user", "zoe", "weight", "add", "70.5"])
        .assert()
        .failure();
    assert!(!temp_dir.path().join("vitals.json").exists());
}

#[test]
fn test_tick_sends_evening_reminder_once() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    for day in ["07", "08", "09"] {
        cli(dir)
            .args(["bp", "add", "118", "76", "--measured-at"])
            .arg(format!("2024-05-{}T20:10:00Z", day))
            .assert()
            .success();
    }

    cli(dir)
        .args(["--at", "2024-05-10T20:00:00Z", "tick"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sent blood_pressure reminder to ana"));

    let outbox = read_outbox(dir);
    assert_eq!(outbox.lines().count(), 1);
    assert!(outbox.contains("\"event\":\"sent\""));
    assert!(outbox.contains("\"type\":\"blood_pressure\""));

    cli(dir)
        .args(["--at", "2024-05-10T20:05:00Z", "tick"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "ana blood_pressure: already reminded today",
        ));
    assert_eq!(read_outbox(dir).lines().count(), 1);
}

#[test]
fn test_reading_retracts_reminder() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    cli(dir)
        .args(["--at", "2024-05-10T08:00:00Z", "tick"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sent weight reminder to ana"));

    cli(dir)
        .args(["--at", "2024-05-10T08:10:00Z", "weight", "add", "71.3"])
        .assert()
        .success();

    let outbox = read_outbox(dir);
    assert!(outbox.contains("\"event\":\"retracted\""));
}

#[test]
fn test_suppress_blocks_reminder() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    cli(dir)
        .args(["--at", "2024-05-10T07:00:00Z", "reminder", "suppress", "weight"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Quiet until"));

    cli(dir)
        .args(["--at", "2024-05-10T08:00:00Z", "tick"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ana weight: suppressed"));
    assert!(read_outbox(dir).is_empty());
}

#[test]
fn test_stats_report_windows() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    cli(dir)
        .args(["weight", "add", "80", "--measured-at", "2024-05-08T06:00:00Z"])
        .assert()
        .success();
    cli(dir)
        .args(["weight", "add", "78", "--measured-at", "2024-05-09T06:00:00Z"])
        .assert()
        .success();

    cli(dir)
        .args(["--at", "2024-05-10T12:00:00Z", "stats", "weight"])
        .assert()
        .success()
        .stdout(predicate::str::contains("14d: 79.0 kg (2 days, 2 readings)"));

    cli(dir)
        .args(["--at", "2024-05-10T12:00:00Z", "stats", "bp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no data"));
}

#[test]
fn test_workout_rotation_flow() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    // 2024-05-10 is a Friday
    cli(dir)
        .args([
            "workout", "group-add", "Strength", "--days", "mon,fri", "--time", "18:00", "--notice",
            "60", "--rotating",
        ])
        .assert()
        .success();
    let group_id = read_store(dir)["workout_groups"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    for (name, order) in [("Push", "1"), ("Pull", "2")] {
        cli(dir)
            .args(["workout", "variant-add", &group_id, name, "--order", order])
            .assert()
            .success();
    }

    cli(dir)
        .args(["--at", "2024-05-10T17:30:00Z", "tick"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sent workout reminder to ana"));
    assert!(read_outbox(dir).contains("\"type\":\"workout\""));

    cli(dir)
        .args(["--at", "2024-05-10T17:31:00Z", "workout", "next"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Strength / Push"))
        .stdout(predicate::str::contains("[notified]"));

    let session_id = read_store(dir)["workout_sessions"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    cli(dir)
        .args(["--at", "2024-05-10T18:00:00Z", "workout", "start", &session_id])
        .assert()
        .success();
    cli(dir)
        .args(["--at", "2024-05-10T18:45:00Z", "workout", "complete", &session_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Next in rotation"));

    // Terminal sessions reject further transitions
    cli(dir)
        .args(["--at", "2024-05-10T18:46:00Z", "workout", "skip", &session_id])
        .assert()
        .failure();

    cli(dir)
        .args(["--at", "2024-05-10T19:00:00Z", "workout", "history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[completed]"));
}

#[test]
fn test_medication_take_flow() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    cli(dir)
        .args(["med", "add", "Ramipril", "5 mg", "--time", "21:00"])
        .assert()
        .success();
    let med_id = read_store(dir)["medications"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    cli(dir)
        .args(["--at", "2024-05-10T21:05:00Z", "tick"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sent medication reminder to ana"));

    cli(dir)
        .args(["--at", "2024-05-10T21:10:00Z", "med", "take", &med_id, "21:00"])
        .assert()
        .success()
        .stdout(predicate::str::contains("taken"));
    assert!(read_outbox(dir).contains("\"event\":\"retracted\""));

    cli(dir)
        .args(["--at", "2024-05-10T21:11:00Z", "med", "take", &med_id, "21:00"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already confirmed"));
}

#[test]
fn test_ad_hoc_workout() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();

    cli(dir)
        .args(["workout", "adhoc", "Evening run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Started Evening run"));

    let store = read_store(dir);
    let session = &store["workout_sessions"][0];
    assert_eq!(session["status"], "in_progress");
    assert_eq!(session["origin"]["kind"], "ad_hoc");
}

#[test]
fn test_corrupt_store_is_not_overwritten() {
    let temp_dir = setup_test_dir();
    let dir = temp_dir.path();
    fs::write(dir.join("vitals.json"), "{ not json").unwrap();

    cli(dir)
        .args(["weight", "add", "70.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing to overwrite"));

    assert_eq!(fs::read_to_string(dir.join("vitals.json")).unwrap(), "{ not json");
}
