use assert_cmd::Command;
use predicates::prelude::*;
use rstest::rstest;
use std::io::Write;
use tempfile::NamedTempFile;

fn filmscan() -> Command {
    let mut cmd = Command::cargo_bin("filmscan").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

fn config_file(body: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(body.as_bytes()).unwrap();
    f
}

fn script_file(body: &str) -> NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    f.write_all(body.as_bytes()).unwrap();
    f
}

#[test]
fn help_lists_subcommands() {
    filmscan()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("scan")
                .and(predicate::str::contains("script"))
                .and(predicate::str::contains("self-check"))
                .and(predicate::str::contains("health")),
        );
}

#[rstest]
#[case(&["health"], "ok")]
#[case(&["--json", "health"], "\"status\":\"ok\"")]
fn health_reports_ok(#[case] args: &[&str], #[case] expected: &str) {
    filmscan()
        .args(args)
        .assert()
        .success()
        .stdout(predicate::str::contains(expected));
}

#[test]
fn scan_captures_requested_frames() {
    let cfg = config_file("");
    filmscan()
        .arg("--config")
        .arg(cfg.path())
        .args(["scan", "--frames", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("captured 3 frames"));
}

#[test]
fn json_scan_prints_events_then_summary() {
    let cfg = config_file("[scan]\npt_level = 400\nmin_frame_steps = 285\n");
    let out = filmscan()
        .arg("--config")
        .arg(cfg.path())
        .args(["--json", "scan", "--frames", "2"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let frames = lines
        .iter()
        .filter(|v| v["event"] == "frame_available")
        .count();
    assert_eq!(frames, 2);
    let summary = lines.last().unwrap();
    assert_eq!(summary["frames"], 2);
    assert_eq!(summary["pt_level"], 400);
}

#[test]
fn save_levels_writes_calibration_table() {
    let cfg = config_file("");
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("levels.toml");
    filmscan()
        .arg("--config")
        .arg(cfg.path())
        .args(["scan", "--frames", "2", "--save-levels"])
        .arg(&out)
        .assert()
        .success();
    let saved = std::fs::read_to_string(&out).unwrap();
    assert!(saved.contains("[calibration]"));
    assert!(saved.contains("min_frame_steps"));
}

#[test]
fn max_run_abort_exits_with_code_4() {
    let cfg = config_file("");
    filmscan()
        .arg("--config")
        .arg(cfg.path())
        .args(["scan", "--frames", "1000", "--max-run-ms", "50"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Maximum run time"));
}

#[test]
fn max_run_abort_json_carries_limit() {
    let cfg = config_file("");
    let out = filmscan()
        .arg("--config")
        .arg(cfg.path())
        .args(["--json", "scan", "--frames", "1000", "--max-run-ms", "50"])
        .assert()
        .code(4)
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();
    let last: serde_json::Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
    assert_eq!(last["reason"], "MaxRuntime");
    assert_eq!(last["details"]["max_run_ms"], 50);
}

#[test]
fn script_prints_device_events() {
    let cfg = config_file("");
    let script = script_file("delay_ms,command,param\n0,version_check,0\n5,super8,0\n");
    filmscan()
        .arg("--config")
        .arg(cfg.path())
        .arg("script")
        .arg("--file")
        .arg(script.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("version (1, 0)"));
}

#[test]
fn script_with_wrong_header_fails() {
    let cfg = config_file("");
    let script = script_file("when,what\n0,start_scan\n");
    filmscan()
        .arg("--config")
        .arg(cfg.path())
        .arg("script")
        .arg("--file")
        .arg(script.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid headers in script CSV"));
}

#[test]
fn script_with_unknown_command_fails() {
    let cfg = config_file("");
    let script = script_file("delay_ms,command,param\n0,warp_speed,0\n");
    filmscan()
        .arg("--config")
        .arg(cfg.path())
        .arg("script")
        .arg("--file")
        .arg(script.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("warp_speed"));
}

#[test]
fn self_check_passes_on_simulator() {
    let cfg = config_file("");
    filmscan()
        .arg("--config")
        .arg(cfg.path())
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("self-check ok: film_in_gate=true"));
}

#[test]
fn invalid_config_is_rejected() {
    let cfg = config_file("[scan]\nscan_speed = 11\n");
    filmscan()
        .arg("--config")
        .arg(cfg.path())
        .args(["scan", "--frames", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("scan_speed"));
}

#[test]
fn malformed_toml_is_humanized() {
    let cfg = config_file("[scan\n");
    filmscan()
        .arg("--config")
        .arg(cfg.path())
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not valid TOML"));
}

#[test]
fn missing_explicit_config_fails() {
    filmscan()
        .args(["--config", "/nonexistent/filmscan.toml", "self-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("/nonexistent/filmscan.toml"));
}
