//! End-to-end tests for the `airo` binary.
//!
//! Covers:
//! - check-config and providers output (human and JSON)
//! - one-shot `run` from an argument and from stdin
//! - exit codes for configuration, guard, and availability errors
//! - the JSONL audit sink

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

use airo::test_utils::{TestDir, make_test_config_toml};

use common::write_config;

/// The binary with a clean environment: no config override, no log noise,
/// and a config dir that does not contain a config file.
fn airo(home: &TestDir) -> Command {
    let mut cmd = Command::cargo_bin("airo").expect("airo binary");
    for var in [
        "AIRO_CONFIG",
        "AIRO_LOG",
        "AIRO_LOG_FORMAT",
        "AIRO_LOG_FILE",
        "AIRO_DAILY_BUDGET",
        "AIRO_MONTHLY_BUDGET",
        "AIRO_RATE_LIMIT_PER_MINUTE",
        "AIRO_CACHE_TTL_SECONDS",
        "AIRO_MAX_INPUT_LENGTH",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("xdg-config"))
        .env("XDG_CACHE_HOME", home.path().join("xdg-cache"));
    cmd
}

fn with_config(body: &str) -> (TestDir, String) {
    let dir = TestDir::new();
    let path = write_config(&dir, body);
    (dir, path.display().to_string())
}

// =============================================================================
// Help
// =============================================================================

#[test]
fn help_lists_commands() {
    let home = TestDir::new();
    airo(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check-config"))
        .stdout(predicate::str::contains("providers"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn unknown_command_is_a_usage_error() {
    let home = TestDir::new();
    airo(&home).arg("frobnicate").assert().failure();
}

// =============================================================================
// check-config
// =============================================================================

#[test]
fn check_config_prints_a_summary() {
    let (dir, config) = with_config(&make_test_config_toml());
    airo(&dir)
        .args(["--config", &config, "check-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"))
        .stdout(predicate::str::contains("Providers: 1 (1 enabled)"))
        .stdout(predicate::str::contains("max 200 chars"));
}

#[test]
fn check_config_json_is_parseable() {
    let (dir, config) = with_config(&make_test_config_toml());
    let output = airo(&dir)
        .args(["--config", &config, "--json", "check-config"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["providers"], 1);
    assert_eq!(value["max_input_length"], 200);
    assert_eq!(value["budgets"][0]["provider"], "local");
}

#[test]
fn config_from_environment_variable() {
    let (dir, config) = with_config(&make_test_config_toml());
    airo(&dir)
        .env("AIRO_CONFIG", &config)
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains(config.as_str()));
}

#[test]
fn missing_config_exits_with_config_error() {
    let home = TestDir::new();
    airo(&home)
        .arg("check-config")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("AIRO-C001"));
}

#[test]
fn unparseable_config_exits_with_config_error() {
    let (dir, config) = with_config("[[providers]\nid = ");
    airo(&dir)
        .args(["--config", &config, "check-config"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("AIRO-C002"));
}

#[test]
fn invalid_config_names_the_problem() {
    let (dir, config) = with_config(
        r#"
[[providers]]
id = "openai"
kind = "openai"
"#,
    );
    airo(&dir)
        .args(["--config", &config, "check-config"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("AIRO-C003"))
        .stderr(predicate::str::contains("endpoint"));
}

#[test]
fn json_errors_are_machine_readable() {
    let home = TestDir::new();
    let output = airo(&home).args(["--json", "providers"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let value: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(value["error"]["code"], "AIRO-C001");
}

// =============================================================================
// providers
// =============================================================================

#[test]
fn providers_lists_every_entry() {
    let mut body = make_test_config_toml();
    body.push_str(&common::remote_provider_toml(
        "openai",
        "openai",
        "https://api.openai.com/v1",
        1,
        &["sk-one", "sk-two"],
    ));
    let (dir, config) = with_config(&body);

    airo(&dir)
        .args(["--config", &config, "providers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("openai"))
        .stdout(predicate::str::contains("correction,generation,chat"))
        .stdout(predicate::str::contains("local"))
        .stdout(predicate::str::contains("sk-one").not());

    let output = airo(&dir)
        .args(["--config", &config, "--json", "providers"])
        .output()
        .unwrap();
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["id"], "openai");
    assert_eq!(rows[0]["credentials"], 2);
    assert_eq!(rows[1]["tier"], "free");
}

// =============================================================================
// run
// =============================================================================

#[test]
fn run_corrects_argument_with_local_provider() {
    let (dir, config) = with_config(&make_test_config_toml());
    airo(&dir)
        .args(["--config", &config, "run", "--capability", "correction", "hello  world ."])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Hello world.\n"))
        .stdout(predicate::str::contains("[local | 1 attempt(s)"));
}

#[test]
fn run_reads_stdin() {
    let (dir, config) = with_config(&make_test_config_toml());
    airo(&dir)
        .args(["--config", &config, "run", "-c", "correction", "-"])
        .write_stdin("i am fine")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("I am fine\n"));
}

#[test]
fn run_json_reports_the_result() {
    let (dir, config) = with_config(&make_test_config_toml());
    let output = airo(&dir)
        .args([
            "--config",
            &config,
            "--json",
            "run",
            "--capability",
            "correction",
            "--caller",
            "student-1",
            "where is  the library",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["payload"], "Where is the library");
    assert_eq!(value["provider"], "local");
    assert_eq!(value["cached"], false);
    assert_eq!(value["attempts"].as_array().unwrap().len(), 1);
}

#[test]
fn oversized_input_exits_with_input_rejected() {
    let (dir, config) = with_config(&make_test_config_toml());
    let long = "word ".repeat(100);
    airo(&dir)
        .args(["--config", &config, "run", "--capability", "correction", &long])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("AIRO-I001"));
}

#[test]
fn environment_overrides_the_input_limit() {
    let (dir, config) = with_config(&make_test_config_toml());
    airo(&dir)
        .env("AIRO_MAX_INPUT_LENGTH", "5")
        .args(["--config", &config, "run", "--capability", "correction", "hello world"])
        .assert()
        .code(3);
}

#[test]
fn uncovered_capability_exits_with_no_provider() {
    let (dir, config) = with_config(&make_test_config_toml());
    airo(&dir)
        .args(["--config", &config, "run", "--capability", "generation", "write a story"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("AIRO-A001"));
}

#[test]
fn unknown_capability_is_a_config_error() {
    let (dir, config) = with_config(&make_test_config_toml());
    airo(&dir)
        .args(["--config", &config, "run", "--capability", "summarize", "text"])
        .assert()
        .code(2);
}

#[test]
fn run_appends_usage_to_the_audit_log() {
    let dir = TestDir::new();
    let audit = dir.file_path("audit/usage.jsonl");
    let mut body = make_test_config_toml();
    body.push_str(&format!("\n[audit]\njsonl_path = '{}'\n", audit.display()));
    let config = write_config(&dir, &body);

    airo(&dir)
        .args(["--config", &config.display().to_string(), "run", "-c", "correction"])
        .args(["--caller", "cli-test", "good morning"])
        .assert()
        .success();

    let log = std::fs::read_to_string(&audit).unwrap();
    let records: Vec<serde_json::Value> = log
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["type"], "usage");
    assert_eq!(records[0]["caller"], "cli-test");
    assert_eq!(records[0]["provider"], "local");
    assert_eq!(records[0]["success"], true);
}
