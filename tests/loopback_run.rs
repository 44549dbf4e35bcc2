//! End-to-end runs of the `relaybench` binary against the loopback relay.

use std::path::Path;
use std::process::{Command, Output};

fn write_config(dir: &Path) -> std::path::PathBuf {
    let config_path = dir.join("relaybench.toml");
    let config = format!(
        r#"
[run]
name = "integration"
seed = 11

[relay]
kind = "loopback"
group_id = "grp"
sender_account = "+100"
receiver_account = "+200"
receive_timeout_secs = 0

[bench]
updates = 8
send_concurrency = 4
send_retry_ms = 1
seed_text_len = 30
listener_shutdown_timeout_ms = 500
sweep_sizes = [1, 10, 100, 1000]

[bench.idle]
max_idle_rounds = 3
idle_delay_ms = 20
error_delay_ms = 5

[bench.concurrent]
delay_a_ms = [0, 3]
delay_b_ms = [1, 4]

[report]
dir = "{}"
"#,
        dir.join("out").display()
    );
    std::fs::write(&config_path, config).unwrap();
    config_path
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_relaybench"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to spawn relaybench")
}

#[test]
fn full_run_writes_every_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let output = run(&[config.to_str().unwrap()]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let out = dir.path().join("out");
    for file in [
        "sequential.csv",
        "concurrent.csv",
        "large-edits.csv",
        "results.json",
        "metrics.prom",
    ] {
        assert!(out.join(file).exists(), "missing {file}");
    }

    let results: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("results.json")).unwrap()).unwrap();
    assert_eq!(results["name"], "integration");
    assert_eq!(results["relay"], "loopback");
    assert_eq!(results["passed"], 3);
    assert_eq!(results["failed"], 0);

    let concurrent = std::fs::read_to_string(out.join("concurrent.csv")).unwrap();
    assert_eq!(concurrent.lines().count(), 1 + 16);
}

#[test]
fn suite_argument_selects_by_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let output = run(&[config.to_str().unwrap(), "large"]);
    assert!(output.status.success());

    let out = dir.path().join("out");
    assert!(out.join("large-edits.csv").exists());
    assert!(!out.join("sequential.csv").exists());
    let sweep = std::fs::read_to_string(out.join("large-edits.csv")).unwrap();
    assert_eq!(sweep.lines().count(), 1 + 4);
}

#[test]
fn unknown_suite_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let output = run(&[config.to_str().unwrap(), "b9"]);
    assert!(!output.status.success());
    assert!(!dir.path().join("out").exists());
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("bad.toml");
    std::fs::write(&config_path, "[relay]\nkind = \"loopback\"\n").unwrap();
    let output = run(&[config_path.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn missing_config_file_fails() {
    let output = run(&["/nonexistent/relaybench.toml"]);
    assert!(!output.status.success());
}
