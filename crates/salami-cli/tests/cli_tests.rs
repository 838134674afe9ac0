//! Exit-code tests for the salami-fetch binary.

use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn salami_fetch() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_salami-fetch"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_missing_index_exits_with_config_error() {
    let dir = TempDir::new().unwrap();

    let output = salami_fetch()
        .arg(dir.path().join("missing.csv"))
        .arg(dir.path().join("out"))
        .output()
        .expect("Failed to run salami-fetch");

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Index file not found"));
}

#[test]
fn test_output_file_exits_with_config_error() {
    let dir = TempDir::new().unwrap();
    let index = dir.path().join("index.csv");
    fs::write(&index, "song_id,source_url\n").unwrap();
    let out = dir.path().join("out");
    fs::write(&out, b"not a directory").unwrap();

    let status = salami_fetch()
        .arg(&index)
        .arg(&out)
        .status()
        .expect("Failed to run salami-fetch");

    assert_eq!(status.code(), Some(2));
}

#[test]
fn test_row_errors_do_not_change_exit_code() {
    let dir = TempDir::new().unwrap();
    let index = dir.path().join("index.csv");
    fs::write(&index, "song_id,source_url\n,http://example.org/a.mp3\n3,\n").unwrap();
    let report = dir.path().join("report.json");

    let output = salami_fetch()
        .arg(&index)
        .arg(dir.path().join("out"))
        .arg("--report")
        .arg(&report)
        .output()
        .expect("Failed to run salami-fetch");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("row errors 2"), "stdout: {stdout}");
    assert!(stdout.contains("line 2: missing song_id"), "stdout: {stdout}");

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["row_errors"].as_array().unwrap().len(), 2);
    assert_eq!(json["succeeded"], 0);
}
