//! End-to-end runs of the `flowgate` binary against a temporary state file

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn flowgate(home: &Path, args: &[&str]) -> Output {
    let bin = env!("CARGO_BIN_EXE_flowgate");
    Command::new(bin)
        .env("HOME", home.as_os_str())
        .env("XDG_CONFIG_HOME", home.join("config").as_os_str())
        .env_remove("FLOWGATE__SERVER__NAMESPACE")
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_list_on_fresh_state() {
    let temp = TempDir::new().unwrap();
    let state = temp.path().join("state.json");
    let output = flowgate(temp.path(), &["--state", state.to_str().unwrap(), "list"]);
    assert!(
        output.status.success(),
        "list should succeed: stderr={:?}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout(&output).contains("No workflows found."));
}

#[test]
fn test_create_persists_between_runs() {
    let temp = TempDir::new().unwrap();
    let state = temp.path().join("state.json");
    let file = temp.path().join("hello.json");
    fs::write(
        &file,
        r#"{"metadata": {"name": "hello"}, "spec": {"entrypoint": "main"}}"#,
    )
    .unwrap();
    let state_arg = state.to_str().unwrap();

    let created = flowgate(
        temp.path(),
        &["--state", state_arg, "-n", "ci", "create", file.to_str().unwrap()],
    );
    assert!(created.status.success());
    assert!(stdout(&created).contains("workflow ci/hello created"));
    assert!(state.exists());

    let listed = flowgate(temp.path(), &["--state", state_arg, "-n", "ci", "list", "-o", "json"]);
    assert!(listed.status.success());
    let list: serde_json::Value = serde_json::from_slice(&listed.stdout).unwrap();
    assert_eq!(list["items"][0]["metadata"]["name"], "hello");
}

#[test]
fn test_get_missing_exits_nonzero() {
    let temp = TempDir::new().unwrap();
    let state = temp.path().join("state.json");
    let output = flowgate(
        temp.path(),
        &["--state", state.to_str().unwrap(), "get", "ghost"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("NotFound"));
}
