use std::process::Command;

use crate::common::init_test_logging;

#[test]
fn test_relayd_help_includes_usage() {
    init_test_logging();
    crate::test_log!("TEST START: test_relayd_help_includes_usage");

    let output = Command::new(env!("CARGO_BIN_EXE_relayd"))
        .arg("--help")
        .output()
        .expect("Failed to run relayd --help");

    assert!(output.status.success(), "relayd --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("relayd"), "Expected usage to mention relayd, got: {stdout}");
    assert!(stdout.contains("--port"));
    assert!(stdout.contains("--timeout"));

    crate::test_log!("TEST PASS: test_relayd_help_includes_usage");
}

#[test]
fn test_relayd_rejects_privileged_port() {
    init_test_logging();
    crate::test_log!("TEST START: test_relayd_rejects_privileged_port");

    let output = Command::new(env!("CARGO_BIN_EXE_relayd"))
        .args(["--port", "80"])
        .output()
        .expect("Failed to run relayd --port 80");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--port"), "Expected a port error, got: {stderr}");

    crate::test_log!("TEST PASS: test_relayd_rejects_privileged_port");
}
