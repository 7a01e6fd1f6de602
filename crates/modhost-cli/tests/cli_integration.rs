//! Runs the `modhost` binary end to end

use std::process::{Command, Output};

fn modhost(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_modhost"))
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run modhost")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_explain_enumerated_code() {
    let output = modhost(&["explain", "-401"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("TypeResolutionFailure"));
    assert!(text.contains("resolution"));
}

#[test]
fn test_explain_unknown_code() {
    let output = modhost(&["explain", "-12345"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("UnknownNativeError(-12345)"));
}

#[test]
fn test_explain_success() {
    let output = modhost(&["explain", "0"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("success"));
}

#[test]
fn test_check_valid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("modhost.toml");
    std::fs::write(
        &config,
        "[host]\nlibrary = \"libnative_host.so\"\n\n[[modules]]\npath = \"Calculator.dll\"\n",
    )
    .unwrap();

    let output = modhost(&["check", "--config", config.to_str().unwrap()]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Calculator.dll"));
    assert!(text.contains("NativeHost"));
}

#[test]
fn test_check_aot_plugin_host_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("modhost.toml");
    std::fs::write(
        &config,
        r#"
[host]
library = "libnative_aot_plugin_host.so"
flavor = "native-aot-plugin-host"
runtime_config = "Calculator.runtimeconfig.json"
"#,
    )
    .unwrap();

    let output = modhost(&["check", "--config", config.to_str().unwrap()]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("NativeAotPluginHost"));
    assert!(text.contains("Calculator.runtimeconfig.json"));
}

#[test]
fn test_check_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("modhost.toml");
    std::fs::write(&config, "[host]\nflavor = \"native-host\"\n").unwrap();

    let output = modhost(&["check", "--config", config.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_call_with_missing_library_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("modhost.toml");
    std::fs::write(&config, "[host]\nlibrary = \"libmissing_host.so\"\n").unwrap();

    let output = modhost(&[
        "call",
        "--config",
        config.to_str().unwrap(),
        "--module",
        "Calculator.dll",
        "--type",
        "Demo.Calculator",
        "--method",
        "Add",
        "5",
        "3",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_invalid_log_level_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("modhost.toml");
    std::fs::write(
        &config,
        "[host]\nlibrary = \"libmissing_host.so\"\n\n[logging]\nlevel = \"modhost=loud\"\n",
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_modhost"))
        .args([
            "resolve",
            "--config",
            config.to_str().unwrap(),
            "--module",
            "Calculator.dll",
            "--type",
            "Demo.Calculator",
            "--method",
            "Add",
        ])
        .env("NO_COLOR", "1")
        .env_remove("MODHOST_LOG")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid log level"));
}
