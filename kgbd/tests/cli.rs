use std::process::Command;

#[test]
fn help_includes_usage() {
    let output = Command::new(env!("CARGO_BIN_EXE_kgbd"))
        .arg("--help")
        .output()
        .expect("failed to run kgbd --help");

    assert!(output.status.success(), "kgbd --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("kgbd") || stdout.contains("KGB"),
        "expected help output to mention kgbd, got: {stdout}"
    );
    assert!(stdout.contains("--config"));
}

#[test]
fn missing_config_file_is_fatal() {
    let output = Command::new(env!("CARGO_BIN_EXE_kgbd"))
        .args(["--config", "/nonexistent/kgb.conf", "--foreground"])
        .output()
        .expect("failed to run kgbd");

    assert!(!output.status.success());
}
