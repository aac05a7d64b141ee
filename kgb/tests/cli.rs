use std::process::Command;

#[test]
fn help_lists_the_client_contract() {
    let output = Command::new(env!("CARGO_BIN_EXE_kgb-client"))
        .arg("--help")
        .output()
        .expect("failed to run kgb-client --help");

    assert!(output.status.success(), "kgb-client --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in [
        "--conf",
        "--uri",
        "--proxy",
        "--repo-id",
        "--password",
        "--timeout",
        "--branch-and-module-re",
        "--ignore-branch",
        "--repository",
        "--git-reflog",
    ] {
        assert!(stdout.contains(flag), "help is missing {flag}");
    }
}

#[test]
fn missing_repo_id_is_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_kgb-client"))
        .args(["--uri", "http://localhost:1/", "--password", "pw"])
        .output()
        .expect("failed to run kgb-client");

    assert!(!output.status.success());
}
