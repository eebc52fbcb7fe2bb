use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

/// Environment variables that would leak the developer's setup into tests.
const ISOLATED_VARS: &[&str] = &["DOCSTORE_MONGODB_URL", "DOCSTORE_DATABASE", "RUST_LOG"];

/// Get the live test server URL from the environment.
/// Returns None if not set, causing tests to be skipped.
#[allow(dead_code)]
pub fn get_test_url() -> Option<String> {
    std::env::var("DOCSTORE_TEST_MONGODB_URL").ok()
}

/// A command for the CLI binary with its config directory under `home`.
pub fn cli_command(args: &[&str], home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_docstore"));
    cmd.args(args);
    cmd.env("HOME", home);
    cmd.env("XDG_CONFIG_HOME", home.join("config"));
    for var in ISOLATED_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Run the CLI with an isolated HOME.
pub fn run_cli(args: &[&str], home: &Path) -> Output {
    cli_command(args, home)
        .output()
        .expect("Failed to execute CLI")
}

/// Run the CLI with an isolated HOME and expect success.
pub fn run_cli_success(args: &[&str], home: &Path) -> String {
    let output = run_cli(args, home);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("CLI command failed: {:?}\nstderr: {}", args, stderr);
    }
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Run the CLI with `input` on stdin.
#[allow(dead_code)]
pub fn run_cli_with_stdin(args: &[&str], home: &Path, input: &str) -> Output {
    let mut child = cli_command(args, home)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");

    child
        .stdin
        .take()
        .expect("stdin was piped")
        .write_all(input.as_bytes())
        .expect("Failed to write stdin");

    child.wait_with_output().expect("Failed to wait for CLI")
}
