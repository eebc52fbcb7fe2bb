//! Build script to capture git version information at compile time.

use std::path::PathBuf;
use std::process::Command;

fn main() {
    // The crate sits below the workspace root, so ask git where its
    // directory is rather than assuming `./.git`.
    if let Some(git_dir) = git(&["rev-parse", "--absolute-git-dir"]) {
        let git_dir = PathBuf::from(git_dir);
        println!("cargo:rerun-if-changed={}", git_dir.join("HEAD").display());
        println!("cargo:rerun-if-changed={}", git_dir.join("refs").display());
    }

    // Fall back to the package version outside a checkout (e.g. from crates.io)
    let version = git(&["describe", "--tags", "--always", "--dirty"])
        .map(|v| v.strip_prefix('v').map(str::to_string).unwrap_or(v))
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=DOCSTORE_VERSION={}", version);
}

/// Run git and return its trimmed stdout, or `None` if git is missing or fails.
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }

    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
