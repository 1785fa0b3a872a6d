//! Build script for action-lock-engine
//!
//! Stamps the replay binary's banner with the build date and commit.
//! `SOURCE_DATE_EPOCH` pins the date for reproducible builds.

use std::env;
use std::process::Command;

/// Trimmed stdout of a command that exited successfully
fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn build_date() -> Option<String> {
    match env::var("SOURCE_DATE_EPOCH") {
        Ok(epoch) => command_stdout("date", &["-u", "-d", &format!("@{}", epoch), "+%Y-%m-%d"]),
        Err(_) => command_stdout("date", &["-u", "+%Y-%m-%d"]),
    }
}

fn main() {
    let date = build_date().unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=BUILD_DATE={}", date);

    // Short hash, marked when the tree has local edits
    let commit = command_stdout("git", &["describe", "--always", "--dirty", "--abbrev=8"])
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=GIT_HASH={}", commit);

    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
