//! Build script for framesync-player
//!
//! Exports build identification for the startup banner and the list of
//! audio outputs compiled into the binary:
//! - `GIT_HASH`: short commit hash, "unknown" outside a checkout
//! - `BUILD_TIMESTAMP`, `BUILD_PROFILE`
//! - `FRAMESYNC_AUDIO_OUTPUTS`: comma-separated `--output` values

use std::path::Path;
use std::process::Command;

fn git_hash() -> String {
    Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn audio_outputs() -> String {
    let mut outputs = vec!["capture"];
    if std::env::var_os("CARGO_FEATURE_CPAL_OUTPUT").is_some() {
        outputs.push("cpal");
    }
    outputs.join(",")
}

fn main() {
    let build_timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash());
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=BUILD_PROFILE={}", profile);
    println!("cargo:rustc-env=FRAMESYNC_AUDIO_OUTPUTS={}", audio_outputs());

    println!("cargo:rerun-if-changed=build.rs");
    // Refresh GIT_HASH on commit or checkout
    let head = Path::new("../.git/HEAD");
    if head.exists() {
        println!("cargo:rerun-if-changed={}", head.display());
    }
}
