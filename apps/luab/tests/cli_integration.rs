#![warn(clippy::pedantic)]

//! Integration tests for the luab CLI.
//!
//! These tests spawn the compiled binary and check stdout, stderr and exit
//! codes. None of them reach the network: every run either fails argument
//! validation, is rejected before the fetch stage, or finds its archive
//! already staged in a temporary work directory.

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn luab() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("luab"));
    // Keep the caller's environment from redirecting the work directory.
    cmd.env_remove("LUABUILD_WORK_DIR")
        .env_remove("LUABUILD_PREFIX")
        .env_remove("LUABUILD_MIRROR");
    cmd
}

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn version_flag_shows_version() {
    luab()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_lists_every_option() {
    luab().arg("--help").assert().success().stdout(
        predicate::str::contains("--download")
            .and(predicate::str::contains("--lua"))
            .and(predicate::str::contains("--force"))
            .and(predicate::str::contains("--work-dir"))
            .and(predicate::str::contains("--prefix"))
            .and(predicate::str::contains("--mirror"))
            .and(predicate::str::contains("--strict")),
    );
}

#[test]
fn no_arguments_prints_usage_hint() {
    luab()
        .assert()
        .success()
        .stdout(predicate::str::contains("luab --help"));
}

// =============================================================================
// Argument validation
// =============================================================================

/// **Expected behavior**: `--lua` alone is a usage error (exit 2).
#[test]
fn lua_without_download_fails() {
    luab()
        .args(["--lua", "5.4.6"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--download"));
}

/// **Expected behavior**: `-d` alone is a usage error (exit 2).
#[test]
fn download_without_lua_fails() {
    luab()
        .arg("-d")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--lua"));
}

#[test]
fn malformed_version_fails() {
    luab()
        .args(["-d", "--lua", "five.four"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid version"));
}

// =============================================================================
// Pipeline failures
// =============================================================================

/// **Expected behavior**: exit 1 naming the stage and version, and no work
/// directory or install tree is created.
#[test]
fn unsupported_version_creates_nothing() {
    let temp = assert_fs::TempDir::new().expect("temp dir");
    let work_dir = temp.child("downloads");

    luab()
        .current_dir(temp.path())
        .args(["-d", "--lua", "5.1.5", "-q"])
        .arg("--work-dir")
        .arg(work_dir.path())
        .assert()
        .code(1)
        .stderr(
            predicate::str::contains("compile failed for Lua 5.1.5")
                .and(predicate::str::contains("not supported")),
        );

    work_dir.assert(predicate::path::missing());
    temp.child("lua-5.1.5").assert(predicate::path::missing());
}

/// **Expected behavior**: a staged archive is used without downloading, and
/// a corrupt one fails the extract stage.
#[test]
fn corrupt_staged_archive_fails_extraction() {
    let temp = assert_fs::TempDir::new().expect("temp dir");
    let work_dir = temp.child("downloads");
    work_dir
        .child("lua-5.4.6.tar.gz")
        .write_binary(b"this is not a gzip stream")
        .expect("write archive");

    luab()
        .current_dir(temp.path())
        .args(["-d", "--lua", "5.4.6", "-q"])
        .args(["--mirror", "http://127.0.0.1:9"])
        .arg("--work-dir")
        .arg(work_dir.path())
        .arg("--prefix")
        .arg(temp.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("extract failed for Lua 5.4.6"));

    work_dir.child("lua-5.4.6").assert(predicate::path::missing());
    temp.child("lua-5.4.6").assert(predicate::path::missing());
}
