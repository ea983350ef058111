//! Tests for `shelf --integrate`

use super::common::Sandbox;
use predicates::prelude::*;
use std::fs;

#[test]
fn test_requires_an_action() {
    let sandbox = Sandbox::new();
    sandbox.shelf().assert().failure();
}

#[test]
fn test_integrate_missing_file() {
    let sandbox = Sandbox::new();
    sandbox
        .shelf()
        .arg("--integrate")
        .arg(sandbox.root().join("missing.AppImage"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No such bundle file"));
}

#[test]
fn test_integrate_rejects_non_bundle() {
    let sandbox = Sandbox::new();
    let script = sandbox.root().join("tool.AppImage");
    fs::write(&script, "#!/bin/sh\necho hello\n").unwrap();

    sandbox
        .shelf()
        .arg("--integrate")
        .arg(&script)
        .arg("--yes")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a bundle image"));

    assert!(!sandbox.applications_dir().exists());
}

#[test]
fn test_flags_require_their_action() {
    let sandbox = Sandbox::new();
    sandbox.shelf().args(["--list-installed", "--replace"]).assert().failure();
    sandbox.shelf().args(["--list-installed", "--delete"]).assert().failure();
}

#[test]
fn test_actions_are_exclusive() {
    let sandbox = Sandbox::new();
    sandbox
        .shelf()
        .args(["--list-installed", "--list-updates"])
        .assert()
        .failure();
}
