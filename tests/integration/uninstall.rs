//! Tests for `shelf --uninstall`

use super::common::Sandbox;
use predicates::prelude::*;
use std::fs;

#[test]
fn test_uninstall_missing_file() {
    let sandbox = Sandbox::new();
    sandbox
        .shelf()
        .arg("--uninstall")
        .arg(sandbox.root().join("missing.AppImage"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No such bundle file"));
}

#[test]
fn test_uninstall_file_that_is_not_integrated() {
    let sandbox = Sandbox::new();
    let file = sandbox.root().join("loose.AppImage");
    fs::write(&file, "loose").unwrap();

    sandbox
        .shelf()
        .arg("--uninstall")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not integrated"));
}

#[test]
fn test_uninstall_removes_bundle_and_manifest() {
    let sandbox = Sandbox::new();
    let (bundle, manifest) = sandbox.integrated("Foo", "1.0", b"foo");
    fs::create_dir_all(sandbox.bundle_settings().parent().unwrap()).unwrap();
    fs::write(&sandbox.bundle_settings(), "Foo:\n  env_vars:\n  - A=1\n").unwrap();

    sandbox
        .shelf()
        .arg("--uninstall")
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed Foo"));

    assert!(!bundle.exists());
    assert!(!manifest.exists());
    // Settings survive without --delete
    assert!(fs::read_to_string(sandbox.bundle_settings())
        .unwrap()
        .contains("Foo"));
}

#[test]
fn test_uninstall_delete_forgets_settings() {
    let sandbox = Sandbox::new();
    let (bundle, _) = sandbox.integrated("Foo", "1.0", b"foo");
    fs::create_dir_all(sandbox.bundle_settings().parent().unwrap()).unwrap();
    fs::write(
        &sandbox.bundle_settings(),
        "Foo:\n  env_vars:\n  - A=1\nBar:\n  env_vars: []\n",
    )
    .unwrap();

    sandbox
        .shelf()
        .arg("--uninstall")
        .arg(&bundle)
        .arg("--delete")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed settings for Foo"));

    let settings = fs::read_to_string(sandbox.bundle_settings()).unwrap();
    assert!(!settings.contains("Foo"));
    assert!(settings.contains("Bar"));
}
