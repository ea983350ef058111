//! Tests for `shelf --list-installed`

use super::common::Sandbox;
use predicates::prelude::*;
use std::fs;

#[test]
fn test_list_empty() {
    let sandbox = Sandbox::new();
    sandbox
        .shelf()
        .arg("--list-installed")
        .assert()
        .success()
        .stdout(predicate::str::contains("No bundles integrated."));

    // First run writes the default config
    assert!(sandbox.root().join("config/shelf/config.yaml").exists());
}

#[test]
fn test_list_integrated_bundles() {
    let sandbox = Sandbox::new();
    let (bundle, _) = sandbox.integrated("Foo", "1.0", b"foo");
    sandbox.integrated("Bar", "2.5", b"bar");

    // Manifests written by other tools are ignored
    fs::write(
        sandbox.applications_dir().join("firefox.desktop"),
        "[Desktop Entry]\nName=Firefox\nExec=firefox\n",
    )
    .unwrap();

    let output = sandbox.shelf().arg("--list-installed").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Foo 1.0"));
    assert!(stdout.contains("Bar 2.5"));
    assert!(stdout.contains(&bundle.display().to_string()));
    assert!(!stdout.contains("Firefox"));
    assert!(stdout.find("Bar").unwrap() < stdout.find("Foo").unwrap());
}
