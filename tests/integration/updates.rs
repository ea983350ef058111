//! Tests for `shelf --list-updates` and `shelf --fetch-updates`

use super::common::Sandbox;
use predicates::prelude::*;
use std::fs;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_nothing_to_update() {
    let sandbox = Sandbox::new();
    sandbox
        .shelf()
        .arg("--list-updates")
        .assert()
        .success()
        .stdout(predicate::str::contains("All bundles are up to date."));
    sandbox
        .shelf()
        .arg("--fetch-updates")
        .assert()
        .success()
        .stdout(predicate::str::contains("All bundles are up to date."));
}

#[test]
fn test_bundle_without_update_source_is_skipped() {
    let sandbox = Sandbox::new();
    sandbox.integrated("Foo", "1.0", b"foo");

    sandbox
        .shelf()
        .arg("--list-updates")
        .assert()
        .success()
        .stdout(predicate::str::contains("All bundles are up to date."));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_updates_from_static_source() {
    let mock_server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/Foo.AppImage"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(vec![0u8; 1200], "application/octet-stream"),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/Bar.AppImage"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 3], "application/octet-stream"))
        .mount(&mock_server)
        .await;

    let sandbox = Sandbox::new();
    sandbox.integrated("Foo", "1.0", b"foo");
    sandbox.integrated("Bar", "2.0", b"bar");
    fs::create_dir_all(sandbox.bundle_settings().parent().unwrap()).unwrap();
    fs::write(
        sandbox.bundle_settings(),
        format!(
            "Foo:\n  update_url: {0}/Foo.AppImage\nBar:\n  update_url: {0}/Bar.AppImage\n",
            mock_server.uri()
        ),
    )
    .unwrap();

    let output = sandbox.shelf().arg("--list-updates").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Updates available:"));
    assert!(stdout.contains("Foo 1.0 (static_file)"));
    // Same size as installed: no update
    assert!(!stdout.contains("Bar"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_source_is_reported_not_hidden() {
    let mock_server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let sandbox = Sandbox::new();
    sandbox.integrated("Foo", "1.0", b"foo");
    fs::create_dir_all(sandbox.bundle_settings().parent().unwrap()).unwrap();
    fs::write(
        sandbox.bundle_settings(),
        format!("Foo:\n  update_url: {}/Foo.AppImage\n", mock_server.uri()),
    )
    .unwrap();

    sandbox
        .shelf()
        .arg("--list-updates")
        .assert()
        .success()
        .stderr(predicate::str::contains("Could not check Foo"));
}
