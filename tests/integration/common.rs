//! Common utilities for integration tests

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway home directory with XDG locations below it
pub struct Sandbox {
    pub temp: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn applications_dir(&self) -> PathBuf {
        self.root().join("data").join("applications")
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.root().join("home").join("AppImages")
    }

    pub fn bundle_settings(&self) -> PathBuf {
        self.root().join("config").join("shelf").join("bundles.yaml")
    }

    pub fn shelf(&self) -> Command {
        let mut cmd = Command::cargo_bin("shelf").unwrap();
        cmd.env("HOME", self.root().join("home"))
            .env("XDG_CONFIG_HOME", self.root().join("config"))
            .env("XDG_DATA_HOME", self.root().join("data"))
            .env("XDG_CACHE_HOME", self.root().join("cache"))
            .env_remove("GITHUB_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Lay out an integrated bundle the way the pipeline writes it
    pub fn integrated(&self, name: &str, version: &str, content: &[u8]) -> (PathBuf, PathBuf) {
        let stem = format!("{}_0123abcd", name);
        let bundle = self.bundles_dir().join(format!("{}.AppImage", stem));
        fs::create_dir_all(self.bundles_dir()).unwrap();
        fs::write(&bundle, content).unwrap();

        let manifest = self.applications_dir().join(format!("shelf_{}.desktop", stem));
        fs::create_dir_all(self.applications_dir()).unwrap();
        fs::write(
            &manifest,
            format!(
                "[Desktop Entry]\nType=Application\nName={}\nExec={}\nX-Shelf-Version={}\nX-Shelf-Bundle={}\nX-Shelf-Hash=0123abcd\n",
                name,
                bundle.display(),
                version,
                bundle.display()
            ),
        )
        .unwrap();
        (bundle, manifest)
    }
}
