//! Per-bundle settings: update source, launch environment and arguments.
//!
//! Entries are keyed by the URL-encoded bundle display name so names with
//! spaces or slashes map to stable YAML keys.

use crate::core::path::{bundle_config_file, ensure_dir};
use crate::core::{ShelfError, ShelfResult};
use crate::update::ResolverKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Variant-specific resolver options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateManagerConfig {
    /// Consider pre-releases when looking for the newest release
    #[serde(default)]
    pub allow_prereleases: bool,

    /// Options not understood by this version, kept on save
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Settings stored for one bundle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_url: Option<String>,

    /// Resolver variant pinned by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_url_manager: Option<ResolverKind>,

    #[serde(default)]
    pub update_manager_config: UpdateManagerConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    /// KEY=VALUE pairs exported when the bundle is launched
    #[serde(default)]
    pub env_vars: Vec<String>,

    /// Extra arguments passed to the bundle on launch
    #[serde(default)]
    pub exec_arguments: Vec<String>,
}

impl BundleConfig {
    /// Environment variables as (key, value) pairs; malformed entries are skipped
    pub fn env_pairs(&self) -> Vec<(&str, &str)> {
        self.env_vars
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .filter(|(key, _)| !key.trim().is_empty())
            .collect()
    }
}

/// YAML-backed store of per-bundle settings
#[derive(Debug, Clone)]
pub struct BundleConfigStore {
    path: PathBuf,
    entries: BTreeMap<String, BundleConfig>,
}

impl BundleConfigStore {
    /// Load the store from the platform config directory
    pub fn load() -> ShelfResult<Self> {
        Self::load_from(&bundle_config_file()?)
    }

    /// Load the store from an explicit path; a missing file is an empty store
    pub fn load_from(path: &Path) -> ShelfResult<Self> {
        let entries = if path.exists() {
            let content = fs::read_to_string(path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_yaml::from_str(&content).map_err(|e| {
                    ShelfError::Config(format!(
                        "Failed to parse bundle settings {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn save(&self) -> ShelfResult<()> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let content = serde_yaml::to_string(&self.entries)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Encode a bundle display name into a store key
    pub fn encode_key(name: &str) -> String {
        urlencoding::encode(name).into_owned()
    }

    /// Settings for a bundle, or defaults when none were stored
    pub fn get(&self, name: &str) -> BundleConfig {
        self.entries
            .get(&Self::encode_key(name))
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&Self::encode_key(name))
    }

    pub fn set(&mut self, name: &str, config: BundleConfig) {
        self.entries.insert(Self::encode_key(name), config);
    }

    pub fn remove(&mut self, name: &str) -> Option<BundleConfig> {
        self.entries.remove(&Self::encode_key(name))
    }

    /// Decoded names of all bundles with stored settings
    pub fn names(&self) -> Vec<String> {
        self.entries
            .keys()
            .map(|key| {
                urlencoding::decode(key)
                    .map(|name| name.into_owned())
                    .unwrap_or_else(|_| key.clone())
            })
            .collect()
    }
}
