//! Release API type definitions
//!
//! GitHub, Codeberg and Forgejo return the same shape for the fields used
//! here, so one set of types serves all three.

use serde::{Deserialize, Serialize};

/// A release and its uploaded assets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
    #[serde(default)]
    pub published_at: Option<String>,
}

impl Release {
    /// Assets whose name satisfies `matches`, in API order
    pub fn matching_assets(&self, matches: impl Fn(&str) -> bool) -> Vec<&ReleaseAsset> {
        self.assets.iter().filter(|a| matches(&a.name)).collect()
    }

    pub fn asset_named(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// Release asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    /// `sha256:<hex>`; only GitHub reports it
    #[serde(default)]
    pub digest: Option<String>,
}
