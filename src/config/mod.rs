use crate::core::path::{config_file, ensure_dir};
use crate::core::{ShelfError, ShelfResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod bundle;

pub use bundle::{BundleConfig, BundleConfigStore, UpdateManagerConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory integrated bundles are copied to (defaults to ~/AppImages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundles_dir: Option<String>,

    /// Application menu directory manifests are written to
    /// (defaults to ~/.local/share/applications)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications_dir: Option<String>,

    /// Directory icons are copied to (defaults to ~/.local/share/shelf/icons)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icons_dir: Option<String>,

    /// Scratch directory for downloads and mounts (defaults to ~/.cache/shelf)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,

    /// GitHub API settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Codeberg API base URL
    #[serde(default = "default_codeberg_api_url")]
    pub codeberg_api_url: String,

    /// Connect/read timeout for metadata requests, in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Override for the host architecture used to break asset ties
    /// Example: "x86_64", "aarch64"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Token used for API requests (GITHUB_TOKEN takes precedence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token: None,
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_codeberg_api_url() -> String {
    "https://codeberg.org/api/v1".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bundles_dir: None,
            applications_dir: None,
            icons_dir: None,
            scratch_dir: None,
            github: GitHubConfig::default(),
            codeberg_api_url: default_codeberg_api_url(),
            http_timeout_secs: default_http_timeout_secs(),
            architecture: None,
        }
    }
}

impl Config {
    /// Load config from the platform config directory, creating a default
    /// one if it doesn't exist
    pub fn load() -> ShelfResult<Self> {
        Self::load_from(&config_file()?)
    }

    /// Load config from an explicit path, creating a default one if it
    /// doesn't exist
    pub fn load_from(config_path: &Path) -> ShelfResult<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(config_path)?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ShelfError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save config to the platform config directory
    pub fn save(&self) -> ShelfResult<()> {
        self.save_to(&config_file()?)
    }

    /// Save config to an explicit path
    pub fn save_to(&self, config_path: &Path) -> ShelfResult<()> {
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ShelfError::Path("Invalid config path".to_string()))?;

        ensure_dir(config_dir)?;

        let content = serde_yaml::to_string(self)
            .map_err(|e| ShelfError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(config_path, content)?;
        Ok(())
    }

    pub fn get_bundles_dir(&self) -> ShelfResult<PathBuf> {
        match self.bundles_dir {
            Some(ref dir) => Ok(PathBuf::from(dir)),
            None => crate::core::path::bundles_dir(),
        }
    }

    pub fn get_applications_dir(&self) -> ShelfResult<PathBuf> {
        match self.applications_dir {
            Some(ref dir) => Ok(PathBuf::from(dir)),
            None => crate::core::path::applications_dir(),
        }
    }

    pub fn get_icons_dir(&self) -> ShelfResult<PathBuf> {
        match self.icons_dir {
            Some(ref dir) => Ok(PathBuf::from(dir)),
            None => crate::core::path::icons_dir(),
        }
    }

    pub fn get_scratch_dir(&self) -> ShelfResult<PathBuf> {
        match self.scratch_dir {
            Some(ref dir) => Ok(PathBuf::from(dir)),
            None => crate::core::path::cache_dir(),
        }
    }

    /// GitHub token, with GITHUB_TOKEN taking precedence over the config file
    pub fn github_token(&self) -> Option<String> {
        std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.github.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.codeberg_api_url, "https://codeberg.org/api/v1");
        assert_eq!(config.http_timeout_secs, 30);
        assert!(config.architecture.is_none());
    }

    #[test]
    fn test_load_creates_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shelf").join("config.yaml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.http_timeout_secs, 30);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");

        let config = Config {
            bundles_dir: Some("/opt/bundles".to_string()),
            architecture: Some("aarch64".to_string()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.bundles_dir.as_deref(), Some("/opt/bundles"));
        assert_eq!(loaded.architecture.as_deref(), Some("aarch64"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "http_timeout_secs: 5\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.http_timeout_secs, 5);
        assert_eq!(loaded.github.api_url, "https://api.github.com");
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "http_timeout_secs: [not a number\n").unwrap();

        match Config::load_from(&path) {
            Err(ShelfError::Config(msg)) => assert!(msg.contains("Failed to parse config")),
            other => panic!("Expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_custom_dirs() {
        let config = Config {
            applications_dir: Some("/tmp/apps".to_string()),
            icons_dir: Some("/tmp/icons".to_string()),
            ..Default::default()
        };
        assert_eq!(config.get_applications_dir().unwrap(), PathBuf::from("/tmp/apps"));
        assert_eq!(config.get_icons_dir().unwrap(), PathBuf::from("/tmp/icons"));
    }

    #[test]
    #[serial]
    fn test_github_token_env_wins() {
        let previous = std::env::var("GITHUB_TOKEN").ok();
        let mut config = Config::default();
        config.github.token = Some("from-config".to_string());

        std::env::set_var("GITHUB_TOKEN", "from-env");
        assert_eq!(config.github_token().as_deref(), Some("from-env"));

        std::env::set_var("GITHUB_TOKEN", "");
        assert_eq!(config.github_token().as_deref(), Some("from-config"));

        match previous {
            Some(v) => std::env::set_var("GITHUB_TOKEN", v),
            None => std::env::remove_var("GITHUB_TOKEN"),
        }
    }
}
