use crate::core::error::{ShelfError, ShelfResult};
use std::path::{Path, PathBuf};

/// Get the Shelf home directory
///
/// Platform-specific locations:
/// - Linux: ~/.config/shelf (or $XDG_CONFIG_HOME/shelf)
/// - macOS: ~/Library/Application Support/shelf
pub fn shelf_home() -> ShelfResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ShelfError::Path("Could not determine config directory".to_string()))?;
    Ok(config_dir.join("shelf"))
}

/// Get the cache directory, used as scratch space for downloads and mounts
///
/// Platform-specific locations:
/// - Linux: ~/.cache/shelf (or $XDG_CACHE_HOME/shelf)
/// - macOS: ~/Library/Caches/shelf
pub fn cache_dir() -> ShelfResult<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .ok_or_else(|| ShelfError::Path("Could not determine cache directory".to_string()))?;
    Ok(cache_dir.join("shelf"))
}

/// Get the global config file path (~/.config/shelf/config.yaml)
pub fn config_file() -> ShelfResult<PathBuf> {
    Ok(shelf_home()?.join("config.yaml"))
}

/// Get the per-bundle settings file path (~/.config/shelf/bundles.yaml)
pub fn bundle_config_file() -> ShelfResult<PathBuf> {
    Ok(shelf_home()?.join("bundles.yaml"))
}

/// Get the user's application menu directory (~/.local/share/applications)
pub fn applications_dir() -> ShelfResult<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ShelfError::Path("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("applications"))
}

/// Get the directory integrated bundle icons are copied to
/// (~/.local/share/shelf/icons)
pub fn icons_dir() -> ShelfResult<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ShelfError::Path("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("shelf").join("icons"))
}

/// Get the managed directory integrated bundles are copied to (~/AppImages)
pub fn bundles_dir() -> ShelfResult<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ShelfError::Path("Could not determine home directory".to_string()))?;
    Ok(home.join("AppImages"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> ShelfResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("dir");

        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());

        // Second call is a no-op
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    #[serial]
    #[cfg(target_os = "linux")]
    fn test_xdg_locations() {
        let temp = TempDir::new().unwrap();
        let old_config = std::env::var_os("XDG_CONFIG_HOME");
        let old_data = std::env::var_os("XDG_DATA_HOME");
        std::env::set_var("XDG_CONFIG_HOME", temp.path().join("config"));
        std::env::set_var("XDG_DATA_HOME", temp.path().join("data"));

        assert_eq!(
            config_file().unwrap(),
            temp.path().join("config").join("shelf").join("config.yaml")
        );
        assert_eq!(
            applications_dir().unwrap(),
            temp.path().join("data").join("applications")
        );

        match old_config {
            Some(v) => std::env::set_var("XDG_CONFIG_HOME", v),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
        match old_data {
            Some(v) => std::env::set_var("XDG_DATA_HOME", v),
            None => std::env::remove_var("XDG_DATA_HOME"),
        }
    }
}
