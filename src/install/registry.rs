//! Registering manifests with the desktop's application database.

use crate::core::{ShelfError, ShelfResult};
use crate::di::traits::DesktopRegistry;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

const REFRESH_TOOL: &str = "update-desktop-database";

/// Refreshes the application menu cache with `update-desktop-database`
///
/// Menus watch the applications directory themselves, so a missing tool
/// only means the cache catches up later.
#[derive(Debug, Clone)]
pub struct DesktopDatabase {
    tool: Option<PathBuf>,
}

impl DesktopDatabase {
    /// Use `update-desktop-database` from `PATH`, if installed
    pub fn new() -> Self {
        Self {
            tool: which::which(REFRESH_TOOL).ok(),
        }
    }

    pub fn with_tool(tool: Option<PathBuf>) -> Self {
        Self { tool }
    }

    fn refresh(&self, manifest: &Path) -> ShelfResult<()> {
        let dir = manifest.parent().ok_or_else(|| {
            ShelfError::Installation(format!("{} has no parent directory", manifest.display()))
        })?;

        let tool = match &self.tool {
            Some(tool) => tool,
            None => {
                debug!("{} not found, skipping menu refresh", REFRESH_TOOL);
                return Ok(());
            }
        };

        match Command::new(tool)
            .arg(dir)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
        {
            Ok(output) if output.status.success() => {
                debug!("Refreshed desktop database in {}", dir.display());
            }
            Ok(output) => warn!(
                "{} failed: {}",
                REFRESH_TOOL,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => warn!("Failed to run {}: {}", REFRESH_TOOL, e),
        }
        Ok(())
    }
}

impl Default for DesktopDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopRegistry for DesktopDatabase {
    fn register(&self, manifest: &Path) -> ShelfResult<()> {
        if !manifest.is_file() {
            return Err(ShelfError::Installation(format!(
                "Manifest {} was not written",
                manifest.display()
            )));
        }
        self.refresh(manifest)
    }

    fn unregister(&self, manifest: &Path) -> ShelfResult<()> {
        self.refresh(manifest)
    }
}
