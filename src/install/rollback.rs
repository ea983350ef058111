use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files touched by an unfinished install. Unless committed, created files
/// are removed and files that were set aside are moved back.
#[derive(Debug, Default)]
pub struct InstallRollback {
    created: Vec<PathBuf>,
    /// (backup, original) pairs
    set_aside: Vec<(PathBuf, PathBuf)>,
    committed: bool,
}

impl InstallRollback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a file this operation created
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.created.push(path.into());
    }

    /// Move an existing file to `<name>.shelf-old` so it can be restored.
    /// Returns false when there was nothing to move.
    pub fn set_aside(&mut self, path: &Path) -> io::Result<bool> {
        if fs::symlink_metadata(path).is_err() {
            return Ok(false);
        }
        let backup = backup_path(path);
        fs::rename(path, &backup)?;
        debug!("Set aside {}", path.display());
        self.set_aside.push((backup, path.to_path_buf()));
        Ok(true)
    }

    /// Keep every tracked file and drop the backups
    pub fn commit(mut self) {
        self.committed = true;
        for (backup, _) in self.set_aside.drain(..) {
            if let Err(e) = fs::remove_file(&backup) {
                warn!("Failed to remove {}: {}", backup.display(), e);
            }
        }
    }

    /// Undo everything now
    pub fn rollback(mut self) {
        self.undo();
    }

    fn undo(&mut self) {
        for path in self.created.drain(..).rev() {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Rolled back {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        for (backup, original) in self.set_aside.drain(..).rev() {
            match fs::rename(&backup, &original) {
                Ok(()) => debug!("Restored {}", original.display()),
                Err(e) => warn!("Failed to restore {}: {}", original.display(), e),
            }
        }
    }
}

impl Drop for InstallRollback {
    fn drop(&mut self) {
        if !self.committed {
            self.undo();
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".shelf-old");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_drop_removes_uncommitted() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a");
        fs::write(&file, "a").unwrap();

        let mut rollback = InstallRollback::new();
        rollback.track(&file);
        rollback.track(temp.path().join("never-created"));
        drop(rollback);

        assert!(!file.exists());
    }

    #[test]
    fn test_commit_keeps_files() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a");
        fs::write(&file, "a").unwrap();

        let mut rollback = InstallRollback::new();
        rollback.track(&file);
        rollback.commit();

        assert!(file.exists());
    }

    #[test]
    fn test_drop_restores_set_aside_files() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("tool.AppImage");
        fs::write(&file, "old").unwrap();

        let mut rollback = InstallRollback::new();
        assert!(rollback.set_aside(&file).unwrap());
        rollback.track(&file);
        fs::write(&file, "new").unwrap();
        drop(rollback);

        assert_eq!(fs::read_to_string(&file).unwrap(), "old");
        assert!(!temp.path().join("tool.AppImage.shelf-old").exists());
    }

    #[test]
    fn test_commit_drops_backups() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("tool.AppImage");
        fs::write(&file, "old").unwrap();

        let mut rollback = InstallRollback::new();
        assert!(rollback.set_aside(&file).unwrap());
        assert!(!rollback.set_aside(&temp.path().join("missing")).unwrap());
        fs::write(&file, "new").unwrap();
        rollback.commit();

        assert_eq!(fs::read_to_string(&file).unwrap(), "new");
        assert!(!temp.path().join("tool.AppImage.shelf-old").exists());
    }
}
