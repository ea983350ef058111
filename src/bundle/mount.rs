//! Mounting bundles through their own runtime (`--appimage-mount`).
//!
//! The runtime prints the mount point on stdout and keeps the FUSE mount
//! alive until it receives SIGTERM, so a mount is a running child process.

use crate::core::{ShelfError, ShelfResult};
use crate::di::traits::{MountedImage, Mounter};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Mounts a bundle by executing it with `--appimage-mount`
#[derive(Debug, Clone)]
pub struct SelfMounter {
    shutdown_timeout: Duration,
}

impl SelfMounter {
    pub fn new() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for SelfMounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Mounter for SelfMounter {
    fn mount(&self, image: &Path) -> ShelfResult<Box<dyn MountedImage>> {
        let mut child = Command::new(image)
            .arg("--appimage-mount")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ShelfError::Extraction(format!("Failed to start {}: {}", image.display(), e))
            })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                if let Err(e) = terminate(&mut child, self.shutdown_timeout) {
                    warn!("Failed to stop mount helper for {}: {}", image.display(), e);
                }
                return Err(ShelfError::Extraction(
                    "Mount helper has no stdout".to_string(),
                ));
            }
        };

        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let read = reader.read_line(&mut line);
        let root = PathBuf::from(line.trim());

        if !matches!(read, Ok(n) if n > 0) || !root.is_dir() {
            if let Err(e) = terminate(&mut child, self.shutdown_timeout) {
                warn!("Failed to stop mount helper for {}: {}", image.display(), e);
            }
            let mut stderr = String::new();
            if let Some(mut err) = child.stderr.take() {
                let _ = err.read_to_string(&mut stderr);
            }
            return Err(ShelfError::Extraction(format!(
                "Failed to mount {}: {}",
                image.display(),
                stderr.trim()
            )));
        }

        debug!("Mounted {} at {}", image.display(), root.display());
        Ok(Box::new(SelfMount {
            root,
            child: Some(child),
            _stdout: reader,
            shutdown_timeout: self.shutdown_timeout,
        }))
    }
}

struct SelfMount {
    root: PathBuf,
    child: Option<Child>,
    // Held open so the runtime never sees a closed pipe
    _stdout: BufReader<ChildStdout>,
    shutdown_timeout: Duration,
}

impl MountedImage for SelfMount {
    fn root(&self) -> &Path {
        &self.root
    }

    fn unmount(mut self: Box<Self>) -> ShelfResult<()> {
        match self.child.take() {
            Some(mut child) => {
                terminate(&mut child, self.shutdown_timeout)?;
                debug!("Unmounted {}", self.root.display());
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for SelfMount {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = terminate(&mut child, self.shutdown_timeout) {
                warn!("Failed to unmount {}: {}", self.root.display(), e);
            }
        }
    }
}

/// Ask the runtime to unmount (SIGTERM), escalating to SIGKILL on timeout
fn terminate(child: &mut Child, timeout: Duration) -> ShelfResult<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }

    if request_stop(child) {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if child.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(50));
        }
        warn!("Mount helper {} ignored SIGTERM, killing it", child.id());
    }

    child.kill()?;
    child.wait()?;
    Ok(())
}

#[cfg(unix)]
fn request_stop(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    #[allow(clippy::cast_possible_wrap)]
    let pid = Pid::from_raw(child.id() as i32);
    match kill(pid, Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to signal mount helper {}: {}", pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn request_stop(_child: &Child) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_mount_reads_mount_point_and_terminates() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        fs::create_dir(&root).unwrap();
        let image = script(
            temp.path(),
            "fake.AppImage",
            &format!("echo {}\nwhile true; do sleep 1; done", root.display()),
        );

        let mounter = SelfMounter::new();
        let mounted = mounter.mount(&image).unwrap();
        assert_eq!(mounted.root(), root.as_path());
        mounted.unmount().unwrap();
    }

    #[test]
    fn test_helper_ignoring_sigterm_is_killed() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        fs::create_dir(&root).unwrap();
        let image = script(
            temp.path(),
            "stubborn.AppImage",
            &format!("trap '' TERM\necho {}\nwhile true; do sleep 1; done", root.display()),
        );

        let mounter = SelfMounter {
            shutdown_timeout: Duration::from_millis(200),
        };
        let mounted = mounter.mount(&image).unwrap();
        let started = Instant::now();
        mounted.unmount().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_mount_failure_reports_stderr() {
        let temp = TempDir::new().unwrap();
        let image = script(temp.path(), "broken.AppImage", "echo 'fuse: missing' >&2\nexit 1");

        let result = SelfMounter::new().mount(&image);
        match result {
            Err(ShelfError::Extraction(msg)) => assert!(msg.contains("fuse: missing")),
            Err(e) => panic!("Expected extraction error, got {:?}", e),
            Ok(_) => panic!("Expected mount failure"),
        }
    }

    #[test]
    fn test_mount_missing_executable() {
        let temp = TempDir::new().unwrap();
        let result = SelfMounter::new().mount(&temp.path().join("missing.AppImage"));
        assert!(matches!(result, Err(ShelfError::Extraction(_))));
    }
}
