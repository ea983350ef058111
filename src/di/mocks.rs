//! Test doubles for the mount helper and the desktop database

use super::traits::{DesktopRegistry, MountedImage, Mounter};
use crate::core::{ShelfError, ShelfResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Mounter that "mounts" a prepared directory tree instead of the image
///
/// Images are matched by file stem (the extractor stages copies as
/// `<content hash>.AppImage`), falling back to the default root. Mount and
/// unmount calls are counted so tests can check that every mount is torn
/// down.
///
/// # Example
///
/// ```
/// use shelf::di::mocks::FixtureMounter;
/// use shelf::di::Mounter;
/// use std::path::Path;
///
/// let mounter = FixtureMounter::new("/tmp/root");
/// let mounted = mounter.mount(Path::new("/tmp/any.AppImage")).unwrap();
/// assert_eq!(mounted.root(), Path::new("/tmp/root"));
/// mounted.unmount().unwrap();
/// assert_eq!(mounter.active(), 0);
/// ```
#[derive(Clone)]
pub struct FixtureMounter {
    default_root: PathBuf,
    roots: Arc<Mutex<HashMap<String, PathBuf>>>,
    mounts: Arc<AtomicUsize>,
    unmounts: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl FixtureMounter {
    pub fn new(default_root: impl Into<PathBuf>) -> Self {
        Self {
            default_root: default_root.into(),
            roots: Arc::new(Mutex::new(HashMap::new())),
            mounts: Arc::new(AtomicUsize::new(0)),
            unmounts: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Serve `root` for images whose file stem is `stem`
    pub fn add_root(&self, stem: &str, root: impl Into<PathBuf>) {
        if let Ok(mut roots) = self.roots.lock() {
            roots.insert(stem.to_string(), root.into());
        }
    }

    /// Make every following mount fail
    pub fn fail_mounts(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn mounts(&self) -> usize {
        self.mounts.load(Ordering::SeqCst)
    }

    pub fn unmounts(&self) -> usize {
        self.unmounts.load(Ordering::SeqCst)
    }

    /// Mounts not yet torn down
    pub fn active(&self) -> usize {
        self.mounts().saturating_sub(self.unmounts())
    }
}

impl Mounter for FixtureMounter {
    fn mount(&self, image: &Path) -> ShelfResult<Box<dyn MountedImage>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ShelfError::Extraction(format!(
                "Failed to mount {}",
                image.display()
            )));
        }

        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let root = self
            .roots
            .lock()
            .ok()
            .and_then(|roots| roots.get(&stem).cloned())
            .unwrap_or_else(|| self.default_root.clone());

        self.mounts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixtureMount {
            root,
            unmounts: Arc::clone(&self.unmounts),
        }))
    }
}

struct FixtureMount {
    root: PathBuf,
    unmounts: Arc<AtomicUsize>,
}

impl MountedImage for FixtureMount {
    fn root(&self) -> &Path {
        &self.root
    }

    fn unmount(self: Box<Self>) -> ShelfResult<()> {
        self.unmounts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Desktop registry that records calls instead of touching the system
#[derive(Clone, Default)]
pub struct RecordingRegistry {
    registered: Arc<Mutex<Vec<PathBuf>>>,
    unregistered: Arc<Mutex<Vec<PathBuf>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `register` call fail
    pub fn fail_registration(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn registered(&self) -> Vec<PathBuf> {
        self.registered.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn unregistered(&self) -> Vec<PathBuf> {
        self.unregistered
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl DesktopRegistry for RecordingRegistry {
    fn register(&self, manifest: &Path) -> ShelfResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ShelfError::Installation(format!(
                "Cannot register {}: database locked",
                manifest.display()
            )));
        }
        if let Ok(mut registered) = self.registered.lock() {
            registered.push(manifest.to_path_buf());
        }
        Ok(())
    }

    fn unregister(&self, manifest: &Path) -> ShelfResult<()> {
        if let Ok(mut unregistered) = self.unregistered.lock() {
            unregistered.push(manifest.to_path_buf());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_mounter_counts() {
        let mounter = FixtureMounter::new("/tmp/default");
        mounter.add_root("abc", "/tmp/abc");

        let first = mounter.mount(Path::new("/scratch/abc.AppImage")).unwrap();
        assert_eq!(first.root(), Path::new("/tmp/abc"));
        let second = mounter.mount(Path::new("/scratch/other.AppImage")).unwrap();
        assert_eq!(second.root(), Path::new("/tmp/default"));
        assert_eq!(mounter.active(), 2);

        first.unmount().unwrap();
        second.unmount().unwrap();
        assert_eq!(mounter.mounts(), 2);
        assert_eq!(mounter.active(), 0);
    }

    #[test]
    fn test_fixture_mounter_failure() {
        let mounter = FixtureMounter::new("/tmp/default");
        mounter.fail_mounts(true);
        assert!(mounter.mount(Path::new("/x.AppImage")).is_err());
        assert_eq!(mounter.mounts(), 0);
    }

    #[test]
    fn test_recording_registry() {
        let registry = RecordingRegistry::new();
        registry.register(Path::new("/apps/a.desktop")).unwrap();
        registry.unregister(Path::new("/apps/a.desktop")).unwrap();
        assert_eq!(registry.registered(), vec![PathBuf::from("/apps/a.desktop")]);
        assert_eq!(registry.unregistered(), vec![PathBuf::from("/apps/a.desktop")]);

        registry.fail_registration(true);
        assert!(registry.register(Path::new("/apps/b.desktop")).is_err());
        assert_eq!(registry.registered().len(), 1);
    }
}
