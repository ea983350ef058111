//! Mounting a bundle and recovering its manifest, icon and content hash.

use super::desktop_entry::DesktopEntry;
use super::embedded;
use crate::checksum::content_hash;
use crate::core::path::ensure_dir;
use crate::core::{ShelfError, ShelfResult};
use crate::di::traits::{MountedImage, Mounter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Icon locations inside a mounted tree, in order of preference.
/// `{}` is replaced with the icon name from the manifest.
const ICON_CANDIDATES: &[&str] = &[
    "{}.svg",
    "{}.png",
    "usr/share/icons/hicolor/scalable/apps/{}.svg",
    "usr/share/icons/hicolor/256x256/apps/{}.png",
    "usr/share/icons/hicolor/128x128/apps/{}.png",
];

/// What extraction recovered from a bundle
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedBundle {
    /// Display name (manifest `Name`, or the file stem when absent)
    pub name: String,
    pub entry: DesktopEntry,
    /// Icon copied out of the mount into scratch space; valid while this
    /// result (or a clone of it) is alive
    pub icon: Option<PathBuf>,
    pub hash: String,
    pub arch: Option<String>,
    /// Where the image was mounted; the mount is gone once extraction returns
    pub mount_root: PathBuf,
    copies: CopyDir,
}

/// Scratch directory for files copied out of a mount, removed with the last
/// clone of the extraction result
#[derive(Debug, Clone)]
struct CopyDir(Arc<TempDir>);

impl PartialEq for CopyDir {
    fn eq(&self, other: &Self) -> bool {
        self.0.path() == other.0.path()
    }
}

impl ExtractedBundle {
    pub fn terminal(&self) -> bool {
        self.entry.terminal()
    }
}

/// Mounts bundles and reads their manifest
#[derive(Clone)]
pub struct BundleExtractor {
    mounter: Arc<dyn Mounter>,
    scratch_dir: PathBuf,
}

impl BundleExtractor {
    /// Create a new extractor staging copies under `scratch_dir/extract`
    pub fn new(mounter: Arc<dyn Mounter>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            mounter,
            scratch_dir: scratch_dir.into(),
        }
    }

    fn work_dir(&self) -> PathBuf {
        self.scratch_dir.join("extract")
    }

    /// Extract `path`. The image is unmounted before this returns, whatever
    /// the outcome.
    pub fn extract(&self, path: &Path) -> ShelfResult<ExtractedBundle> {
        // Step 1: refuse anything that is not a bundle image
        let header = embedded::read_header_window(path)?;
        if embedded::bundle_type(&header).is_none() {
            return Err(ShelfError::Extraction(format!(
                "{} is not a bundle image",
                path.display()
            )));
        }
        let arch = embedded::architecture(&header);
        let hash = content_hash(path)?;

        // Step 2: stage an executable copy named after the content hash
        let work_dir = self.work_dir();
        ensure_dir(&work_dir)?;
        let staged = StagedCopy::create(path, &work_dir.join(format!("{}.AppImage", hash)))?;

        // Step 3: mount, read, unmount
        let copies = tempfile::Builder::new()
            .prefix(&format!("{}-", &hash[..8]))
            .tempdir_in(&work_dir)?;
        let mount = MountGuard::new(self.mounter.mount(&staged.path)?);
        let mount_root = mount.root().to_path_buf();
        let read = self.read_mounted(&mount_root, copies.path());
        let unmounted = mount.finish();
        let (entry, icon) = read?;
        unmounted?;

        let name = entry
            .name()
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| super::file_stem(path));

        debug!("Extracted {} ({}) from {}", name, &hash[..8], path.display());
        Ok(ExtractedBundle {
            name,
            entry,
            icon,
            hash,
            arch,
            mount_root,
            copies: CopyDir(Arc::new(copies)),
        })
    }

    fn read_mounted(
        &self,
        root: &Path,
        copies: &Path,
    ) -> ShelfResult<(DesktopEntry, Option<PathBuf>)> {
        let manifest = find_manifest(root)?;
        let entry = DesktopEntry::load(&manifest)?;

        let icon = match entry.icon().and_then(|icon| find_icon(root, icon)) {
            Some(found) => {
                let ext = found
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "png".to_string());
                let copy = copies.join(format!("icon.{}", ext));
                fs::copy(&found, &copy)?;
                Some(copy)
            }
            None => None,
        };

        Ok((entry, icon))
    }
}

/// The single `.desktop` file at the top level of a mounted tree
fn find_manifest(root: &Path) -> ShelfResult<PathBuf> {
    let entries = fs::read_dir(root).map_err(|e| {
        ShelfError::Extraction(format!("Cannot read mount root {}: {}", root.display(), e))
    })?;

    let mut manifests = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("desktop") && path.is_file() {
            manifests.push(path);
        }
    }

    match manifests.len() {
        1 => Ok(manifests.remove(0)),
        0 => Err(ShelfError::Extraction(
            "Bundle contains no desktop manifest".to_string(),
        )),
        n => Err(ShelfError::Extraction(format!(
            "Bundle contains {} desktop manifests, expected one",
            n
        ))),
    }
}

/// First existing icon for `icon` among the candidate locations
fn find_icon(root: &Path, icon: &str) -> Option<PathBuf> {
    let file_name = Path::new(icon).file_name()?.to_string_lossy().into_owned();
    let stem = match file_name.rsplit_once('.') {
        Some((stem, "png" | "svg")) => stem.to_string(),
        _ => file_name,
    };
    if stem.is_empty() {
        return None;
    }

    ICON_CANDIDATES
        .iter()
        .map(|pattern| root.join(pattern.replace("{}", &stem)))
        .find(|candidate| candidate.is_file())
}

/// Executable copy of a bundle, removed on drop
struct StagedCopy {
    path: PathBuf,
}

impl StagedCopy {
    fn create(source: &Path, dest: &Path) -> ShelfResult<Self> {
        fs::copy(source, dest)?;
        let staged = Self {
            path: dest.to_path_buf(),
        };
        set_executable(&staged.path)?;
        Ok(staged)
    }
}

impl Drop for StagedCopy {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

/// Unmounts on drop unless `finish` already did
struct MountGuard {
    inner: Option<Box<dyn MountedImage>>,
}

impl MountGuard {
    fn new(inner: Box<dyn MountedImage>) -> Self {
        Self { inner: Some(inner) }
    }

    fn root(&self) -> &Path {
        match &self.inner {
            Some(mounted) => mounted.root(),
            None => Path::new(""),
        }
    }

    fn finish(mut self) -> ShelfResult<()> {
        match self.inner.take() {
            Some(mounted) => mounted.unmount(),
            None => Ok(()),
        }
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        if let Some(mounted) = self.inner.take() {
            if let Err(e) = mounted.unmount() {
                warn!("Failed to unmount bundle: {}", e);
            }
        }
    }
}

/// Mark a file executable (0755)
pub(crate) fn set_executable(path: &Path) -> ShelfResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
