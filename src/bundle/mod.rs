//! Bundle identity: records of integrated bundles, their status machine, and
//! bundle files on disk.

pub mod desktop_entry;
pub mod embedded;
pub mod extractor;
pub mod mount;

pub use desktop_entry::DesktopEntry;
pub use extractor::{BundleExtractor, ExtractedBundle};
pub use mount::SelfMounter;

use crate::config::BundleConfig;
use crate::core::{ShelfError, ShelfResult};
use desktop_entry::{ARCH_KEY, BUNDLE_KEY, HASH_KEY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Lifecycle state of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstalledStatus {
    NotInstalled,
    Installing,
    Installed,
    UpdateAvailable,
    Updating,
    Uninstalling,
    /// Terminal: an operation failed half way and could not be reverted
    Error,
}

impl InstalledStatus {
    /// Whether an operation is running on the bundle
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            InstalledStatus::Installing | InstalledStatus::Updating | InstalledStatus::Uninstalling
        )
    }

    pub fn is_installed(self) -> bool {
        matches!(
            self,
            InstalledStatus::Installed | InstalledStatus::UpdateAvailable
        )
    }

    /// Whether `self -> next` is a valid edge, including the revert edges
    /// taken when an operation fails
    pub fn can_transition_to(self, next: InstalledStatus) -> bool {
        use InstalledStatus::*;
        match (self, next) {
            (NotInstalled, Installing) => true,
            (Installing, Installed) | (Installing, NotInstalled) => true,
            (Installed, UpdateAvailable) | (Installed, Updating) | (Installed, Uninstalling) => {
                true
            }
            (UpdateAvailable, Installed)
            | (UpdateAvailable, Updating)
            | (UpdateAvailable, Uninstalling) => true,
            (Updating, Installed) => true,
            (Uninstalling, NotInstalled) | (Uninstalling, Installed) => true,
            (from, Error) => from.is_in_flight(),
            _ => false,
        }
    }

    /// Move to `next`, rejecting invalid edges
    pub fn transition(&mut self, next: InstalledStatus) -> ShelfResult<()> {
        if !self.can_transition_to(next) {
            return Err(ShelfError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for InstalledStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InstalledStatus::NotInstalled => "not installed",
            InstalledStatus::Installing => "installing",
            InstalledStatus::Installed => "installed",
            InstalledStatus::UpdateAvailable => "update available",
            InstalledStatus::Updating => "updating",
            InstalledStatus::Uninstalling => "uninstalling",
            InstalledStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// One integrated or candidate bundle
#[derive(Debug, Clone, PartialEq)]
pub struct BundleRecord {
    pub name: String,
    pub description: Option<String>,
    /// Bundle file: the managed copy once installed, the inspected file before
    pub path: PathBuf,
    pub hash: Option<String>,
    pub version: Option<String>,
    pub status: InstalledStatus,
    pub arch: Option<String>,
    /// Registered manifest, absent for bundles that are not integrated
    pub manifest: Option<PathBuf>,
    pub icon: Option<PathBuf>,
    pub settings: BundleConfig,
}

impl BundleRecord {
    /// Transient record for a bundle that has been extracted but not installed
    pub fn from_extracted(path: &Path, extracted: &ExtractedBundle) -> Self {
        Self {
            name: extracted.name.clone(),
            description: extracted.entry.comment().map(str::to_string),
            path: path.to_path_buf(),
            hash: Some(extracted.hash.clone()),
            version: extracted.entry.declared_version().map(str::to_string),
            status: InstalledStatus::NotInstalled,
            arch: extracted.arch.clone(),
            manifest: None,
            icon: None,
            settings: BundleConfig::default(),
        }
    }

    /// Rebuild the record of an installed bundle from its registered manifest.
    ///
    /// Returns `None` for manifests not written by this tool.
    pub fn from_manifest(manifest: &Path) -> ShelfResult<Option<Self>> {
        let entry = DesktopEntry::load(manifest)?;
        let bundle = match entry.get(BUNDLE_KEY) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => return Ok(None),
        };

        let name = entry
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| file_stem(&bundle));

        Ok(Some(Self {
            name,
            description: entry.comment().map(str::to_string),
            path: bundle,
            hash: entry.get(HASH_KEY).map(str::to_string),
            version: entry.declared_version().map(str::to_string),
            status: InstalledStatus::Installed,
            arch: entry.get(ARCH_KEY).map(str::to_string),
            manifest: Some(manifest.to_path_buf()),
            icon: entry
                .icon()
                .map(PathBuf::from)
                .filter(|icon| icon.is_absolute()),
            settings: BundleConfig::default(),
        }))
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A bundle file on disk; extraction results are cached per instance
/// (clones share the cache)
#[derive(Debug, Clone)]
pub struct BundleFile {
    path: PathBuf,
    extracted: Arc<Mutex<Option<Arc<ExtractedBundle>>>>,
}

impl BundleFile {
    /// Open a bundle file; a missing path is an invalid argument
    pub fn open(path: impl AsRef<Path>) -> ShelfResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ShelfError::InvalidArgument(format!(
                "No such bundle file: {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            extracted: Arc::new(Mutex::new(None)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extract the bundle, or return the cached result of an earlier call
    pub fn extract(&self, extractor: &BundleExtractor) -> ShelfResult<Arc<ExtractedBundle>> {
        let mut cached = self
            .extracted
            .lock()
            .map_err(|_| ShelfError::Extraction("Extraction cache poisoned".to_string()))?;

        if let Some(extracted) = cached.as_ref() {
            return Ok(Arc::clone(extracted));
        }

        let extracted = Arc::new(extractor.extract(&self.path)?);
        *cached = Some(Arc::clone(&extracted));
        Ok(extracted)
    }

    /// Cached extraction result, if any
    pub fn extracted(&self) -> Option<Arc<ExtractedBundle>> {
        self.extracted.lock().ok().and_then(|c| c.clone())
    }

    /// Update source embedded in the bundle binary, decoded
    pub fn embedded_update_source(&self) -> ShelfResult<Option<String>> {
        let raw = embedded::read_update_info(&self.path)?;
        Ok(raw.as_deref().and_then(embedded::decode_update_info))
    }
}
