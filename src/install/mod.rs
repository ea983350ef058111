//! Integrating bundles into the application menu, updating them in place and
//! removing them again.
//!
//! An integrated bundle is three files named after one stem (see
//! [`naming`]): the bundle copy in the bundles directory, its icon, and a
//! rewritten manifest in the applications directory. The manifest carries
//! the vendor keys from which [`BundleRecord::from_manifest`] rebuilds the
//! record, so the applications directory is the index of installed bundles.
//!
//! Every operation moves the record through [`InstalledStatus`] and flips it
//! to its final state last. Failures revert the status:
//!
//! - install failures go back to `NotInstalled` after removing what was copied
//! - update failures go back to `Installed` and restore the old files, also
//!   when registering the new manifest fails
//! - uninstall failures go back to `Installed` if nothing was removed yet, and
//!   to `Error` if the bundle is gone but its manifest could not be removed

pub mod conflict;
pub mod naming;
pub mod registry;
pub mod rollback;

pub use conflict::ConflictResolution;
pub use registry::DesktopDatabase;

use crate::bundle::desktop_entry::{ARCH_KEY, BUNDLE_KEY, HASH_KEY, INSTALLED_KEY, VERSION_KEY};
use crate::bundle::extractor::set_executable;
use crate::bundle::{
    file_stem, BundleExtractor, BundleFile, BundleRecord, DesktopEntry, ExtractedBundle,
    InstalledStatus,
};
use crate::checksum::content_hash;
use crate::config::{BundleConfig, Config};
use crate::core::path::ensure_dir;
use crate::core::{ShelfError, ShelfResult};
use crate::di::traits::DesktopRegistry;
use crate::download::{run_blocking, ProgressCallback};
use crate::update::{InstalledFile, ReleaseResolver};
use chrono::Utc;
use conflict::find_conflict;
use rollback::InstallRollback;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Directories an installation writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    pub bundles_dir: PathBuf,
    pub applications_dir: PathBuf,
    pub icons_dir: PathBuf,
}

impl InstallLayout {
    pub fn from_config(config: &Config) -> ShelfResult<Self> {
        Ok(Self {
            bundles_dir: config.get_bundles_dir()?,
            applications_dir: config.get_applications_dir()?,
            icons_dir: config.get_icons_dir()?,
        })
    }

    fn icon_path(&self, stem: &str, icon: &Path) -> PathBuf {
        let ext = icon
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "png".to_string());
        self.icons_dir.join(format!("{}.{}", stem, ext))
    }
}

/// Where one bundle's files go, and what its manifest says
#[derive(Debug, Clone)]
struct Placement {
    bundle: PathBuf,
    icon: Option<PathBuf>,
    manifest: PathBuf,
    name: String,
    version: String,
}

pub struct InstallationPipeline {
    layout: InstallLayout,
    extractor: BundleExtractor,
    registry: Arc<dyn DesktopRegistry>,
}

impl InstallationPipeline {
    pub fn new(
        layout: InstallLayout,
        extractor: BundleExtractor,
        registry: Arc<dyn DesktopRegistry>,
    ) -> Self {
        Self {
            layout,
            extractor,
            registry,
        }
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Records of all bundles integrated by this tool, sorted by name
    pub fn installed(&self) -> ShelfResult<Vec<BundleRecord>> {
        let dir = &self.layout.applications_dir;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy();
            if !file_name.starts_with(naming::MANIFEST_PREFIX) || !file_name.ends_with(".desktop")
            {
                continue;
            }

            match BundleRecord::from_manifest(entry.path()) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!("{} is not a bundle manifest", entry.path().display()),
                Err(e) => warn!("Skipping unreadable manifest {}: {}", entry.path().display(), e),
            }
        }

        records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
        Ok(records)
    }

    pub fn find_by_name(&self, name: &str) -> ShelfResult<Option<BundleRecord>> {
        Ok(self.installed()?.into_iter().find(|r| r.name == name))
    }

    /// Installed record for `file`: either the managed copy itself, or any
    /// file with the same content
    pub fn find_installed(&self, file: &Path) -> ShelfResult<Option<BundleRecord>> {
        let installed = self.installed()?;
        let wanted = fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
        if let Some(record) = installed
            .iter()
            .find(|r| fs::canonicalize(&r.path).map_or(false, |p| p == wanted))
        {
            return Ok(Some(record.clone()));
        }

        if !file.is_file() {
            return Ok(None);
        }
        let hash = content_hash(file)?;
        Ok(installed
            .into_iter()
            .find(|r| r.hash.as_deref() == Some(hash.as_str())))
    }

    /// Extract a bundle off the async runtime; cached per [`BundleFile`]
    pub async fn extract(&self, file: &BundleFile) -> ShelfResult<Arc<ExtractedBundle>> {
        let file = file.clone();
        let extractor = self.extractor.clone();
        run_blocking(move || file.extract(&extractor)).await
    }

    /// Record for a bundle file: the installed one when the same content is
    /// already integrated, a transient `NotInstalled` record otherwise
    pub async fn inspect(&self, file: &BundleFile) -> ShelfResult<BundleRecord> {
        let extracted = self.extract(file).await?;
        if let Some(installed) = self
            .installed()?
            .into_iter()
            .find(|r| r.hash.as_deref() == Some(extracted.hash.as_str()))
        {
            return Ok(installed);
        }
        Ok(BundleRecord::from_extracted(file.path(), &extracted))
    }

    /// Integrate `file`. A display-name collision fails with
    /// [`ShelfError::NameConflict`] unless `policy` says how to resolve it.
    pub async fn install(
        &self,
        record: &mut BundleRecord,
        file: &BundleFile,
        policy: Option<ConflictResolution>,
    ) -> ShelfResult<()> {
        record.status.transition(InstalledStatus::Installing)?;

        match self.install_file(record, file, policy).await {
            Ok(installed) => {
                *record = installed;
                record.status.transition(InstalledStatus::Installed)?;
                info!("Integrated {} as {}", record.name, record.path.display());
                Ok(())
            }
            Err(e) => {
                revert(record, InstalledStatus::NotInstalled);
                Err(e)
            }
        }
    }

    async fn install_file(
        &self,
        record: &BundleRecord,
        file: &BundleFile,
        policy: Option<ConflictResolution>,
    ) -> ShelfResult<BundleRecord> {
        let extracted = self.extract(file).await?;
        let version = naming::version_marker(extracted.entry.declared_version(), &extracted.hash);

        let installed = self.installed()?;
        let mut name = extracted.name.clone();
        if let Some(existing) = find_conflict(&installed, &name, None) {
            match policy {
                None => {
                    return Err(ShelfError::NameConflict {
                        name,
                        existing: existing.path.clone(),
                    })
                }
                Some(ConflictResolution::Replace) => {
                    info!("Replacing {} ({})", existing.name, existing.path.display());
                    let mut existing = existing.clone();
                    self.uninstall(&mut existing).await?;
                }
                Some(ConflictResolution::KeepBoth) => {
                    name = naming::keep_both_name(&name, &version);
                    if let Some(existing) = find_conflict(&installed, &name, None) {
                        return Err(ShelfError::NameConflict {
                            name,
                            existing: existing.path.clone(),
                        });
                    }
                }
            }
        }

        let stem = naming::install_stem(&name, &extracted.hash);
        let placement = Placement {
            bundle: self.layout.bundles_dir.join(format!("{}.AppImage", stem)),
            icon: extracted
                .icon
                .as_ref()
                .map(|icon| self.layout.icon_path(&stem, icon)),
            manifest: self
                .layout
                .applications_dir
                .join(naming::manifest_file_name(&stem)),
            name,
            version,
        };
        if placement.bundle.exists() || placement.manifest.exists() {
            return Err(ShelfError::Installation(format!(
                "{} is already integrated at {}",
                placement.name,
                placement.bundle.display()
            )));
        }

        let placed = self
            .place(file.path(), &extracted, &placement, &record.settings)
            .await?;
        self.registry.register(&placement.manifest)?;
        placed.commit();

        Ok(installed_record(&extracted, placement, record))
    }

    /// Remove an integrated bundle: the bundle copy first, then its manifest
    pub async fn uninstall(&self, record: &mut BundleRecord) -> ShelfResult<()> {
        record.status.transition(InstalledStatus::Uninstalling)?;

        if let Err(e) = remove_if_exists(&record.path) {
            revert(record, InstalledStatus::Installed);
            return Err(ShelfError::Installation(format!(
                "Failed to remove {}: {}",
                record.path.display(),
                e
            )));
        }

        if let Some(manifest) = record.manifest.clone() {
            if let Err(e) = remove_if_exists(&manifest) {
                record.status.transition(InstalledStatus::Error)?;
                return Err(ShelfError::Installation(format!(
                    "Removed {} but not its manifest {}: {}",
                    record.path.display(),
                    manifest.display(),
                    e
                )));
            }
            if let Err(e) = self.registry.unregister(&manifest) {
                warn!("Failed to refresh the application menu: {}", e);
            }
        }

        if let Some(icon) = record.icon.take() {
            if icon.starts_with(&self.layout.icons_dir) {
                if let Err(e) = remove_if_exists(&icon) {
                    warn!("Failed to remove icon {}: {}", icon.display(), e);
                }
            }
        }

        record.manifest = None;
        record.status.transition(InstalledStatus::NotInstalled)?;
        info!("Removed {}", record.name);
        Ok(())
    }

    /// Ask `resolver` whether a newer bundle is available, moving the record
    /// between `Installed` and `UpdateAvailable`. Errors leave the status as
    /// it was.
    pub async fn check_update(
        &self,
        record: &mut BundleRecord,
        resolver: &dyn ReleaseResolver,
    ) -> ShelfResult<bool> {
        let installed = InstalledFile::from_path(&record.path)?;
        let available = resolver.has_update(&installed).await?;

        match (record.status, available) {
            (InstalledStatus::Installed, true) => {
                record.status.transition(InstalledStatus::UpdateAvailable)?
            }
            (InstalledStatus::UpdateAvailable, false) => {
                record.status.transition(InstalledStatus::Installed)?
            }
            _ => {}
        }
        Ok(available)
    }

    /// Download the newest bundle through `resolver` and replace the
    /// installed files in place. The resolver is disposed afterwards.
    pub async fn update(
        &self,
        record: &mut BundleRecord,
        resolver: &dyn ReleaseResolver,
        progress: Option<ProgressCallback>,
    ) -> ShelfResult<()> {
        record.status.transition(InstalledStatus::Updating)?;

        let result = self.replace_with_update(record, resolver, progress).await;
        resolver.dispose();

        match result {
            Ok(updated) => {
                *record = updated;
                record.status.transition(InstalledStatus::Installed)?;
                info!("Updated {} to {}", record.name, record.version.as_deref().unwrap_or("?"));
                Ok(())
            }
            Err(e) => {
                revert(record, InstalledStatus::Installed);
                Err(e)
            }
        }
    }

    async fn replace_with_update(
        &self,
        record: &BundleRecord,
        resolver: &dyn ReleaseResolver,
        progress: Option<ProgressCallback>,
    ) -> ShelfResult<BundleRecord> {
        let fetched = resolver.fetch(progress).await?;
        let file = BundleFile::open(&fetched.path)?;
        let extracted = self.extract(&file).await?;

        let declared = extracted
            .entry
            .declared_version()
            .or(fetched.version_tag.as_deref());
        let stem = file_stem(&record.path);
        let placement = Placement {
            bundle: record.path.clone(),
            icon: extracted
                .icon
                .as_ref()
                .map(|icon| self.layout.icon_path(&stem, icon)),
            manifest: record.manifest.clone().unwrap_or_else(|| {
                self.layout
                    .applications_dir
                    .join(naming::manifest_file_name(&stem))
            }),
            name: record.name.clone(),
            version: naming::version_marker(declared, &extracted.hash),
        };

        let placed = self
            .place(file.path(), &extracted, &placement, &record.settings)
            .await?;
        self.registry.register(&placement.manifest)?;
        placed.commit();

        if let Some(old_icon) = &record.icon {
            if Some(old_icon) != placement.icon.as_ref() && old_icon.starts_with(&self.layout.icons_dir)
            {
                if let Err(e) = remove_if_exists(old_icon) {
                    warn!("Failed to remove old icon {}: {}", old_icon.display(), e);
                }
            }
        }

        Ok(installed_record(&extracted, placement, record))
    }

    async fn place(
        &self,
        source: &Path,
        extracted: &Arc<ExtractedBundle>,
        placement: &Placement,
        settings: &BundleConfig,
    ) -> ShelfResult<InstallRollback> {
        let source = source.to_path_buf();
        let extracted = Arc::clone(extracted);
        let placement = placement.clone();
        let settings = settings.clone();
        run_blocking(move || place_files(&source, &extracted, &placement, &settings)).await
    }
}

fn installed_record(
    extracted: &ExtractedBundle,
    placement: Placement,
    previous: &BundleRecord,
) -> BundleRecord {
    BundleRecord {
        name: placement.name,
        description: extracted.entry.comment().map(str::to_string),
        path: placement.bundle,
        hash: Some(extracted.hash.clone()),
        version: Some(placement.version),
        status: previous.status,
        arch: extracted.arch.clone(),
        manifest: Some(placement.manifest),
        icon: placement.icon,
        settings: previous.settings.clone(),
    }
}

fn revert(record: &mut BundleRecord, to: InstalledStatus) {
    if let Err(e) = record.status.transition(to) {
        warn!("Could not revert {}: {}", record.name, e);
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".shelf-new");
    dest.with_file_name(name)
}

fn installation_error(action: &str, path: &Path, e: std::io::Error) -> ShelfError {
    ShelfError::Installation(format!("Failed to {} {}: {}", action, path.display(), e))
}

/// Manifest for an installed bundle: launch lines and icon point at the
/// managed copies, and the vendor keys describe the bundle
fn render_manifest(
    extracted: &ExtractedBundle,
    placement: &Placement,
    settings: &BundleConfig,
) -> DesktopEntry {
    let mut entry = extracted.entry.clone();
    entry.retarget_exec(
        &placement.bundle,
        &settings.env_pairs(),
        &settings.exec_arguments,
    );
    if let Some(icon) = &placement.icon {
        entry.set("Icon", icon.display().to_string());
    }
    if entry.name() != Some(placement.name.as_str()) {
        entry.set("Name", placement.name.clone());
    }
    if entry.declared_version().is_none() {
        entry.set(VERSION_KEY, placement.version.clone());
    }
    entry.set(BUNDLE_KEY, placement.bundle.display().to_string());
    entry.set(HASH_KEY, extracted.hash.clone());
    if let Some(arch) = &extracted.arch {
        entry.set(ARCH_KEY, arch.clone());
    }
    entry.set(INSTALLED_KEY, Utc::now().to_rfc3339());
    entry
}

/// Copy the bundle, icon and manifest next to their destinations, then move
/// them into place. Files already at a destination are set aside; dropping
/// the returned rollback without committing puts them back.
fn place_files(
    source: &Path,
    extracted: &ExtractedBundle,
    placement: &Placement,
    settings: &BundleConfig,
) -> ShelfResult<InstallRollback> {
    for path in [Some(&placement.bundle), placement.icon.as_ref(), Some(&placement.manifest)]
        .into_iter()
        .flatten()
    {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
    }

    let mut staged = InstallRollback::new();
    let mut moves = Vec::new();

    let bundle_tmp = staging_path(&placement.bundle);
    staged.track(&bundle_tmp);
    fs::copy(source, &bundle_tmp).map_err(|e| installation_error("copy", source, e))?;
    set_executable(&bundle_tmp)?;
    moves.push((bundle_tmp, placement.bundle.clone()));

    if let (Some(icon), Some(dest)) = (&extracted.icon, &placement.icon) {
        let icon_tmp = staging_path(dest);
        staged.track(&icon_tmp);
        fs::copy(icon, &icon_tmp).map_err(|e| installation_error("copy", icon, e))?;
        moves.push((icon_tmp, dest.clone()));
    }

    let manifest_tmp = staging_path(&placement.manifest);
    staged.track(&manifest_tmp);
    let manifest = render_manifest(extracted, placement, settings);
    fs::write(&manifest_tmp, manifest.to_string())
        .map_err(|e| installation_error("write", &placement.manifest, e))?;
    moves.push((manifest_tmp, placement.manifest.clone()));

    let mut placed = InstallRollback::new();
    for (tmp, dest) in moves {
        placed
            .set_aside(&dest)
            .map_err(|e| installation_error("back up", &dest, e))?;
        placed.track(&dest);
        fs::rename(&tmp, &dest).map_err(|e| installation_error("move", &dest, e))?;
        debug!("Placed {}", dest.display());
    }
    staged.commit();
    Ok(placed)
}
