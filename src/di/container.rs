//! Service container for dependency injection

use super::traits::{DesktopRegistry, Mounter};
use crate::bundle::{BundleExtractor, SelfMounter};
use crate::config::{BundleConfigStore, Config};
use crate::core::ShelfResult;
use crate::install::{DesktopDatabase, InstallLayout, InstallationPipeline};
use crate::update::{ResolverContext, UpdateResolutionDispatcher};
use std::sync::Arc;

/// Service container for dependency injection
///
/// Holds the global config and the two system-facing collaborators, and
/// builds the extractor, pipeline and dispatcher from them. Collaborators
/// are `Arc<dyn Trait>` so tests can swap in the doubles from
/// [`crate::di::mocks`].
///
/// # Example (Production)
///
/// ```no_run
/// use shelf::di::ServiceContainer;
///
/// # fn example() -> shelf::core::ShelfResult<()> {
/// let container = ServiceContainer::new()?;
/// let installed = container.pipeline()?.installed()?;
/// println!("{} bundles integrated", installed.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ServiceContainer {
    pub config: Arc<Config>,
    pub mounter: Arc<dyn Mounter>,
    pub registry: Arc<dyn DesktopRegistry>,
}

impl ServiceContainer {
    /// Create a new service container with production implementations
    ///
    /// - Loads config from disk (creating the default file when missing)
    /// - Mounts bundles through their own runtime
    /// - Refreshes the menu with `update-desktop-database` when installed
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or created.
    pub fn new() -> ShelfResult<Self> {
        let config = Config::load()?;
        Ok(Self::with_providers(
            config,
            Arc::new(SelfMounter::new()),
            Arc::new(DesktopDatabase::new()),
        ))
    }

    /// Create a service container with custom collaborators
    pub fn with_providers(
        config: Config,
        mounter: Arc<dyn Mounter>,
        registry: Arc<dyn DesktopRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            mounter,
            registry,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn extractor(&self) -> ShelfResult<BundleExtractor> {
        Ok(BundleExtractor::new(
            Arc::clone(&self.mounter),
            self.config.get_scratch_dir()?,
        ))
    }

    pub fn pipeline(&self) -> ShelfResult<InstallationPipeline> {
        Ok(InstallationPipeline::new(
            InstallLayout::from_config(&self.config)?,
            self.extractor()?,
            Arc::clone(&self.registry),
        ))
    }

    pub fn resolver_context(&self) -> ShelfResult<ResolverContext> {
        ResolverContext::new(&self.config)
    }

    pub fn dispatcher(&self) -> ShelfResult<UpdateResolutionDispatcher> {
        Ok(UpdateResolutionDispatcher::new(self.resolver_context()?))
    }

    /// Per-bundle settings from the platform config directory
    pub fn bundle_configs(&self) -> ShelfResult<BundleConfigStore> {
        BundleConfigStore::load()
    }
}
