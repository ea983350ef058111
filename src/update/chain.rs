//! An explicit update source backed by the bundle's embedded one.

use super::{no_asset, AssetDescriptor, FetchedAsset, InstalledFile, ReleaseResolver, ResolverKind};
use crate::core::ShelfResult;
use crate::download::ProgressCallback;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Tries `primary` first and falls back to `fallback` when the primary
/// source finds no asset or fails
pub struct ResolverChain {
    primary: Box<dyn ReleaseResolver>,
    fallback: Box<dyn ReleaseResolver>,
}

impl ResolverChain {
    pub fn new(primary: Box<dyn ReleaseResolver>, fallback: Box<dyn ReleaseResolver>) -> Self {
        Self { primary, fallback }
    }

    pub fn fallback(&self) -> &dyn ReleaseResolver {
        self.fallback.as_ref()
    }

    async fn select(&self) -> ShelfResult<Option<(&dyn ReleaseResolver, AssetDescriptor)>> {
        let primary_error = match self.primary.resolve_asset().await {
            Ok(Some(asset)) => return Ok(Some((self.primary.as_ref(), asset))),
            Ok(None) => {
                debug!("{} found nothing, trying {}", self.primary.source(), self.fallback.source());
                None
            }
            Err(e) => {
                warn!("{} failed ({}), trying {}", self.primary.source(), e, self.fallback.source());
                Some(e)
            }
        };

        match self.fallback.resolve_asset().await {
            Ok(Some(asset)) => Ok(Some((self.fallback.as_ref(), asset))),
            Ok(None) => match primary_error {
                Some(e) => Err(e),
                None => Ok(None),
            },
            Err(e) => Err(primary_error.unwrap_or(e)),
        }
    }
}

#[async_trait]
impl ReleaseResolver for ResolverChain {
    fn kind(&self) -> ResolverKind {
        self.primary.kind()
    }

    fn source(&self) -> &str {
        self.primary.source()
    }

    async fn resolve_asset(&self) -> ShelfResult<Option<AssetDescriptor>> {
        Ok(self.select().await?.map(|(_, asset)| asset))
    }

    async fn has_update(&self, installed: &InstalledFile) -> ShelfResult<bool> {
        match self.select().await? {
            Some((resolver, _)) => resolver.has_update(installed).await,
            None => Ok(false),
        }
    }

    async fn fetch(&self, progress: Option<ProgressCallback>) -> ShelfResult<FetchedAsset> {
        match self.select().await? {
            Some((resolver, _)) => resolver.fetch(progress).await,
            None => Err(no_asset(self.primary.source())),
        }
    }

    fn cancel(&self) {
        self.primary.cancel();
        self.fallback.cancel();
    }

    fn dispose(&self) {
        self.primary.dispose();
        self.fallback.dispose();
    }
}
