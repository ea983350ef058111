//! Choosing the resolver for a bundle's update source.

use super::{ReleaseResolver, ResolverChain, ResolverContext, ResolverKind};
use crate::bundle::BundleFile;
use crate::config::{BundleConfig, UpdateManagerConfig};
use crate::core::ShelfResult;
use tracing::debug;

/// Inputs for one dispatch
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    /// Source configured by the user
    pub explicit: Option<&'a str>,
    /// Variant the user pinned; restricts the candidates
    pub pinned: Option<ResolverKind>,
    /// Decoded source embedded in the bundle
    pub embedded: Option<&'a str>,
    pub options: &'a UpdateManagerConfig,
}

pub struct UpdateResolutionDispatcher {
    ctx: ResolverContext,
}

impl UpdateResolutionDispatcher {
    pub fn new(ctx: ResolverContext) -> Self {
        Self { ctx }
    }

    /// The variant that recognizes `source`, if any
    pub fn recognize(source: &str, pinned: Option<ResolverKind>) -> Option<ResolverKind> {
        let source = source.trim();
        if source.is_empty() {
            return None;
        }
        ResolverKind::ALL
            .into_iter()
            .filter(|kind| pinned.map_or(true, |pinned| pinned == *kind))
            .find(|kind| kind.recognizes(source))
    }

    /// Build the resolver for a request. `None` means the bundle has no
    /// checkable update source, which is not an error.
    pub fn dispatch(
        &self,
        request: &DispatchRequest<'_>,
    ) -> ShelfResult<Option<Box<dyn ReleaseResolver>>> {
        let explicit = request
            .explicit
            .map(str::trim)
            .and_then(|s| Self::recognize(s, request.pinned).map(|kind| (kind, s)));
        let embedded = request
            .embedded
            .map(str::trim)
            .and_then(|s| Self::recognize(s, request.pinned).map(|kind| (kind, s)));

        let resolver = match (explicit, embedded) {
            (Some((kind, source)), Some((fallback_kind, fallback_source))) if source != fallback_source => {
                debug!("Using {} ({}) with embedded fallback {} ({})", source, kind, fallback_source, fallback_kind);
                let primary = kind.build(source, &self.ctx, request.options)?;
                let fallback = fallback_kind.build(fallback_source, &self.ctx, request.options)?;
                Box::new(ResolverChain::new(primary, fallback)) as Box<dyn ReleaseResolver>
            }
            (Some((kind, source)), _) | (None, Some((kind, source))) => {
                debug!("Using {} ({})", source, kind);
                kind.build(source, &self.ctx, request.options)?
            }
            (None, None) => return Ok(None),
        };
        Ok(Some(resolver))
    }

    /// Resolver for a bundle from its stored settings and, when given, the
    /// update source embedded in the bundle file
    pub fn for_bundle(
        &self,
        settings: &BundleConfig,
        bundle: Option<&BundleFile>,
    ) -> ShelfResult<Option<Box<dyn ReleaseResolver>>> {
        let embedded = match bundle.map(|b| b.embedded_update_source()) {
            Some(Ok(source)) => source,
            Some(Err(e)) => {
                debug!("Could not read embedded update source: {}", e);
                None
            }
            None => None,
        };

        self.dispatch(&DispatchRequest {
            explicit: settings.update_url.as_deref(),
            pinned: settings.update_url_manager,
            embedded: embedded.as_deref(),
            options: &settings.update_manager_config,
        })
    }
}
