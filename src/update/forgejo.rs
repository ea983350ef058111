//! Self-hosted Forgejo/Gitea releases
//! (`https://<host>/<owner>/<repo>/releases/download/<tag>/<file>`).
//!
//! The asset name is matched with an alphanumeric-run glob (see
//! [`super::pattern::alnum_glob_regex`]). With `allow_prereleases` every
//! release is walked, otherwise only `/releases/latest` is queried.

use super::forge::{describe_release, ForgeApi};
use super::pattern::{alnum_glob_regex, derive_alnum_pattern};
use super::{
    asset_differs, fetch_http, http_url, no_asset, AssetDescriptor, FetchedAsset, InstalledFile,
    ReleaseDownloadUrl, ReleaseResolver, ResolverContext, ResolverKind,
};
use crate::config::UpdateManagerConfig;
use crate::core::{ShelfError, ShelfResult};
use crate::download::{ProgressCallback, SessionSlot};
use crate::github::Release;
use async_trait::async_trait;
use regex::Regex;

const PAGE_LIMIT: u32 = 50;

/// Hosts served by their own variants
fn reserved_host(host: &str) -> bool {
    host == "github.com" || host == super::codeberg::CODEBERG_HOST || host.contains("gitlab")
}

pub fn recognizes(source: &str) -> bool {
    http_url(source)
        .filter(|url| !reserved_host(url.host_str().unwrap_or_default()))
        .and_then(|url| ReleaseDownloadUrl::parse(&url))
        .is_some()
}

pub struct ForgejoResolver {
    source: String,
    owner: String,
    repo: String,
    pattern: Regex,
    allow_prereleases: bool,
    api: ForgeApi,
    ctx: ResolverContext,
    sessions: SessionSlot,
}

impl ForgejoResolver {
    pub fn new(
        source: &str,
        ctx: ResolverContext,
        options: &UpdateManagerConfig,
    ) -> ShelfResult<Self> {
        let invalid =
            || ShelfError::InvalidArgument(format!("Not a Forgejo release URL: {}", source));
        let url = http_url(source).ok_or_else(invalid)?;
        let release = ReleaseDownloadUrl::parse(&url).ok_or_else(invalid)?;

        Ok(Self {
            source: source.to_string(),
            pattern: alnum_glob_regex(&derive_alnum_pattern(&release.file, &release.tag))?,
            owner: release.owner,
            repo: release.repo,
            allow_prereleases: options.allow_prereleases,
            api: ForgeApi::for_host(&url),
            ctx,
            sessions: SessionSlot::default(),
        })
    }

    fn has_match(&self, release: &Release) -> bool {
        release.assets.iter().any(|a| self.pattern.is_match(&a.name))
    }

    async fn find_release(&self) -> ShelfResult<Option<Release>> {
        if !self.allow_prereleases {
            return self
                .api
                .latest_release(&self.ctx, &self.owner, &self.repo)
                .await;
        }

        let mut page = 1;
        loop {
            let releases = self
                .api
                .releases_page(&self.ctx, &self.owner, &self.repo, page, PAGE_LIMIT)
                .await?;
            if releases.is_empty() {
                return Ok(None);
            }
            if let Some(release) = releases
                .into_iter()
                .find(|r| !r.draft && self.has_match(r))
            {
                return Ok(Some(release));
            }
            page += 1;
        }
    }
}

#[async_trait]
impl ReleaseResolver for ForgejoResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Forgejo
    }

    fn source(&self) -> &str {
        &self.source
    }

    async fn resolve_asset(&self) -> ShelfResult<Option<AssetDescriptor>> {
        match self.find_release().await? {
            Some(release) => describe_release(&release, &self.ctx, |name| self.pattern.is_match(name)),
            None => Ok(None),
        }
    }

    async fn has_update(&self, installed: &InstalledFile) -> ShelfResult<bool> {
        match self.resolve_asset().await? {
            Some(asset) => asset_differs(&asset, installed),
            None => Ok(false),
        }
    }

    async fn fetch(&self, progress: Option<ProgressCallback>) -> ShelfResult<FetchedAsset> {
        let asset = self
            .resolve_asset()
            .await?
            .ok_or_else(|| no_asset(&self.source))?;
        fetch_http(&self.ctx, &self.sessions, &asset, progress).await
    }

    fn cancel(&self) {
        self.sessions.cancel();
    }

    fn dispose(&self) {
        self.sessions.dispose();
    }
}
