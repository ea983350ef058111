//! GitHub releases.
//!
//! Two source forms are understood:
//! - `gh-releases-zsync|<owner>|<repo>|<channel>|<pattern>`, as embedded in bundles
//! - `https://github.com/<owner>/<repo>/releases/download/<tag>/<file>`
//!
//! Channel `latest` looks at the latest published release only; any other
//! channel walks every release (pre-releases included) until a non-draft
//! release has a matching asset.

use super::pattern::{derive_pattern, glob_matcher};
use super::zsync;
use super::{
    asset_differs, fetch_http, http_url, no_asset, AssetDescriptor, AssetLocator, FetchedAsset,
    InstalledFile, ReleaseDownloadUrl, ReleaseResolver, ResolverContext, ResolverKind,
};
use crate::checksum::{sha1_hex, ContentDigest};
use crate::config::UpdateManagerConfig;
use crate::core::{ShelfError, ShelfResult};
use crate::download::{run_blocking, ProgressCallback, SessionSlot};
use crate::github::{Release, ReleaseAsset};
use async_trait::async_trait;
use globset::GlobMatcher;
use tracing::debug;
use url::Url;

const COMPACT_PREFIX: &str = "gh-releases-zsync|";
const DELTA_CHECK_SUFFIX: &str = ".zsync";
const PAGE_SIZE: u32 = 100;

pub fn recognizes(source: &str) -> bool {
    if source.starts_with(COMPACT_PREFIX) {
        return parse_compact(source).is_some();
    }
    http_url(source)
        .filter(|url| url.host_str() == Some("github.com"))
        .and_then(|url| ReleaseDownloadUrl::parse(&url))
        .is_some()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GitHubSource {
    owner: String,
    repo: String,
    channel: String,
    pattern: String,
}

fn parse_compact(source: &str) -> Option<GitHubSource> {
    let parts: Vec<&str> = source.split('|').collect();
    match parts.as_slice() {
        ["gh-releases-zsync", owner, repo, channel, pattern]
            if [owner, repo, channel, pattern].iter().all(|p| !p.is_empty()) =>
        {
            Some(GitHubSource {
                owner: owner.to_string(),
                repo: repo.to_string(),
                channel: channel.to_string(),
                pattern: pattern.to_string(),
            })
        }
        _ => None,
    }
}

fn parse_source(source: &str, options: &UpdateManagerConfig) -> Option<GitHubSource> {
    if source.starts_with(COMPACT_PREFIX) {
        return parse_compact(source);
    }
    let url = http_url(source)?;
    let release = ReleaseDownloadUrl::parse(&url)?;
    let channel = if options.allow_prereleases {
        "latest-pre"
    } else {
        "latest"
    };
    Some(GitHubSource {
        pattern: derive_pattern(&release.file, &release.tag),
        owner: release.owner,
        repo: release.repo,
        channel: channel.to_string(),
    })
}

pub struct GitHubResolver {
    source: String,
    target: GitHubSource,
    matcher: GlobMatcher,
    ctx: ResolverContext,
    sessions: SessionSlot,
}

impl GitHubResolver {
    pub fn new(
        source: &str,
        ctx: ResolverContext,
        options: &UpdateManagerConfig,
    ) -> ShelfResult<Self> {
        let target = parse_source(source, options).ok_or_else(|| {
            ShelfError::InvalidArgument(format!("Not a GitHub release source: {}", source))
        })?;
        let matcher = glob_matcher(&target.pattern)?;
        Ok(Self {
            source: source.to_string(),
            target,
            matcher,
            ctx,
            sessions: SessionSlot::default(),
        })
    }

    fn has_match(&self, release: &Release) -> bool {
        release.assets.iter().any(|a| self.matcher.is_match(&a.name))
    }

    async fn find_release(&self) -> ShelfResult<Option<Release>> {
        let GitHubSource { owner, repo, .. } = &self.target;

        if self.target.channel == "latest" {
            let release = self.ctx.github.get_latest_release(owner, repo).await?;
            return Ok(release.filter(|r| self.has_match(r)));
        }

        let mut page = 1;
        loop {
            let releases = self
                .ctx
                .github
                .get_releases_page(owner, repo, page, PAGE_SIZE)
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

    fn describe(&self, release: &Release) -> ShelfResult<Option<AssetDescriptor>> {
        let matches = release.matching_assets(|name| self.matcher.is_match(name));
        let Some(picked) = self.ctx.arch.pick(&matches, |a| a.name.as_str()).copied() else {
            return Ok(None);
        };

        let (asset, delta_check) = match picked.name.strip_suffix(DELTA_CHECK_SUFFIX) {
            Some(target_name) => match release.asset_named(target_name) {
                Some(target) => (target, Some(parse_url(&picked.browser_download_url)?)),
                None => {
                    debug!(
                        "{} has no asset {} next to {}",
                        release.tag_name, target_name, picked.name
                    );
                    return Ok(None);
                }
            },
            None => (picked, None),
        };

        Ok(Some(descriptor(release, asset, delta_check)?))
    }
}

fn parse_url(url: &str) -> ShelfResult<Url> {
    Url::parse(url).map_err(|e| ShelfError::Network(format!("Invalid asset URL {}: {}", url, e)))
}

fn descriptor(
    release: &Release,
    asset: &ReleaseAsset,
    delta_check: Option<Url>,
) -> ShelfResult<AssetDescriptor> {
    Ok(AssetDescriptor {
        name: asset.name.clone(),
        locator: AssetLocator::Url(parse_url(&asset.browser_download_url)?),
        size: Some(asset.size).filter(|s| *s > 0),
        digest: asset
            .digest
            .as_deref()
            .and_then(ContentDigest::parse_prefixed),
        delta_check,
        version_tag: Some(release.tag_name.clone()),
    })
}

#[async_trait]
impl ReleaseResolver for GitHubResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Github
    }

    fn source(&self) -> &str {
        &self.source
    }

    async fn resolve_asset(&self) -> ShelfResult<Option<AssetDescriptor>> {
        match self.find_release().await? {
            Some(release) => self.describe(&release),
            None => {
                debug!("No release of {}/{} matches {}", self.target.owner, self.target.repo, self.target.pattern);
                Ok(None)
            }
        }
    }

    async fn has_update(&self, installed: &InstalledFile) -> ShelfResult<bool> {
        let Some(asset) = self.resolve_asset().await? else {
            return Ok(false);
        };

        if let Some(control) = &asset.delta_check {
            let header =
                zsync::fetch_header(&self.ctx.http, control, self.ctx.metadata_timeout).await?;
            if let Some(remote) = header.sha1 {
                let path = installed.path.clone();
                let local = run_blocking(move || sha1_hex(&path)).await?;
                return Ok(local != remote);
            }
            if let Some(length) = header.length.filter(|l| *l > 0) {
                return Ok(length != installed.size);
            }
        }

        asset_differs(&asset, installed)
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
