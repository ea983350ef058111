//! Gitea-compatible release API shared by Codeberg and Forgejo sources.

use super::{AssetDescriptor, AssetLocator, ResolverContext};
use crate::core::{ShelfError, ShelfResult};
use crate::github::Release;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// Releases endpoints below one `/api/v1` base
#[derive(Debug, Clone)]
pub struct ForgeApi {
    api_base: String,
}

impl ForgeApi {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// API base of the forge serving `url`
    pub fn for_host(url: &Url) -> Self {
        let mut base = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
        if let Some(port) = url.port() {
            base.push_str(&format!(":{}", port));
        }
        Self::new(format!("{}/api/v1", base))
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub async fn latest_release(
        &self,
        ctx: &ResolverContext,
        owner: &str,
        repo: &str,
    ) -> ShelfResult<Option<Release>> {
        let url = format!("{}/repos/{}/{}/releases/latest", self.api_base, owner, repo);
        self.get_json(ctx, &url).await
    }

    pub async fn releases_page(
        &self,
        ctx: &ResolverContext,
        owner: &str,
        repo: &str,
        page: u32,
        limit: u32,
    ) -> ShelfResult<Vec<Release>> {
        let url = format!(
            "{}/repos/{}/{}/releases?page={}&limit={}",
            self.api_base, owner, repo, page, limit
        );
        Ok(self.get_json(ctx, &url).await?.unwrap_or_default())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &ResolverContext,
        url: &str,
    ) -> ShelfResult<Option<T>> {
        debug!("GET {}", url);
        let response = ctx
            .http
            .get(url)
            .timeout(ctx.metadata_timeout)
            .send()
            .await
            .map_err(|e| ShelfError::Network(format!("Release API request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ShelfError::Network(format!(
                "Release API error: HTTP {}",
                response.status()
            )));
        }

        response.json().await.map(Some).map_err(|e| {
            ShelfError::Network(format!("Failed to parse release API response: {}", e))
        })
    }
}

/// Best matching asset of `release`; forges report no digests, so change
/// detection falls back to the asset size
pub(crate) fn describe_release(
    release: &Release,
    ctx: &ResolverContext,
    matches: impl Fn(&str) -> bool,
) -> ShelfResult<Option<AssetDescriptor>> {
    let candidates = release.matching_assets(matches);
    let Some(asset) = ctx.arch.pick(&candidates, |a| a.name.as_str()).copied() else {
        return Ok(None);
    };

    let url = Url::parse(&asset.browser_download_url).map_err(|e| {
        ShelfError::Network(format!(
            "Invalid asset URL {}: {}",
            asset.browser_download_url, e
        ))
    })?;

    Ok(Some(AssetDescriptor {
        name: asset.name.clone(),
        locator: AssetLocator::Url(url),
        size: Some(asset.size).filter(|s| *s > 0),
        digest: None,
        delta_check: None,
        version_tag: Some(release.tag_name.clone()),
    }))
}
