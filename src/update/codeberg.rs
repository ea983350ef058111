//! Codeberg releases (`https://codeberg.org/<owner>/<repo>/releases/download/<tag>/<file>`).
//!
//! Only the latest release is considered. The asset is found with a glob
//! derived from the file name by replacing the tag's version with `*`.

use super::forge::{describe_release, ForgeApi};
use super::pattern::{derive_pattern, glob_matcher};
use super::{
    asset_differs, fetch_http, http_url, no_asset, AssetDescriptor, FetchedAsset, InstalledFile,
    ReleaseDownloadUrl, ReleaseResolver, ResolverContext, ResolverKind,
};
use crate::core::{ShelfError, ShelfResult};
use crate::download::{ProgressCallback, SessionSlot};
use async_trait::async_trait;
use globset::GlobMatcher;

pub const CODEBERG_HOST: &str = "codeberg.org";

pub fn recognizes(source: &str) -> bool {
    http_url(source)
        .filter(|url| url.host_str() == Some(CODEBERG_HOST))
        .and_then(|url| ReleaseDownloadUrl::parse(&url))
        .is_some()
}

pub struct CodebergResolver {
    source: String,
    owner: String,
    repo: String,
    matcher: GlobMatcher,
    api: ForgeApi,
    ctx: ResolverContext,
    sessions: SessionSlot,
}

impl CodebergResolver {
    pub fn new(source: &str, ctx: ResolverContext) -> ShelfResult<Self> {
        let release = http_url(source)
            .and_then(|url| ReleaseDownloadUrl::parse(&url))
            .ok_or_else(|| {
                ShelfError::InvalidArgument(format!("Not a Codeberg release URL: {}", source))
            })?;

        Ok(Self {
            source: source.to_string(),
            matcher: glob_matcher(&derive_pattern(&release.file, &release.tag))?,
            owner: release.owner,
            repo: release.repo,
            api: ForgeApi::new(ctx.codeberg_api_url.clone()),
            ctx,
            sessions: SessionSlot::default(),
        })
    }
}

#[async_trait]
impl ReleaseResolver for CodebergResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Codeberg
    }

    fn source(&self) -> &str {
        &self.source
    }

    async fn resolve_asset(&self) -> ShelfResult<Option<AssetDescriptor>> {
        match self
            .api
            .latest_release(&self.ctx, &self.owner, &self.repo)
            .await?
        {
            Some(release) => describe_release(&release, &self.ctx, |name| self.matcher.is_match(name)),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::tests::test_context;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_latest_release_size_comparison() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repos/acme/tool/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag_name": "v1.3.0",
                "assets": [
                    {
                        "name": "tool-1.3.0-aarch64.AppImage",
                        "browser_download_url": "https://codeberg.org/acme/tool/releases/download/v1.3.0/tool-1.3.0-aarch64.AppImage",
                        "size": 900
                    },
                    {
                        "name": "tool-1.3.0-x86_64.AppImage",
                        "browser_download_url": "https://codeberg.org/acme/tool/releases/download/v1.3.0/tool-1.3.0-x86_64.AppImage",
                        "size": 1200
                    }
                ]
            })))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let resolver = CodebergResolver::new(
            "https://codeberg.org/acme/tool/releases/download/v1.2.0/tool-1.2.0-x86_64.AppImage",
            test_context(&mock_server.uri(), temp.path()),
        )
        .unwrap();

        let asset = resolver.resolve_asset().await.unwrap().unwrap();
        assert_eq!(asset.name, "tool-1.3.0-x86_64.AppImage");
        assert!(asset.digest.is_none());

        let file = temp.path().join("tool.AppImage");
        fs::write(&file, vec![0u8; 1000]).unwrap();
        assert!(resolver
            .has_update(&InstalledFile::from_path(&file).unwrap())
            .await
            .unwrap());

        fs::write(&file, vec![0u8; 1200]).unwrap();
        assert!(!resolver
            .has_update(&InstalledFile::from_path(&file).unwrap())
            .await
            .unwrap());
    }

    #[test]
    fn test_rejects_other_hosts() {
        assert!(!recognizes(
            "https://github.com/acme/tool/releases/download/v1/tool.AppImage"
        ));
        assert!(!recognizes("https://codeberg.org/acme/tool"));
    }
}
