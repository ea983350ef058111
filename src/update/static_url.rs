//! Plain HTTP(S) download URLs.

use super::{
    asset_differs, content_length, fetch_http, http_url, no_asset, url_file_name, AssetDescriptor,
    AssetLocator, FetchedAsset, InstalledFile, ReleaseResolver, ResolverContext, ResolverKind,
};
use crate::core::{ShelfError, ShelfResult};
use crate::download::{ProgressCallback, SessionSlot};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap};
use tracing::debug;
use url::Url;

/// Content types a bundle download may be served with
const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/x-iso9660-appimage",
    "application/vnd.appimage",
    "application/octet-stream",
    "binary/octet-stream",
];

/// Any http(s) URL that no hosting-specific variant claims
pub fn recognizes(source: &str) -> bool {
    http_url(source).is_some()
        && !super::github::recognizes(source)
        && !super::gitlab::recognizes(source)
        && !super::codeberg::recognizes(source)
        && !super::forgejo::recognizes(source)
}

pub struct StaticUrlResolver {
    source: String,
    url: Url,
    ctx: ResolverContext,
    sessions: SessionSlot,
}

impl StaticUrlResolver {
    pub fn new(source: &str, ctx: ResolverContext) -> ShelfResult<Self> {
        let url = http_url(source)
            .ok_or_else(|| ShelfError::InvalidArgument(format!("Not an HTTP URL: {}", source)))?;
        Ok(Self {
            source: source.to_string(),
            url,
            ctx,
            sessions: SessionSlot::default(),
        })
    }

    /// Response headers for the URL: HEAD first, then a streamed GET whose
    /// body is dropped as soon as the headers arrived
    async fn probe(&self) -> ShelfResult<HeaderMap> {
        let head = self
            .ctx
            .http
            .head(self.url.clone())
            .timeout(self.ctx.metadata_timeout)
            .send()
            .await;

        match head {
            Ok(response) if response.status().is_success() => return Ok(response.headers().clone()),
            Ok(response) => debug!("HEAD {} returned {}, retrying with GET", self.url, response.status()),
            Err(e) => debug!("HEAD {} failed ({}), retrying with GET", self.url, e),
        }

        let response = self
            .ctx
            .http
            .get(self.url.clone())
            .timeout(self.ctx.metadata_timeout)
            .send()
            .await
            .map_err(|e| ShelfError::Network(format!("Failed to reach {}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(ShelfError::Network(format!(
                "Failed to reach {}: HTTP {}",
                self.url,
                response.status()
            )));
        }

        let headers = response.headers().clone();
        drop(response);
        Ok(headers)
    }
}

fn allowed_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .is_some_and(|mime| ALLOWED_CONTENT_TYPES.contains(&mime.as_str()))
}

#[async_trait]
impl ReleaseResolver for StaticUrlResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::StaticFile
    }

    fn source(&self) -> &str {
        &self.source
    }

    async fn resolve_asset(&self) -> ShelfResult<Option<AssetDescriptor>> {
        let headers = self.probe().await?;
        if !allowed_content_type(&headers) {
            debug!(
                "{} is served as {:?}, not a bundle",
                self.url,
                headers.get(header::CONTENT_TYPE)
            );
            return Ok(None);
        }

        Ok(Some(AssetDescriptor {
            name: url_file_name(&self.url).unwrap_or_else(|| "download.AppImage".to_string()),
            locator: AssetLocator::Url(self.url.clone()),
            size: content_length(&headers),
            digest: None,
            delta_check: None,
            version_tag: None,
        }))
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
    use std::fs;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn installed(temp: &TempDir, size: usize) -> InstalledFile {
        let file = temp.path().join("installed.AppImage");
        fs::write(&file, vec![0u8; size]).unwrap();
        InstalledFile::from_path(&file).unwrap()
    }

    async fn serve(server: &MockServer, http_method: &str, size: usize, content_type: &str) {
        Mock::given(method(http_method))
            .and(path("/app.AppImage"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; size], content_type))
            .mount(server)
            .await;
    }

    fn resolver(server: &MockServer, temp: &TempDir) -> StaticUrlResolver {
        StaticUrlResolver::new(
            &format!("{}/app.AppImage", server.uri()),
            test_context(&server.uri(), temp.path()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_same_length_is_no_update() {
        let mock_server = MockServer::start().await;
        serve(&mock_server, "HEAD", 1000, "application/octet-stream").await;
        let temp = TempDir::new().unwrap();

        let resolver = resolver(&mock_server, &temp);
        assert!(!resolver.has_update(&installed(&temp, 1000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_different_length_is_update() {
        let mock_server = MockServer::start().await;
        serve(&mock_server, "HEAD", 1200, "application/vnd.appimage").await;
        let temp = TempDir::new().unwrap();

        let resolver = resolver(&mock_server, &temp);
        assert!(resolver.has_update(&installed(&temp, 1000)).await.unwrap());
        let asset = resolver.resolve_asset().await.unwrap().unwrap();
        assert_eq!(asset.size, Some(1200));
        assert_eq!(asset.name, "app.AppImage");
    }

    #[tokio::test]
    async fn test_head_failure_falls_back_to_get() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/app.AppImage"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&mock_server)
            .await;
        serve(&mock_server, "GET", 1200, "application/octet-stream").await;
        let temp = TempDir::new().unwrap();

        let resolver = resolver(&mock_server, &temp);
        assert!(resolver.has_update(&installed(&temp, 1000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_disallowed_content_type_is_not_handled() {
        let mock_server = MockServer::start().await;
        serve(&mock_server, "HEAD", 1200, "text/html; charset=utf-8").await;
        let temp = TempDir::new().unwrap();

        let resolver = resolver(&mock_server, &temp);
        assert!(resolver.resolve_asset().await.unwrap().is_none());
        assert!(!resolver.has_update(&installed(&temp, 1000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_length_is_no_update() {
        let mock_server = MockServer::start().await;
        serve(&mock_server, "HEAD", 0, "application/octet-stream").await;
        let temp = TempDir::new().unwrap();

        let resolver = resolver(&mock_server, &temp);
        assert!(!resolver.has_update(&installed(&temp, 1000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_is_error_not_false() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;
        let temp = TempDir::new().unwrap();

        let resolver = resolver(&mock_server, &temp);
        assert!(resolver.has_update(&installed(&temp, 1000)).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_and_dispose() {
        let mock_server = MockServer::start().await;
        serve(&mock_server, "HEAD", 2048, "application/octet-stream").await;
        serve(&mock_server, "GET", 2048, "application/octet-stream").await;
        let temp = TempDir::new().unwrap();

        let resolver = resolver(&mock_server, &temp);
        let fetched = resolver.fetch(None).await.unwrap();
        assert_eq!(fs::read(&fetched.path).unwrap().len(), 2048);
        assert_eq!(fetched.hash, blake3::hash(&[0u8; 2048]).to_hex().to_string());

        resolver.dispose();
        assert!(!fetched.path.exists());
    }
}
