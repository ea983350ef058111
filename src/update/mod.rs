//! Update-source resolution.
//!
//! Every hosting protocol is one [`ResolverKind`] variant with one
//! [`ReleaseResolver`] implementation. The dispatcher only ever asks the
//! variants whether they recognize a source string, so adding a protocol
//! means adding a variant here and its module.

pub mod arch;
pub mod chain;
pub mod codeberg;
pub mod dispatcher;
pub mod forge;
pub mod forgejo;
pub mod ftp;
pub mod github;
pub mod gitlab;
pub mod pattern;
pub mod static_url;
pub mod zsync;

pub use arch::ArchPreference;
pub use chain::ResolverChain;
pub use dispatcher::{DispatchRequest, UpdateResolutionDispatcher};

use crate::checksum::{content_hash, ContentDigest};
use crate::config::{Config, UpdateManagerConfig};
use crate::core::{ShelfError, ShelfResult};
use crate::download::{run_blocking, ProgressCallback, SessionSlot};
use crate::github::GitHubClient;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Where an asset can be retrieved from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLocator {
    Url(Url),
    Ftp { host: String, port: u16, path: String },
}

impl fmt::Display for AssetLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetLocator::Url(url) => write!(f, "{}", url),
            AssetLocator::Ftp { host, port, path } => write!(f, "ftp://{}:{}{}", host, port, path),
        }
    }
}

/// The best matching remote asset for a source
#[derive(Debug, Clone, PartialEq)]
pub struct AssetDescriptor {
    pub name: String,
    pub locator: AssetLocator,
    pub size: Option<u64>,
    pub digest: Option<ContentDigest>,
    /// zsync control file describing the asset
    pub delta_check: Option<Url>,
    /// Release tag or version the asset belongs to
    pub version_tag: Option<String>,
}

/// A downloaded asset, valid until its resolver is disposed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAsset {
    pub path: PathBuf,
    pub version_tag: Option<String>,
    pub hash: String,
}

/// The installed bundle an update check compares against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledFile {
    pub path: PathBuf,
    pub size: u64,
}

impl InstalledFile {
    pub fn from_path(path: &Path) -> ShelfResult<Self> {
        let size = fs::metadata(path)
            .map_err(|e| ShelfError::Path(format!("Cannot read {}: {}", path.display(), e)))?
            .len();
        Ok(Self {
            path: path.to_path_buf(),
            size,
        })
    }
}

/// Protocol-specific update source
#[async_trait]
pub trait ReleaseResolver: Send + Sync {
    fn kind(&self) -> ResolverKind;

    /// The source string this resolver was built from
    fn source(&self) -> &str;

    /// Look up the best matching asset; `None` when nothing matches
    async fn resolve_asset(&self) -> ShelfResult<Option<AssetDescriptor>>;

    /// Whether the remote asset differs from `installed`. Never `true` when
    /// the remote size or hash cannot be obtained.
    async fn has_update(&self, installed: &InstalledFile) -> ShelfResult<bool>;

    /// Download the resolved asset
    async fn fetch(&self, progress: Option<ProgressCallback>) -> ShelfResult<FetchedAsset>;

    /// Abort a running fetch (best effort)
    fn cancel(&self);

    /// Release temporary files, including the fetched asset
    fn dispose(&self);
}

/// The closed set of resolver variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverKind {
    StaticFile,
    Github,
    Gitlab,
    Codeberg,
    Forgejo,
    Ftp,
}

impl ResolverKind {
    pub const ALL: [ResolverKind; 6] = [
        ResolverKind::StaticFile,
        ResolverKind::Github,
        ResolverKind::Gitlab,
        ResolverKind::Codeberg,
        ResolverKind::Forgejo,
        ResolverKind::Ftp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ResolverKind::StaticFile => "static_file",
            ResolverKind::Github => "github",
            ResolverKind::Gitlab => "gitlab",
            ResolverKind::Codeberg => "codeberg",
            ResolverKind::Forgejo => "forgejo",
            ResolverKind::Ftp => "ftp",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Pure shape test of a source string; no network I/O
    pub fn recognizes(self, source: &str) -> bool {
        let source = source.trim();
        match self {
            ResolverKind::StaticFile => static_url::recognizes(source),
            ResolverKind::Github => github::recognizes(source),
            ResolverKind::Gitlab => gitlab::recognizes(source),
            ResolverKind::Codeberg => codeberg::recognizes(source),
            ResolverKind::Forgejo => forgejo::recognizes(source),
            ResolverKind::Ftp => ftp::recognizes(source),
        }
    }

    /// Construct the resolver for `source`
    pub fn build(
        self,
        source: &str,
        ctx: &ResolverContext,
        options: &UpdateManagerConfig,
    ) -> ShelfResult<Box<dyn ReleaseResolver>> {
        let source = source.trim();
        let ctx = ctx.clone();
        Ok(match self {
            ResolverKind::StaticFile => Box::new(static_url::StaticUrlResolver::new(source, ctx)?),
            ResolverKind::Github => Box::new(github::GitHubResolver::new(source, ctx, options)?),
            ResolverKind::Gitlab => Box::new(gitlab::GitLabResolver::new(source, ctx)?),
            ResolverKind::Codeberg => Box::new(codeberg::CodebergResolver::new(source, ctx)?),
            ResolverKind::Forgejo => Box::new(forgejo::ForgejoResolver::new(source, ctx, options)?),
            ResolverKind::Ftp => Box::new(ftp::FtpResolver::new(source, ctx)?),
        })
    }
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared collaborators injected into every resolver
#[derive(Clone)]
pub struct ResolverContext {
    pub http: Client,
    pub github: Arc<GitHubClient>,
    pub arch: ArchPreference,
    pub scratch_dir: PathBuf,
    pub codeberg_api_url: String,
    /// Timeout for metadata requests; transfers are bounded by cancellation only
    pub metadata_timeout: Duration,
}

impl ResolverContext {
    pub fn new(config: &Config) -> ShelfResult<Self> {
        let metadata_timeout = Duration::from_secs(config.http_timeout_secs.max(1));
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static("shelf-bundle-manager"),
        );
        let http = Client::builder()
            .default_headers(headers)
            .connect_timeout(metadata_timeout)
            .build()
            .map_err(|e| ShelfError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let arch = match config.architecture.as_deref() {
            Some(host) => ArchPreference::new(host)?,
            None => ArchPreference::detect()?,
        };

        Ok(Self {
            http,
            github: Arc::new(GitHubClient::new(
                &config.github.api_url,
                config.github_token(),
                metadata_timeout,
            )?),
            arch,
            scratch_dir: config.get_scratch_dir()?,
            codeberg_api_url: config.codeberg_api_url.trim_end_matches('/').to_string(),
            metadata_timeout,
        })
    }
}

/// Parse an http(s) URL, `None` for anything else
pub(crate) fn http_url(source: &str) -> Option<Url> {
    let url = Url::parse(source).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

/// Non-empty path segments of a URL
pub(crate) fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Percent-decoded last path segment, the asset's file name
pub(crate) fn url_file_name(url: &Url) -> Option<String> {
    let last = path_segments(url).last().copied()?;
    Some(
        urlencoding::decode(last)
            .map(|name| name.into_owned())
            .unwrap_or_else(|_| last.to_string()),
    )
}

/// `owner/repo/releases/download/tag/file` below a forge host
pub(crate) struct ReleaseDownloadUrl {
    pub owner: String,
    pub repo: String,
    pub tag: String,
    pub file: String,
}

impl ReleaseDownloadUrl {
    /// `<owner>/<repo>/releases/download/<tag>/<file>`. URLs with a fragment
    /// or ending in `/-/releases` are GitLab release pages and never match.
    pub(crate) fn parse(url: &Url) -> Option<Self> {
        if url.fragment().is_some() || url.path().trim_end_matches('/').ends_with("/-/releases") {
            return None;
        }
        match path_segments(url).as_slice() {
            [owner, repo, "releases", "download", tag, file] => Some(Self {
                owner: owner.to_string(),
                repo: repo.to_string(),
                tag: urlencoding::decode(tag).ok()?.into_owned(),
                file: urlencoding::decode(file).ok()?.into_owned(),
            }),
            _ => None,
        }
    }
}

/// Compare an asset with the installed file: digest when the API reported
/// one, size otherwise. An unknown or zero size is "no update".
pub(crate) fn asset_differs(asset: &AssetDescriptor, installed: &InstalledFile) -> ShelfResult<bool> {
    if let Some(digest) = &asset.digest {
        return Ok(!digest.matches_file(&installed.path)?);
    }
    match asset.size {
        Some(size) if size > 0 => Ok(size != installed.size),
        _ => Ok(false),
    }
}

/// Parse a `Content-Length` header; reqwest reports no length for HEAD
/// responses, so the header is read directly
pub(crate) fn content_length(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Size of a remote file from a HEAD request; `None` when unobtainable
pub(crate) async fn head_content_length(ctx: &ResolverContext, url: &Url) -> Option<u64> {
    let response = ctx
        .http
        .head(url.clone())
        .timeout(ctx.metadata_timeout)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    content_length(response.headers()).filter(|len| *len > 0)
}

/// Download an http(s) asset through a fresh session in `slot`
pub(crate) async fn fetch_http(
    ctx: &ResolverContext,
    slot: &SessionSlot,
    asset: &AssetDescriptor,
    progress: Option<ProgressCallback>,
) -> ShelfResult<FetchedAsset> {
    let url = match &asset.locator {
        AssetLocator::Url(url) => url,
        other => {
            return Err(ShelfError::Network(format!(
                "Cannot download {} over HTTP",
                other
            )))
        }
    };

    let session = slot.open(&ctx.scratch_dir)?;
    let path = session
        .download_http(&ctx.http, url, &asset.name, progress)
        .await?;
    let hash = {
        let path = path.clone();
        run_blocking(move || content_hash(&path)).await?
    };

    Ok(FetchedAsset {
        path,
        version_tag: asset.version_tag.clone(),
        hash,
    })
}

pub(crate) fn no_asset(source: &str) -> ShelfError {
    ShelfError::Network(format!("No matching asset found for {}", source))
}
