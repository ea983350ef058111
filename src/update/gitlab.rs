//! GitLab sources.
//!
//! - `https://<host>/<namespace>/<project>/-/releases#<pattern>`: the asset
//!   links of the most recent release are matched against the glob after `#`
//! - `https://<host>/api/v4/projects/<id>/packages/generic/<pkg>/<version>/<file>`:
//!   a generic package file, used directly
//!
//! Change detection compares a HEAD request's content length with the
//! installed size.

use super::pattern::glob_matcher;
use super::{
    asset_differs, fetch_http, head_content_length, http_url, no_asset, path_segments,
    url_file_name, AssetDescriptor, AssetLocator, FetchedAsset, InstalledFile, ReleaseResolver,
    ResolverContext, ResolverKind,
};
use crate::core::{ShelfError, ShelfResult};
use crate::download::{ProgressCallback, SessionSlot};
use async_trait::async_trait;
use globset::GlobMatcher;
use serde::Deserialize;
use tracing::debug;
use url::Url;

const RELEASES_MARKER: &str = "/-/releases";

pub fn recognizes(source: &str) -> bool {
    http_url(source).is_some_and(|url| parse_target(&url).is_some())
}

enum GitLabTarget {
    Release {
        /// `namespace/project`
        project: String,
        pattern: String,
    },
    Package {
        version: Option<String>,
    },
}

fn parse_target(url: &Url) -> Option<GitLabTarget> {
    let segments = path_segments(url);

    if let ["api", "v4", "projects", _id, "packages", "generic", rest @ ..] = segments.as_slice() {
        return match rest {
            [_package, version, _file] => Some(GitLabTarget::Package {
                version: Some(version.to_string()),
            }),
            [_package, .., _file] => Some(GitLabTarget::Package { version: None }),
            _ => None,
        };
    }

    let project = url.path().strip_suffix(RELEASES_MARKER).or_else(|| {
        url.path()
            .strip_suffix('/')
            .and_then(|p| p.strip_suffix(RELEASES_MARKER))
    })?;
    let project = project.trim_matches('/');
    let pattern = url.fragment().filter(|f| !f.is_empty())?;
    if project.is_empty() {
        return None;
    }

    Some(GitLabTarget::Release {
        project: urlencoding::decode(project).ok()?.into_owned(),
        pattern: urlencoding::decode(pattern).ok()?.into_owned(),
    })
}

#[derive(Debug, Deserialize)]
struct GitLabRelease {
    tag_name: String,
    #[serde(default)]
    assets: GitLabAssets,
}

#[derive(Debug, Default, Deserialize)]
struct GitLabAssets {
    #[serde(default)]
    links: Vec<GitLabLink>,
}

#[derive(Debug, Deserialize)]
struct GitLabLink {
    name: String,
    url: String,
    #[serde(default)]
    direct_asset_url: Option<String>,
}

pub struct GitLabResolver {
    source: String,
    url: Url,
    target: GitLabTarget,
    matcher: Option<GlobMatcher>,
    ctx: ResolverContext,
    sessions: SessionSlot,
}

impl GitLabResolver {
    pub fn new(source: &str, ctx: ResolverContext) -> ShelfResult<Self> {
        let invalid = || ShelfError::InvalidArgument(format!("Not a GitLab source: {}", source));
        let url = http_url(source).ok_or_else(invalid)?;
        let target = parse_target(&url).ok_or_else(invalid)?;
        let matcher = match &target {
            GitLabTarget::Release { pattern, .. } => Some(glob_matcher(pattern)?),
            GitLabTarget::Package { .. } => None,
        };

        Ok(Self {
            source: source.to_string(),
            url,
            target,
            matcher,
            ctx,
            sessions: SessionSlot::default(),
        })
    }

    fn api_base(&self) -> String {
        let mut base = format!(
            "{}://{}",
            self.url.scheme(),
            self.url.host_str().unwrap_or_default()
        );
        if let Some(port) = self.url.port() {
            base.push_str(&format!(":{}", port));
        }
        format!("{}/api/v4", base)
    }

    async fn latest_release(&self, project: &str) -> ShelfResult<Option<GitLabRelease>> {
        let url = format!(
            "{}/projects/{}/releases",
            self.api_base(),
            urlencoding::encode(project)
        );
        debug!("GET {}", url);

        let response = self
            .ctx
            .http
            .get(&url)
            .timeout(self.ctx.metadata_timeout)
            .send()
            .await
            .map_err(|e| ShelfError::Network(format!("GitLab API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ShelfError::Network(format!(
                "GitLab API error: HTTP {}",
                response.status()
            )));
        }

        let releases: Vec<GitLabRelease> = response.json().await.map_err(|e| {
            ShelfError::Network(format!("Failed to parse GitLab API response: {}", e))
        })?;
        Ok(releases.into_iter().next())
    }

    async fn resolve_release(&self, project: &str) -> ShelfResult<Option<AssetDescriptor>> {
        let Some(release) = self.latest_release(project).await? else {
            return Ok(None);
        };

        let candidates: Vec<&GitLabLink> = release
            .assets
            .links
            .iter()
            .filter(|link| {
                self.matcher
                    .as_ref()
                    .is_some_and(|m| m.is_match(&link.name))
            })
            .collect();
        let Some(link) = self.ctx.arch.pick(&candidates, |l| l.name.as_str()).copied() else {
            return Ok(None);
        };

        let raw = link.direct_asset_url.as_deref().unwrap_or(&link.url);
        let url = Url::parse(raw)
            .map_err(|e| ShelfError::Network(format!("Invalid asset URL {}: {}", raw, e)))?;

        Ok(Some(AssetDescriptor {
            name: link.name.clone(),
            size: head_content_length(&self.ctx, &url).await,
            locator: AssetLocator::Url(url),
            digest: None,
            delta_check: None,
            version_tag: Some(release.tag_name),
        }))
    }
}

#[async_trait]
impl ReleaseResolver for GitLabResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Gitlab
    }

    fn source(&self) -> &str {
        &self.source
    }

    async fn resolve_asset(&self) -> ShelfResult<Option<AssetDescriptor>> {
        match &self.target {
            GitLabTarget::Release { project, .. } => self.resolve_release(project).await,
            GitLabTarget::Package { version } => Ok(Some(AssetDescriptor {
                name: url_file_name(&self.url).unwrap_or_else(|| "package".to_string()),
                locator: AssetLocator::Url(self.url.clone()),
                size: head_content_length(&self.ctx, &self.url).await,
                digest: None,
                delta_check: None,
                version_tag: version.clone(),
            })),
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

    #[test]
    fn test_parse_targets() {
        let url = Url::parse("https://gitlab.com/group/sub/tool/-/releases#tool-*.AppImage").unwrap();
        match parse_target(&url) {
            Some(GitLabTarget::Release { project, pattern }) => {
                assert_eq!(project, "group/sub/tool");
                assert_eq!(pattern, "tool-*.AppImage");
            }
            _ => panic!("Expected release target"),
        }

        let url = Url::parse(
            "https://gitlab.com/api/v4/projects/42/packages/generic/tool/1.0.0/tool.AppImage",
        )
        .unwrap();
        assert!(matches!(
            parse_target(&url),
            Some(GitLabTarget::Package { version: Some(v) }) if v == "1.0.0"
        ));

        // A releases page without a filename pattern is not a source
        let url = Url::parse("https://gitlab.com/group/tool/-/releases").unwrap();
        assert!(parse_target(&url).is_none());
    }

    #[tokio::test]
    async fn test_release_source_uses_encoded_project_id() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/acme%2Ftool/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "tag_name": "v2.0",
                    "assets": {
                        "links": [
                            {
                                "name": "tool-2.0-x86_64.AppImage",
                                "url": format!("{}/uploads/tool-2.0-x86_64.AppImage", mock_server.uri()),
                                "direct_asset_url": format!("{}/acme/tool/-/releases/v2.0/downloads/tool-2.0-x86_64.AppImage", mock_server.uri())
                            },
                            {
                                "name": "checksums.txt",
                                "url": format!("{}/uploads/checksums.txt", mock_server.uri())
                            }
                        ]
                    }
                },
                {
                    "tag_name": "v1.0",
                    "assets": { "links": [] }
                }
            ])))
            .mount(&mock_server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/acme/tool/-/releases/v2.0/downloads/tool-2.0-x86_64.AppImage"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![0u8; 1500], "application/octet-stream"),
            )
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let resolver = GitLabResolver::new(
            &format!("{}/acme/tool/-/releases#tool-*.AppImage", mock_server.uri()),
            test_context(&mock_server.uri(), temp.path()),
        )
        .unwrap();

        let asset = resolver.resolve_asset().await.unwrap().unwrap();
        assert_eq!(asset.name, "tool-2.0-x86_64.AppImage");
        assert_eq!(asset.size, Some(1500));
        assert_eq!(asset.version_tag.as_deref(), Some("v2.0"));

        let file = temp.path().join("tool.AppImage");
        fs::write(&file, vec![0u8; 1500]).unwrap();
        assert!(!resolver
            .has_update(&InstalledFile::from_path(&file).unwrap())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_package_source_missing_length_is_no_update() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let resolver = GitLabResolver::new(
            &format!(
                "{}/api/v4/projects/42/packages/generic/tool/1.0.0/tool.AppImage",
                mock_server.uri()
            ),
            test_context(&mock_server.uri(), temp.path()),
        )
        .unwrap();

        let file = temp.path().join("tool.AppImage");
        fs::write(&file, vec![0u8; 10]).unwrap();
        assert!(!resolver
            .has_update(&InstalledFile::from_path(&file).unwrap())
            .await
            .unwrap());
    }
}
