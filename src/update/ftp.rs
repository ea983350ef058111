//! Anonymous FTP sources (`ftp://<host>/<path with glob segments>`).
//!
//! Glob segments are expanded one directory level at a time, starting at
//! the first non-literal segment. Matches come back in the order the server
//! lists them; when several files match, the first one is used.
//!
//! A level whose listings all fail is an error, as is a failed `SIZE`; an
//! unreachable server never reads as "no update".

use super::pattern::{glob_matcher, is_glob};
use super::{
    AssetDescriptor, AssetLocator, FetchedAsset, InstalledFile, ReleaseResolver, ResolverContext,
    ResolverKind,
};
use crate::checksum::content_hash;
use crate::core::{ShelfError, ShelfResult};
use crate::download::{run_blocking, ProgressCallback, SessionSlot};
use async_trait::async_trait;
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tracing::debug;
use url::Url;

const DEFAULT_PORT: u16 = 21;

pub fn recognizes(source: &str) -> bool {
    Url::parse(source)
        .map(|url| url.scheme() == "ftp" && url.host_str().is_some())
        .unwrap_or(false)
}

/// Directory listing and file sizes on an FTP server
pub trait FtpLister {
    /// Entry names in `dir` (bare names or full paths)
    fn list(&mut self, dir: &str) -> ShelfResult<Vec<String>>;

    /// Size in bytes of the file at `path`
    fn size(&mut self, path: &str) -> ShelfResult<u64>;
}

fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Every remote path matching `path`, in server listing order
pub fn glob_candidates(lister: &mut dyn FtpLister, path: &str) -> ShelfResult<Vec<String>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(first_glob) = segments.iter().position(|s| is_glob(s)) else {
        return Ok(vec![format!("/{}", segments.join("/"))]);
    };

    let mut current = vec![format!("/{}", segments[..first_glob].join("/"))];
    for segment in &segments[first_glob..] {
        let mut next = Vec::new();
        if is_glob(segment) {
            let matcher = glob_matcher(segment)?;
            let mut listed = false;
            let mut first_error = None;
            for dir in &current {
                let entries = match lister.list(dir) {
                    Ok(entries) => entries,
                    Err(e) => {
                        debug!("Skipping {}: {}", dir, e);
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                        continue;
                    }
                };
                listed = true;
                for entry in entries {
                    let name = entry.rsplit('/').next().unwrap_or(&entry).to_string();
                    if matcher.is_match(&name) {
                        next.push(join(dir, &name));
                    }
                }
            }
            if let (false, Some(e)) = (listed, first_error) {
                return Err(e);
            }
        } else {
            next.extend(current.iter().map(|dir| join(dir, segment)));
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    Ok(current)
}

/// An anonymous FTP control connection
struct FtpConnection {
    stream: FtpStream,
}

impl FtpConnection {
    fn open(host: &str, port: u16) -> ShelfResult<Self> {
        let mut stream = FtpStream::connect((host, port))
            .map_err(|e| ShelfError::Ftp(format!("Cannot connect to {}:{}: {}", host, port, e)))?;
        stream
            .login("anonymous", "anonymous")
            .map_err(|e| ShelfError::Ftp(format!("Anonymous login to {} failed: {}", host, e)))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| ShelfError::Ftp(format!("Cannot switch to binary mode: {}", e)))?;
        Ok(Self { stream })
    }

    fn close(mut self) {
        if let Err(e) = self.stream.quit() {
            debug!("FTP QUIT failed: {}", e);
        }
    }
}

impl FtpLister for FtpConnection {
    fn list(&mut self, dir: &str) -> ShelfResult<Vec<String>> {
        self.stream
            .nlst(Some(dir))
            .map_err(|e| ShelfError::Ftp(format!("Cannot list {}: {}", dir, e)))
    }

    fn size(&mut self, path: &str) -> ShelfResult<u64> {
        self.stream
            .size(path)
            .map(|size| size as u64)
            .map_err(|e| ShelfError::Ftp(format!("SIZE {} failed: {}", path, e)))
    }
}

/// Size of the first remote file matching `path`; `None` when nothing matches
pub fn remote_size(lister: &mut dyn FtpLister, path: &str) -> ShelfResult<Option<u64>> {
    match glob_candidates(lister, path)?.into_iter().next() {
        Some(candidate) => lister.size(&candidate).map(Some),
        None => Ok(None),
    }
}

/// A known, non-empty remote size that differs from the installed one
fn is_newer(remote: Option<u64>, installed: u64) -> bool {
    matches!(remote, Some(size) if size > 0 && size != installed)
}

pub struct FtpResolver {
    source: String,
    host: String,
    port: u16,
    path: String,
    ctx: ResolverContext,
    sessions: SessionSlot,
}

impl FtpResolver {
    pub fn new(source: &str, ctx: ResolverContext) -> ShelfResult<Self> {
        let url = Url::parse(source)
            .ok()
            .filter(|url| url.scheme() == "ftp")
            .ok_or_else(|| ShelfError::InvalidArgument(format!("Not an FTP URL: {}", source)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ShelfError::InvalidArgument(format!("FTP URL without host: {}", source)))?
            .to_string();
        let path = urlencoding::decode(url.path())
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| url.path().to_string());

        Ok(Self {
            source: source.to_string(),
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            path,
            ctx,
            sessions: SessionSlot::default(),
        })
    }

    /// All remote files matching the source path
    pub async fn candidates(&self) -> ShelfResult<Vec<String>> {
        let (host, port, path) = (self.host.clone(), self.port, self.path.clone());
        run_blocking(move || {
            let mut connection = FtpConnection::open(&host, port)?;
            let candidates = glob_candidates(&mut connection, &path);
            connection.close();
            candidates
        })
        .await
    }

    fn descriptor(&self, path: String, size: Option<u64>) -> AssetDescriptor {
        AssetDescriptor {
            name: path.rsplit('/').next().unwrap_or(&path).to_string(),
            locator: AssetLocator::Ftp {
                host: self.host.clone(),
                port: self.port,
                path,
            },
            size,
            digest: None,
            delta_check: None,
            version_tag: None,
        }
    }
}

#[async_trait]
impl ReleaseResolver for FtpResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Ftp
    }

    fn source(&self) -> &str {
        &self.source
    }

    async fn resolve_asset(&self) -> ShelfResult<Option<AssetDescriptor>> {
        let first = self.candidates().await?.into_iter().next();
        Ok(first.map(|path| self.descriptor(path, None)))
    }

    async fn has_update(&self, installed: &InstalledFile) -> ShelfResult<bool> {
        let (host, port, path) = (self.host.clone(), self.port, self.path.clone());
        let remote = run_blocking(move || {
            let mut connection = FtpConnection::open(&host, port)?;
            let size = remote_size(&mut connection, &path);
            connection.close();
            size
        })
        .await?;

        Ok(is_newer(remote, installed.size))
    }

    async fn fetch(&self, progress: Option<ProgressCallback>) -> ShelfResult<FetchedAsset> {
        let session = self.sessions.open(&self.ctx.scratch_dir)?;
        let (host, port, path) = (self.host.clone(), self.port, self.path.clone());

        let downloaded = run_blocking(move || {
            let mut connection = FtpConnection::open(&host, port)?;
            let remote = glob_candidates(&mut connection, &path)?
                .into_iter()
                .next()
                .ok_or_else(|| ShelfError::Ftp(format!("Nothing matches {}", path)))?;
            let size = match connection.size(&remote) {
                Ok(size) => Some(size),
                Err(e) => {
                    debug!("Downloading {} without a known size: {}", remote, e);
                    None
                }
            };
            let name = remote.rsplit('/').next().unwrap_or(&remote).to_string();

            let mut stream = connection
                .stream
                .retr_as_stream(&remote)
                .map_err(|e| ShelfError::Ftp(format!("RETR {} failed: {}", remote, e)))?;
            let file = session.download_blocking(&mut stream, size, &name, progress)?;
            connection
                .stream
                .finalize_retr_stream(stream)
                .map_err(|e| ShelfError::Ftp(format!("RETR {} failed: {}", remote, e)))?;
            connection.close();

            let hash = content_hash(&file)?;
            Ok((file, hash))
        })
        .await?;

        Ok(FetchedAsset {
            path: downloaded.0,
            version_tag: None,
            hash: downloaded.1,
        })
    }

    fn cancel(&self) {
        self.sessions.cancel();
    }

    fn dispose(&self) {
        self.sessions.dispose();
    }
}
