//! Byte transfer for resolved assets.
//!
//! Each [`DownloadSession`] owns a randomly named directory below the scratch
//! directory, so concurrent sessions never touch each other's files. Data is
//! written to a `.part` file that is only renamed to its final name once the
//! transfer completed; interrupted transfers never leave a file behind.

pub mod progress;

pub use progress::{ProgressCallback, ProgressReporter, TransferProgress};

use crate::core::path::ensure_dir;
use crate::core::{ShelfError, ShelfResult};
use futures_util::StreamExt;
use reqwest::{header, Client};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Block size for blocking (FTP) transfers
const BLOCK_SIZE: usize = 8 * 1024;

/// One transfer into a private scratch directory
pub struct DownloadSession {
    dir: TempDir,
    token: CancellationToken,
    finished: AtomicBool,
}

impl DownloadSession {
    /// Create a new session below `scratch_dir`
    pub fn new(scratch_dir: &Path) -> ShelfResult<Self> {
        let downloads = scratch_dir.join("downloads");
        ensure_dir(&downloads)?;
        let dir = tempfile::Builder::new()
            .prefix("session-")
            .tempdir_in(&downloads)?;
        Ok(Self {
            dir,
            token: CancellationToken::new(),
            finished: AtomicBool::new(false),
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Final path for a downloaded file called `file_name`
    pub fn destination(&self, file_name: &str) -> PathBuf {
        let name = Path::new(file_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "download".to_string());
        self.dir.path().join(name)
    }

    /// Abort the transfer. Idempotent, and a no-op once the transfer completed.
    pub fn cancel(&self) {
        if self.finished.load(Ordering::SeqCst) || self.token.is_cancelled() {
            return;
        }
        debug!("Cancelling download in {}", self.dir.path().display());
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Download `url` with a streamed GET
    pub async fn download_http(
        &self,
        client: &Client,
        url: &Url,
        file_name: &str,
        progress: Option<ProgressCallback>,
    ) -> ShelfResult<PathBuf> {
        let dest = self.destination(file_name);
        let part = part_path(&dest);

        let response = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(ShelfError::cancelled("cancelled before transfer started")),
            response = client.get(url.clone()).send() => response
                .map_err(|e| ShelfError::Network(format!("Failed to download {}: {}", url, e)))?,
        };

        if !response.status().is_success() {
            return Err(ShelfError::Network(format!(
                "Failed to download {}: HTTP {}",
                url,
                response.status()
            )));
        }

        let expected = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let mut reporter = ProgressReporter::new(expected, progress);
        let result = self
            .stream_http(response, &part, expected, &mut reporter)
            .await;
        self.complete(result, &part, &dest, &mut reporter)
    }

    async fn stream_http(
        &self,
        response: reqwest::Response,
        part: &Path,
        expected: Option<u64>,
        reporter: &mut ProgressReporter,
    ) -> ShelfResult<u64> {
        let mut file = tokio::fs::File::create(part).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    return Err(ShelfError::cancelled(format!("cancelled after {} bytes", written)));
                }
                chunk = stream.next() => chunk,
            };

            match next {
                Some(Ok(chunk)) => {
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                    reporter.advance(written);
                }
                Some(Err(e)) => {
                    return Err(ShelfError::interrupted(format!(
                        "transfer failed after {} bytes: {}",
                        written, e
                    )));
                }
                None => break,
            }
        }

        file.flush().await?;
        check_length(written, expected)?;
        Ok(written)
    }

    /// Copy `reader` into the session in fixed-size blocks, checking for
    /// cancellation between blocks. Used for blocking transports.
    pub fn download_blocking<R: Read>(
        &self,
        reader: R,
        expected: Option<u64>,
        file_name: &str,
        progress: Option<ProgressCallback>,
    ) -> ShelfResult<PathBuf> {
        let dest = self.destination(file_name);
        let part = part_path(&dest);
        let mut reporter = ProgressReporter::new(expected, progress);
        let result = self.copy_blocks(reader, &part, expected, &mut reporter);
        self.complete(result, &part, &dest, &mut reporter)
    }

    fn copy_blocks<R: Read>(
        &self,
        mut reader: R,
        part: &Path,
        expected: Option<u64>,
        reporter: &mut ProgressReporter,
    ) -> ShelfResult<u64> {
        let mut file = fs::File::create(part)?;
        let mut buf = [0u8; BLOCK_SIZE];
        let mut written: u64 = 0;

        loop {
            if self.token.is_cancelled() {
                return Err(ShelfError::cancelled(format!(
                    "cancelled after {} bytes",
                    written
                )));
            }
            let read = reader.read(&mut buf).map_err(|e| {
                ShelfError::interrupted(format!("transfer failed after {} bytes: {}", written, e))
            })?;
            if read == 0 {
                break;
            }
            file.write_all(&buf[..read])?;
            written += read as u64;
            reporter.advance(written);
        }

        file.flush()?;
        check_length(written, expected)?;
        Ok(written)
    }

    fn complete(
        &self,
        result: ShelfResult<u64>,
        part: &Path,
        dest: &Path,
        reporter: &mut ProgressReporter,
    ) -> ShelfResult<PathBuf> {
        let written = match result {
            Ok(written) => written,
            Err(e) => {
                if part.exists() {
                    if let Err(remove) = fs::remove_file(part) {
                        warn!("Failed to remove {}: {}", part.display(), remove);
                    }
                }
                return Err(e);
            }
        };

        fs::rename(part, dest)?;
        self.finished.store(true, Ordering::SeqCst);
        reporter.finish(written);
        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(dest.to_path_buf())
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn check_length(written: u64, expected: Option<u64>) -> ShelfResult<()> {
    match expected {
        Some(expected) if written < expected => Err(ShelfError::interrupted(format!(
            "received {} of {} bytes",
            written, expected
        ))),
        _ => Ok(()),
    }
}

/// Holds the session of the transfer a resolver is running, so that
/// `cancel` and `dispose` can reach it from another task.
///
/// A cancel that arrives while no transfer is running (the resolver is still
/// looking up the release) is kept and fails the next `open`.
#[derive(Default)]
pub struct SessionSlot {
    current: Mutex<Option<Arc<DownloadSession>>>,
    pending_cancel: AtomicBool,
}

impl SessionSlot {
    /// Start a new session, replacing (and disposing) the previous one
    pub fn open(&self, scratch_dir: &Path) -> ShelfResult<Arc<DownloadSession>> {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.pending_cancel.swap(false, Ordering::SeqCst) {
            return Err(ShelfError::cancelled("cancelled before transfer started"));
        }
        let session = Arc::new(DownloadSession::new(scratch_dir)?);
        *current = Some(Arc::clone(&session));
        Ok(session)
    }

    pub fn cancel(&self) {
        if let Ok(current) = self.current.lock() {
            match current.as_ref() {
                Some(session) if !session.is_finished() => session.cancel(),
                _ => self.pending_cancel.store(true, Ordering::SeqCst),
            }
        }
    }

    /// Drop the session and any pending cancel; the session directory is
    /// removed once no transfer holds it
    pub fn dispose(&self) {
        if let Ok(mut current) = self.current.lock() {
            current.take();
            self.pending_cancel.store(false, Ordering::SeqCst);
        }
    }
}

/// Run blocking work on the blocking thread pool
pub async fn run_blocking<F, T>(work: F) -> ShelfResult<T>
where
    F: FnOnce() -> ShelfResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ShelfError::Io(std::io::Error::other(format!("Background task failed: {}", e))))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Reader that cancels its session after the first block
    struct CancellingReader<'a> {
        session: &'a DownloadSession,
        data: Cursor<Vec<u8>>,
    }

    impl Read for CancellingReader<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = BLOCK_SIZE.min(buf.len());
            let read = self.data.read(&mut buf[..n])?;
            self.session.cancel();
            Ok(read)
        }
    }

    #[test]
    fn test_blocking_download_completes() {
        let temp = TempDir::new().unwrap();
        let session = DownloadSession::new(temp.path()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let progress: ProgressCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let data = vec![7u8; 100 * 1024];
        let path = session
            .download_blocking(Cursor::new(data.clone()), Some(data.len() as u64), "app.bin", Some(progress))
            .unwrap();

        assert_eq!(fs::read(&path).unwrap(), data);
        assert!(session.is_finished());
        assert!(!part_path(&path).exists());
        // 13 blocks, far fewer than one report per byte and at most one per percent
        let reports = calls.load(Ordering::SeqCst);
        assert!(reports >= 2 && reports <= 101);
    }

    #[test]
    fn test_short_read_is_interruption_not_cancellation() {
        let temp = TempDir::new().unwrap();
        let session = DownloadSession::new(temp.path()).unwrap();

        let result = session.download_blocking(Cursor::new(vec![1u8; 500]), Some(1000), "app.bin", None);
        match result {
            Err(ShelfError::DownloadInterrupted { cancelled, .. }) => assert!(!cancelled),
            other => panic!("Expected interruption, got {:?}", other),
        }
        assert!(!session.destination("app.bin").exists());
        assert!(!part_path(&session.destination("app.bin")).exists());
    }

    #[test]
    fn test_cancel_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let session = DownloadSession::new(temp.path()).unwrap();
        let reader = CancellingReader {
            session: &session,
            data: Cursor::new(vec![3u8; 64 * 1024]),
        };

        let result = session.download_blocking(reader, Some(64 * 1024), "app.bin", None);
        let err = result.unwrap_err();
        assert!(err.is_cancellation());
        assert!(!session.destination("app.bin").exists());
        assert_eq!(fs::read_dir(session.dir()).unwrap().count(), 0);

        // Second cancel is a no-op
        session.cancel();
        assert!(session.is_cancelled());
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let temp = TempDir::new().unwrap();
        let session = DownloadSession::new(temp.path()).unwrap();
        let path = session
            .download_blocking(Cursor::new(b"done".to_vec()), Some(4), "app.bin", None)
            .unwrap();

        session.cancel();
        session.cancel();
        assert!(!session.is_cancelled());
        assert_eq!(fs::read(path).unwrap(), b"done");
    }

    #[test]
    fn test_cancel_before_open_fails_next_transfer() {
        let temp = TempDir::new().unwrap();
        let slot = SessionSlot::default();

        slot.cancel();
        let err = slot.open(temp.path()).err().unwrap();
        assert!(err.is_cancellation());

        // The pending cancel is used up
        let session = slot.open(temp.path()).unwrap();
        assert!(!session.is_cancelled());
        slot.cancel();
        assert!(session.is_cancelled());
    }

    #[test]
    fn test_cancel_after_finished_transfer_applies_to_next() {
        let temp = TempDir::new().unwrap();
        let slot = SessionSlot::default();
        let first = slot.open(temp.path()).unwrap();
        first
            .download_blocking(Cursor::new(b"done".to_vec()), Some(4), "app.bin", None)
            .unwrap();

        slot.cancel();
        assert!(!first.is_cancelled());
        assert!(slot.open(temp.path()).err().unwrap().is_cancellation());
    }

    #[test]
    fn test_dispose_clears_pending_cancel() {
        let temp = TempDir::new().unwrap();
        let slot = SessionSlot::default();
        slot.cancel();
        slot.dispose();
        assert!(slot.open(temp.path()).is_ok());
    }

    #[test]
    fn test_sessions_use_distinct_directories() {
        let temp = TempDir::new().unwrap();
        let a = DownloadSession::new(temp.path()).unwrap();
        let b = DownloadSession::new(temp.path()).unwrap();
        assert_ne!(a.dir(), b.dir());

        let dir = a.dir().to_path_buf();
        drop(a);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_http_download() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app.AppImage"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 4096]))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let session = DownloadSession::new(temp.path()).unwrap();
        let url = Url::parse(&format!("{}/app.AppImage", mock_server.uri())).unwrap();

        let path = session
            .download_http(&Client::new(), &url, "app.AppImage", None)
            .await
            .unwrap();
        assert_eq!(fs::read(path).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let session = DownloadSession::new(temp.path()).unwrap();
        let url = Url::parse(&format!("{}/missing", mock_server.uri())).unwrap();

        let result = session.download_http(&Client::new(), &url, "missing", None).await;
        assert!(matches!(result, Err(ShelfError::Network(_))));
    }

    #[tokio::test]
    async fn test_http_short_body_is_interruption() {
        // Advertise 1000 bytes, send 100, close
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&[1u8; 100]).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let temp = TempDir::new().unwrap();
        let session = DownloadSession::new(temp.path()).unwrap();
        let url = Url::parse(&format!("http://{}/app.AppImage", addr)).unwrap();

        let err = session
            .download_http(&Client::new(), &url, "app.AppImage", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShelfError::DownloadInterrupted { cancelled: false, .. }));
        assert_eq!(fs::read_dir(session.dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_http_cancel_before_start() {
        let temp = TempDir::new().unwrap();
        let session = DownloadSession::new(temp.path()).unwrap();
        session.cancel();

        let url = Url::parse("http://127.0.0.1:9/never").unwrap();
        let err = session
            .download_http(&Client::new(), &url, "never", None)
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }

    #[test]
    fn test_session_slot_cancel_and_dispose() {
        let temp = TempDir::new().unwrap();
        let slot = SessionSlot::default();
        let session = slot.open(temp.path()).unwrap();
        let dir = session.dir().to_path_buf();

        slot.cancel();
        slot.cancel();
        assert!(session.is_cancelled());

        slot.dispose();
        drop(session);
        assert!(!dir.exists());
    }
}
