//! zsync control files, used as delta-check artifacts.
//!
//! Only the text header is read: `Key: value` lines up to the first blank
//! line. The block checksums after it are binary and never needed here.

use crate::core::{ShelfError, ShelfResult};
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// The header fields of a zsync control file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZsyncHeader {
    /// SHA-1 of the complete target file, lowercase hex
    pub sha1: Option<String>,
    pub length: Option<u64>,
    pub filename: Option<String>,
    pub url: Option<String>,
}

pub fn parse_header(content: &[u8]) -> ZsyncHeader {
    let end = content
        .windows(2)
        .position(|w| w == b"\n\n")
        .unwrap_or(content.len());
    let text = String::from_utf8_lossy(&content[..end]);

    let mut header = ZsyncHeader::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "SHA-1" => header.sha1 = Some(value.to_ascii_lowercase()),
            "Length" => header.length = value.parse().ok(),
            "Filename" => header.filename = Some(value.to_string()),
            "URL" => header.url = Some(value.to_string()),
            _ => {}
        }
    }
    header
}

/// Download and parse the header of the control file at `url`
pub async fn fetch_header(client: &Client, url: &Url, timeout: Duration) -> ShelfResult<ZsyncHeader> {
    let response = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| ShelfError::Network(format!("Failed to fetch {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(ShelfError::Network(format!(
            "Failed to fetch {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ShelfError::Network(format!("Failed to read {}: {}", url, e)))?;
    Ok(parse_header(&body))
}
