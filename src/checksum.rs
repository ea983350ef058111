use crate::core::{ShelfError, ShelfResult};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Digest algorithm a remote service reports for an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// SHA-1, as embedded in zsync delta-check manifests
    Sha1,
    /// SHA-256, as reported by the GitHub assets API
    Sha256,
}

/// A remote content digest, lowercase hex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    pub algorithm: DigestAlgorithm,
    pub hex: String,
}

impl ContentDigest {
    /// Parse an `algo:hex` digest string such as `sha256:ab12...`
    pub fn parse_prefixed(value: &str) -> Option<Self> {
        let (algo, hex) = value.split_once(':')?;
        let algorithm = match algo.to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => DigestAlgorithm::Sha1,
            "sha256" | "sha-256" => DigestAlgorithm::Sha256,
            _ => return None,
        };
        let hex = hex.trim().to_ascii_lowercase();
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self { algorithm, hex })
    }

    /// Compare against the digest of a local file
    pub fn matches_file(&self, path: &Path) -> ShelfResult<bool> {
        let local = match self.algorithm {
            DigestAlgorithm::Sha1 => sha1_hex(path)?,
            DigestAlgorithm::Sha256 => sha256_hex(path)?,
        };
        Ok(local == self.hex)
    }
}

fn stream_file(path: &Path, mut update: impl FnMut(&[u8])) -> ShelfResult<()> {
    let mut file = File::open(path).map_err(|e| {
        ShelfError::Path(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        update(&buf[..read]);
    }
    Ok(())
}

/// Content hash identifying a bundle file (BLAKE3, hex)
pub fn content_hash(path: &Path) -> ShelfResult<String> {
    let mut hasher = blake3::Hasher::new();
    stream_file(path, |chunk| {
        hasher.update(chunk);
    })?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// SHA-1 of a file, hex
pub fn sha1_hex(path: &Path) -> ShelfResult<String> {
    let mut hasher = Sha1::new();
    stream_file(path, |chunk| hasher.update(chunk))?;
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of a file, hex
pub fn sha256_hex(path: &Path) -> ShelfResult<String> {
    let mut hasher = Sha256::new();
    stream_file(path, |chunk| hasher.update(chunk))?;
    Ok(hex::encode(hasher.finalize()))
}
