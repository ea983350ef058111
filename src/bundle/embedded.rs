//! Metadata stored inside the bundle binary itself: the bundle magic, the
//! ELF machine type and the embedded update-source string.

use crate::core::{ShelfError, ShelfResult};
use goblin::elf::header;
use goblin::elf::Elf;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// ELF section carrying the update-source string in type 2 bundles
pub const UPDATE_INFO_SECTION: &str = ".upd_info";

/// Offset and size of the update-source string in type 1 bundles
const TYPE1_UPDATE_INFO_OFFSET: usize = 33651;
const TYPE1_UPDATE_INFO_LEN: usize = 512;

/// The runtime (and its section table) lives at the start of the image;
/// the filesystem payload after it is never needed here.
const HEADER_WINDOW: u64 = 8 * 1024 * 1024;

/// Read the leading window of a bundle file
pub fn read_header_window(path: &Path) -> ShelfResult<Vec<u8>> {
    let file = File::open(path)
        .map_err(|e| ShelfError::Extraction(format!("Cannot open {}: {}", path.display(), e)))?;
    let mut bytes = Vec::new();
    file.take(HEADER_WINDOW).read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Bundle format version from the magic bytes at offset 8 (`AI\x01` or `AI\x02`)
pub fn bundle_type(bytes: &[u8]) -> Option<u8> {
    if bytes.len() < 11 || &bytes[..4] != b"\x7fELF" {
        return None;
    }
    match &bytes[8..11] {
        [b'A', b'I', t @ (1 | 2)] => Some(*t),
        _ => None,
    }
}

/// Architecture tag from the ELF machine field
pub fn architecture(bytes: &[u8]) -> Option<String> {
    let header = Elf::parse_header(bytes).ok()?;
    let tag = match header.e_machine {
        header::EM_X86_64 => "x86_64",
        header::EM_386 => "i686",
        header::EM_AARCH64 => "aarch64",
        header::EM_ARM => "armhf",
        header::EM_RISCV => "riscv64",
        _ => return None,
    };
    Some(tag.to_string())
}

/// Raw (undecoded) update-source string embedded in the bundle, if any
pub fn read_update_info(path: &Path) -> ShelfResult<Option<String>> {
    let bytes = read_header_window(path)?;
    Ok(update_info_from_bytes(&bytes))
}

pub fn update_info_from_bytes(bytes: &[u8]) -> Option<String> {
    let raw = match bundle_type(bytes) {
        Some(1) => bytes
            .get(TYPE1_UPDATE_INFO_OFFSET..TYPE1_UPDATE_INFO_OFFSET + TYPE1_UPDATE_INFO_LEN)?
            .to_vec(),
        Some(_) => section_bytes(bytes, UPDATE_INFO_SECTION)?,
        None => return None,
    };

    let text = String::from_utf8_lossy(&raw);
    let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn section_bytes(bytes: &[u8], name: &str) -> Option<Vec<u8>> {
    let elf = match Elf::parse(bytes) {
        Ok(elf) => elf,
        Err(e) => {
            debug!("Could not parse bundle runtime as ELF: {}", e);
            return None;
        }
    };

    let section = elf
        .section_headers
        .iter()
        .find(|sh| elf.shdr_strtab.get_at(sh.sh_name) == Some(name))?;

    let start = section.sh_offset as usize;
    let end = start.checked_add(section.sh_size as usize)?;
    bytes.get(start..end).map(|s| s.to_vec())
}

/// Decode an embedded update-source string into a source a resolver can
/// recognize.
///
/// - `gh-releases-zsync|owner|repo|channel|pattern` is kept as is
/// - `zsync|http...` becomes the asset URL (the `.zsync` suffix is dropped)
///
/// Other transports are not supported and decode to `None`.
pub fn decode_update_info(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.starts_with("gh-releases-zsync|") {
        return Some(raw.to_string());
    }
    if let Some(url) = raw.strip_prefix("zsync|") {
        if url.starts_with("http") {
            let url = url.strip_suffix(".zsync").unwrap_or(url);
            return Some(url.to_string());
        }
    }
    debug!("Unsupported embedded update information: {}", raw);
    None
}
