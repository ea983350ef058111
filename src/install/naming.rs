//! File names for integrated bundles.
//!
//! Every installed bundle gets a stem `<sanitized name>_<hash prefix>`; the
//! bundle, its icon and its manifest are all named after it.

/// Manifests written by this tool start with this prefix
pub const MANIFEST_PREFIX: &str = "shelf_";

const STEM_HASH_LEN: usize = 8;
const MARKER_HASH_LEN: usize = 7;

/// Make a display name safe to use as a file name
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() || matches!(c, '-' | '.') {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let trimmed = out.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "bundle".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Collision-safe stem for a bundle with this display name and content hash
pub fn install_stem(name: &str, hash: &str) -> String {
    format!("{}_{}", sanitize(name), prefix(hash, STEM_HASH_LEN))
}

/// Version shown for a bundle: the declared one, else a hash prefix
pub fn version_marker(declared: Option<&str>, hash: &str) -> String {
    match declared.map(str::trim).filter(|v| !v.is_empty()) {
        Some(version) => version.to_string(),
        None => prefix(hash, MARKER_HASH_LEN).to_string(),
    }
}

/// Display name for a bundle kept next to another one with the same name
pub fn keep_both_name(name: &str, marker: &str) -> String {
    format!("{} ({})", name, marker)
}

pub fn manifest_file_name(stem: &str) -> String {
    format!("{}{}.desktop", MANIFEST_PREFIX, stem)
}

fn prefix(hash: &str, len: usize) -> &str {
    hash.get(..len).unwrap_or(hash)
}
