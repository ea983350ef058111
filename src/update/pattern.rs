//! Filename patterns used to find release assets.
//!
//! GitHub, GitLab, Codeberg and FTP sources use shell-glob semantics.
//! Forgejo sources compile the glob to a regex in which `*` only spans an
//! alphanumeric run, so `app-*.AppImage` does not match `app-1.0.AppImage`.

use crate::core::{ShelfError, ShelfResult};
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

/// Compile a shell glob
pub fn glob_matcher(pattern: &str) -> ShelfResult<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| ShelfError::Config(format!("Invalid filename pattern {}: {}", pattern, e)))
}

/// Whether a path segment contains glob metacharacters
pub fn is_glob(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}

/// Compile a glob where `*` is `[[:alnum:]]+` and `?` is `[[:alnum:]]`
pub fn alnum_glob_regex(pattern: &str) -> ShelfResult<Regex> {
    let mut regex = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str("[[:alnum:]]+"),
            '?' => regex.push_str("[[:alnum:]]"),
            _ => regex.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    regex.push('$');
    Regex::new(&regex)
        .map_err(|e| ShelfError::Config(format!("Invalid filename pattern {}: {}", pattern, e)))
}

fn tag_version(tag: &str) -> &str {
    tag.strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag)
}

/// Turn a released filename into a glob by replacing the tag's version
/// with `*`. Filenames that do not contain the version are kept literally.
pub fn derive_pattern(file_name: &str, tag: &str) -> String {
    let version = tag_version(tag);
    if version.is_empty() || !file_name.contains(version) {
        return file_name.to_string();
    }
    file_name.replacen(version, "*", 1)
}

/// Like [`derive_pattern`], but each alphanumeric run of the version becomes
/// its own `*`, keeping the separators: `app-1.2.3.AppImage` with tag
/// `v1.2.3` gives `app-*.*.*.AppImage`.
pub fn derive_alnum_pattern(file_name: &str, tag: &str) -> String {
    let version = tag_version(tag);
    if version.is_empty() || !file_name.contains(version) {
        return file_name.to_string();
    }

    let mut generalized = String::new();
    let mut in_run = false;
    for c in version.chars() {
        if c.is_ascii_alphanumeric() {
            if !in_run {
                generalized.push('*');
                in_run = true;
            }
        } else {
            generalized.push(c);
            in_run = false;
        }
    }
    file_name.replacen(version, &generalized, 1)
}
