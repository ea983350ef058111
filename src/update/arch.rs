//! Host architecture and asset tie-breaking.

use crate::core::{ShelfError, ShelfResult};
use regex::Regex;

const X86_TOKEN: &str = r"(?i)(x86_64|x86-64|amd64|x64|x86)";
const ARM_TOKEN: &str = r"(?i)(arm|aarch64)";

/// Host architecture plus the token patterns used to pick between assets
/// built for different architectures
#[derive(Debug, Clone)]
pub struct ArchPreference {
    host: String,
    x86: Regex,
    arm: Regex,
}

impl ArchPreference {
    pub fn new(host: impl Into<String>) -> ShelfResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| ShelfError::Config(format!("Invalid architecture pattern: {}", e)))
        };
        Ok(Self {
            host: host.into(),
            x86: compile(X86_TOKEN)?,
            arm: compile(ARM_TOKEN)?,
        })
    }

    /// Preference for the architecture this binary was built for
    pub fn detect() -> ShelfResult<Self> {
        Self::new(std::env::consts::ARCH)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Pick one of several matching assets.
    ///
    /// On x86_64 hosts an asset named with an x86 token wins, then any asset
    /// without an ARM token. Everywhere else, and when neither rule applies,
    /// the first candidate is returned.
    pub fn pick<'a, T>(&self, candidates: &'a [T], name: impl Fn(&T) -> &str) -> Option<&'a T> {
        if candidates.len() > 1 && self.host == "x86_64" {
            let preferred = candidates
                .iter()
                .find(|c| self.x86.is_match(name(c)))
                .or_else(|| candidates.iter().find(|c| !self.arm.is_match(name(c))));
            if preferred.is_some() {
                return preferred;
            }
        }
        candidates.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick<'a>(host: &str, names: &'a [&'a str]) -> Option<&'a str> {
        ArchPreference::new(host)
            .unwrap()
            .pick(names, |n| *n)
            .copied()
    }

    #[test]
    fn test_x86_token_preferred() {
        assert_eq!(
            pick("x86_64", &["tool-arm64.AppImage", "tool-amd64.AppImage"]),
            Some("tool-amd64.AppImage")
        );
    }

    #[test]
    fn test_non_arm_fallback() {
        assert_eq!(
            pick("x86_64", &["tool-aarch64.AppImage", "tool.AppImage"]),
            Some("tool.AppImage")
        );
    }

    #[test]
    fn test_first_match_when_no_rule_applies() {
        assert_eq!(
            pick("x86_64", &["tool-armhf.AppImage", "tool-arm64.AppImage"]),
            Some("tool-armhf.AppImage")
        );
        assert_eq!(
            pick("aarch64", &["tool-x86_64.AppImage", "tool-aarch64.AppImage"]),
            Some("tool-x86_64.AppImage")
        );
        assert_eq!(pick("x86_64", &[]), None);
    }
}
