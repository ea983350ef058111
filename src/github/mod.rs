//! GitHub releases API
//!
//! This module provides:
//! - A rate-limit aware client for the releases endpoints
//! - Release and asset types, shared with the Gitea-compatible forge APIs

pub mod client;
pub mod types;

pub use client::GitHubClient;
pub use types::{Release, ReleaseAsset};
