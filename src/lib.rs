//! Shelf: desktop integration and updates for self-contained application
//! bundles.
//!
//! This crate re-exports core functionality from `shelf-core` and organizes
//! the modules that discover, update, download and integrate bundles.

pub use shelf_core::{format_error_with_help, ErrorHelp, ShelfError, ShelfResult};

/// Core module re-exported from `shelf-core`.
pub mod core {
    pub use shelf_core::core::*;
    pub use shelf_core::*;

    /// Path module re-exported from shelf-core.
    pub mod path {
        pub use shelf_core::core::path::*;
    }
}

/// Global configuration and per-bundle settings.
pub mod config;

/// Content hashing.
pub mod checksum;

/// Bundle records, manifests, embedded metadata and extraction.
pub mod bundle;

/// GitHub releases API client.
pub mod github;

/// Update-source resolvers and dispatch.
pub mod update;

/// Byte transfer for resolved assets.
pub mod download;

/// Integration into (and removal from) the application menu.
pub mod install;

/// Dependency injection infrastructure.
pub mod di;
