//! Core utilities shared by the Shelf crates: the error type, error help
//! text and platform directory helpers.

pub mod core;

pub use core::error::{ShelfError, ShelfResult};
pub use core::error_help::{format_error_with_help, ErrorHelp};
