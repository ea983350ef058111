//! Integration tests for the `shelf` CLI
//!
//! Every test points the XDG directories and HOME at a temp dir, so the
//! binary never touches the real desktop.

mod common;
mod integrate;
mod list;
mod uninstall;
mod updates;
