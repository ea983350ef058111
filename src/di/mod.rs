//! Dependency injection infrastructure for Shelf
//!
//! The mount helper and the desktop application database are the two
//! collaborators that touch the running system. They sit behind traits so
//! extraction and installation can be exercised against fixture trees.
//!
//! # Example (Production)
//! ```no_run
//! use shelf::di::ServiceContainer;
//!
//! # fn example() -> shelf::core::ShelfResult<()> {
//! let container = ServiceContainer::new()?;
//! let pipeline = container.pipeline()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example (Testing)
//! ```
//! use shelf::config::Config;
//! use shelf::di::{ServiceContainer, mocks::*};
//! use std::sync::Arc;
//!
//! let mounter = Arc::new(FixtureMounter::new("/tmp/fixture-root"));
//! let registry = Arc::new(RecordingRegistry::new());
//! let container = ServiceContainer::with_providers(Config::default(), mounter, registry);
//! ```

pub mod container;
pub mod mocks;
pub mod traits;

// Re-export key types
pub use container::ServiceContainer;
pub use traits::{DesktopRegistry, MountedImage, Mounter};
