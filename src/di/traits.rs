//! Trait definitions for dependency injection

use crate::core::ShelfResult;
use std::path::Path;

/// Mounts a bundle image as a read-only filesystem
///
/// Implementations must be thread-safe (Send + Sync); a single mounter is
/// shared by every extraction.
pub trait Mounter: Send + Sync {
    /// Mount `image` and return a handle to the mounted tree
    fn mount(&self, image: &Path) -> ShelfResult<Box<dyn MountedImage>>;
}

/// A mounted bundle image
pub trait MountedImage: Send {
    /// Root of the mounted filesystem
    fn root(&self) -> &Path;

    /// Tear the mount down
    fn unmount(self: Box<Self>) -> ShelfResult<()>;
}

/// The desktop's application database
pub trait DesktopRegistry: Send + Sync {
    /// Make a newly written manifest visible in the application menu
    fn register(&self, manifest: &Path) -> ShelfResult<()>;

    /// Refresh the menu after a manifest was removed
    fn unregister(&self, manifest: &Path) -> ShelfResult<()>;
}
