use std::path::PathBuf;
use thiserror::Error;

pub type ShelfResult<T> = Result<T, ShelfError>;

#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A request or transfer against a hosting service failed. The update
    /// state is unknown, never "no update".
    #[error("Network error: {0}")]
    Network(String),

    /// A transfer stopped before the advertised length was written, or was
    /// cancelled by the caller.
    #[error("Download {}: {reason}", interruption_kind(.cancelled))]
    DownloadInterrupted { cancelled: bool, reason: String },

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Installation failed: {0}")]
    Installation(String),

    /// Another integrated bundle already uses this display name. The caller
    /// has to choose between replacing it and keeping both.
    #[error("A bundle named '{name}' is already integrated ({})", .existing.display())]
    NameConflict { name: String, existing: PathBuf },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("FTP error: {0}")]
    Ftp(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("WalkDir error: {0}")]
    WalkDir(#[from] walkdir::Error),
}

fn interruption_kind(cancelled: &bool) -> &'static str {
    if *cancelled {
        "cancelled"
    } else {
        "interrupted"
    }
}

impl ShelfError {
    /// True when the error is a user-initiated cancellation, which callers
    /// should not present as a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ShelfError::DownloadInterrupted {
                cancelled: true,
                ..
            }
        )
    }

    /// True for request/transfer failures that may succeed when retried by
    /// the user.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ShelfError::Network(_) | ShelfError::Http(_) | ShelfError::Ftp(_)
        ) || matches!(self, ShelfError::DownloadInterrupted { cancelled: false, .. })
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        ShelfError::DownloadInterrupted {
            cancelled: true,
            reason: reason.into(),
        }
    }

    pub fn interrupted(reason: impl Into<String>) -> Self {
        ShelfError::DownloadInterrupted {
            cancelled: false,
            reason: reason.into(),
        }
    }
}
