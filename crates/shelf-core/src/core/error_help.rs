use crate::core::error::ShelfError;

/// Remediation hints shown under an error in the CLI.
pub trait ErrorHelp {
    fn help(&self) -> Option<&'static str>;
}

impl ErrorHelp for ShelfError {
    fn help(&self) -> Option<&'static str> {
        match self {
            ShelfError::Network(_) | ShelfError::Http(_) => Some(
                "Check your network connection and try again. The update state is unknown until a check succeeds.",
            ),
            ShelfError::Ftp(_) => Some("The FTP server may be unreachable or may not allow anonymous login."),
            ShelfError::DownloadInterrupted { cancelled: false, .. } => {
                Some("The transfer ended early. Re-run the command to download again.")
            }
            ShelfError::Extraction(_) => Some(
                "Make sure the file is an executable AppImage bundle and that FUSE is available.",
            ),
            ShelfError::Installation(_) => {
                Some("Check that the bundle, icon and applications directories are writable.")
            }
            ShelfError::NameConflict { .. } => {
                Some("Pass --replace to replace the existing bundle, or answer 'Keep both' when prompted.")
            }
            ShelfError::Config(_) | ShelfError::Yaml(_) => {
                Some("Fix or remove ~/.config/shelf/config.yaml; defaults are recreated on the next run.")
            }
            ShelfError::InvalidArgument(_) => Some("Run `shelf --help` for usage."),
            _ => None,
        }
    }
}

/// Format an error with its hint, if any
pub fn format_error_with_help(err: &ShelfError) -> String {
    match err.help() {
        Some(help) => format!("❌ {}\n   💡 {}", err, help),
        None => format!("❌ {}", err),
    }
}
