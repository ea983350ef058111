pub mod integrate;
pub mod list;
pub mod uninstall;
pub mod updates;

use indicatif::{ProgressBar, ProgressStyle};
use shelf::download::{ProgressCallback, TransferProgress};
use std::sync::Arc;

/// Progress bar for one download, and the callback that drives it
pub fn download_bar(label: &str) -> (ProgressBar, ProgressCallback) {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{msg} [{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message(label.to_string());

    let driven = bar.clone();
    let callback: ProgressCallback = Arc::new(move |progress: TransferProgress| {
        if let Some(total) = progress.total {
            driven.set_length(total);
        }
        driven.set_position(progress.downloaded);
    });
    (bar, callback)
}
