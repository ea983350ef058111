//! Coalesced transfer progress.

use std::sync::Arc;

/// Progress of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub downloaded: u64,
    /// Advertised length, when the server sent one
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Completed fraction in `0.0..=1.0`, when the total is known
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some((self.downloaded as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }

    /// Whole percent completed, when the total is known
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(total) if total > 0 => {
                Some((self.downloaded.saturating_mul(100) / total).min(100) as u8)
            }
            _ => None,
        }
    }
}

/// Observer invoked as a transfer advances
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Bytes between reports when the total length is unknown
const UNKNOWN_LENGTH_STEP: u64 = 1024 * 1024;

/// Forwards progress to a callback, at most once per whole percent
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    total: Option<u64>,
    last_percent: Option<u8>,
    last_reported: u64,
}

impl ProgressReporter {
    pub fn new(total: Option<u64>, callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            total: total.filter(|t| *t > 0),
            last_percent: None,
            last_reported: 0,
        }
    }

    /// Record that `downloaded` bytes have been received so far
    pub fn advance(&mut self, downloaded: u64) {
        let progress = TransferProgress {
            downloaded,
            total: self.total,
        };

        let due = match progress.percent() {
            Some(percent) => self.last_percent.map_or(true, |last| percent > last),
            None => downloaded >= self.last_reported + UNKNOWN_LENGTH_STEP,
        };

        if due {
            self.emit(progress);
        }
    }

    /// Report the final state of a complete transfer
    pub fn finish(&mut self, downloaded: u64) {
        let progress = TransferProgress {
            downloaded,
            total: self.total.or(Some(downloaded)),
        };
        if self.last_percent != Some(100) {
            self.emit(progress);
        }
    }

    fn emit(&mut self, progress: TransferProgress) {
        self.last_percent = progress.percent();
        self.last_reported = progress.downloaded;
        if let Some(callback) = &self.callback {
            callback(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<TransferProgress>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p));
        (callback, seen)
    }

    #[test]
    fn test_reports_are_coalesced_to_whole_percent() {
        let (callback, seen) = recorder();
        let mut reporter = ProgressReporter::new(Some(10_000), Some(callback));

        for downloaded in (0..=10_000).step_by(10) {
            reporter.advance(downloaded);
        }
        reporter.finish(10_000);

        let seen = seen.lock().unwrap();
        // 0%..=100%, one report each
        assert_eq!(seen.len(), 101);
        let percents: Vec<u8> = seen.iter().filter_map(|p| p.percent()).collect();
        assert!(percents.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn test_unknown_total_reports_by_volume() {
        let (callback, seen) = recorder();
        let mut reporter = ProgressReporter::new(None, Some(callback));

        for downloaded in (0..=(3 * UNKNOWN_LENGTH_STEP)).step_by(4096) {
            reporter.advance(downloaded);
        }
        reporter.finish(3 * UNKNOWN_LENGTH_STEP);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen.last().unwrap().percent(), Some(100));
    }

    #[test]
    fn test_fraction() {
        let progress = TransferProgress {
            downloaded: 250,
            total: Some(1000),
        };
        assert_eq!(progress.fraction(), Some(0.25));
        assert_eq!(progress.percent(), Some(25));

        let unknown = TransferProgress {
            downloaded: 250,
            total: None,
        };
        assert_eq!(unknown.fraction(), None);
    }
}
