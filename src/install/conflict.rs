use crate::bundle::BundleRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How to proceed when a bundle with the same display name is already
/// integrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Uninstall the integrated bundle first
    Replace,
    /// Install alongside it, suffixing the new name with its version
    KeepBoth,
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictResolution::Replace => f.write_str("replace"),
            ConflictResolution::KeepBoth => f.write_str("keep both"),
        }
    }
}

/// Installed bundle sharing `name`, ignoring the one at `except`
pub fn find_conflict<'a>(
    installed: &'a [BundleRecord],
    name: &str,
    except: Option<&std::path::Path>,
) -> Option<&'a BundleRecord> {
    installed
        .iter()
        .find(|record| record.name == name && Some(record.path.as_path()) != except)
}
