//! Migration evidence from controller metrics
//!
//! The two counter patterns are checked independently; any matching line
//! counts as "invoked", no numeric threshold.

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationSignal {
    pub csi_path_invoked: bool,
    pub legacy_path_invoked: bool,
}

pub fn scan_signal(body: &str, csi: &Regex, legacy: &Regex) -> MigrationSignal {
    MigrationSignal {
        csi_path_invoked: body.lines().any(|line| csi.is_match(line)),
        legacy_path_invoked: body.lines().any(|line| legacy.is_match(line)),
    }
}
