//! Export artifact retention.
//!
//! Exports are kept forever unless a maximum age is configured, in which
//! case a periodic sweep deletes artifacts older than that age.

use std::time::{Duration, SystemTime};

/// How long generated export files are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportRetention {
    #[default]
    KeepForever,
    MaxAge(Duration),
}

impl ExportRetention {
    /// Build from an optional number of hours; `None` or `0` keeps forever.
    pub fn from_hours(hours: Option<u64>) -> Self {
        match hours {
            Some(h) if h > 0 => ExportRetention::MaxAge(Duration::from_secs(h * 3600)),
            _ => ExportRetention::KeepForever,
        }
    }

    /// Whether a file last modified at `modified` should be deleted at `now`.
    pub fn is_expired(&self, modified: SystemTime, now: SystemTime) -> bool {
        match self {
            ExportRetention::KeepForever => false,
            ExportRetention::MaxAge(max_age) => now
                .duration_since(modified)
                .map(|age| age > *max_age)
                .unwrap_or(false),
        }
    }
}
