pub mod parse;

use std::fs::Metadata;
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime};

use crate::config::TimePolicy;

pub use parse::parse_datetime;

/// Filesystem timestamps of one file, in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsTimes {
    /// Not every platform/filesystem records a birth time.
    pub created: Option<NaiveDateTime>,
    pub modified: NaiveDateTime,
}

impl FsTimes {
    pub fn from_metadata(meta: &Metadata) -> Self {
        let created = meta.created().ok().map(to_local);
        let modified = meta
            .modified()
            .ok()
            .map(to_local)
            .or(created)
            .unwrap_or_else(|| Local::now().naive_local());
        Self { created, modified }
    }
}

fn to_local(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

/// Pick the authoritative timestamp for a file.
///
/// When the preferred source is missing, the earliest available timestamp
/// wins; the modify time is always available, so a value is always returned.
pub fn resolve(
    capture: Option<NaiveDateTime>,
    created: Option<NaiveDateTime>,
    modified: NaiveDateTime,
    policy: TimePolicy,
) -> NaiveDateTime {
    let preferred = match policy {
        TimePolicy::Capture => capture,
        TimePolicy::Create => created,
        TimePolicy::Modify => Some(modified),
        TimePolicy::Earliest => None,
    };
    preferred.unwrap_or_else(|| {
        [capture, created]
            .into_iter()
            .flatten()
            .fold(modified, |earliest, t| earliest.min(t))
    })
}
