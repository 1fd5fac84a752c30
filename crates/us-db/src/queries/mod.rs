//! Database query modules.

use chrono::{DateTime, SecondsFormat, Utc};

pub mod messages;
pub mod projects;
pub mod steps;

/// Stored timestamps use fixed-width UTC millis so ordering and lease
/// comparisons can be done on the TEXT column.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn now() -> String {
    timestamp(Utc::now())
}
