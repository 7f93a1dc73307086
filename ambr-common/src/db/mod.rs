//! SQLite persistence
//!
//! UUIDs and timestamps are stored as TEXT (hyphenated UUIDs, RFC 3339 with
//! microseconds) so rows sort and compare as plain strings.

pub mod books;
pub mod failures;
pub mod init;
pub mod pages;
pub mod progress;
pub mod scenes;
pub mod soundscapes;

pub use failures::{FailureRecord, FailureStage};
pub use init::{create_schema, init_database, init_memory_database};

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::{Error, Result};

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse UUID '{}': {}", value, e)))
}

pub(crate) fn parse_optional_uuid(value: Option<String>) -> Result<Option<Uuid>> {
    value.as_deref().map(parse_uuid).transpose()
}
