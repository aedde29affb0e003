//! Wire records submitted to the remote ingestion endpoint.
//!
//! Field names are snake_case and `time` is integer seconds since the Unix
//! epoch. Both are a compatibility contract with the endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source tag carried by every record.
pub const RECORD_SOURCE: &str = "health";

/// One normalized sample, ready for JSON encoding.
///
/// `value` is always a string: numeric formatting is decided once, by the
/// record encoder, and nothing downstream interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Server-side category key (e.g. `"pulse"`).
    pub category_name: String,
    /// Always [`RECORD_SOURCE`].
    pub source: String,
    /// Sample (or bucket start) time.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub time: DateTime<Utc>,
    /// Encoded value.
    pub value: String,
}

impl NormalizedRecord {
    /// Creates a record with the fixed source tag.
    pub fn new(
        category_name: impl Into<String>,
        time: DateTime<Utc>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            category_name: category_name.into(),
            source: RECORD_SOURCE.to_string(),
            time,
            value: value.into(),
        }
    }
}

/// Telemetry ping sent after each successful store query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryHandleEvent {
    /// The sample type identifier the query ran for.
    pub category_name: String,
    /// Number of records the query produced.
    pub values_count: usize,
}

impl QueryHandleEvent {
    /// Creates a telemetry event.
    pub fn new(category_name: impl Into<String>, values_count: usize) -> Self {
        Self {
            category_name: category_name.into(),
            values_count,
        }
    }
}
