//! Sync configuration.
//!
//! Everything that used to be a process-wide constant (the default origin,
//! the backlog window, the endpoint) lives here and is passed in at
//! construction so the core stays testable with injected clocks and origins.

use crate::error::{SyncError, SyncResult};
use crate::window::Calendar;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use healthsync_types::SampleTypeId;
use serde::{Deserialize, Serialize};

/// Default origin: 2024-01-30T00:00:00Z.
pub const DEFAULT_ORIGIN_EPOCH_SECS: i64 = 1_706_572_800;

/// Default backlog window.
pub const DEFAULT_MAX_BACKLOG_DAYS: i64 = 14;

/// Upper bound on the backlog window (about a century).
pub const MAX_BACKLOG_DAYS: i64 = 36_500;

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the ingestion endpoint (e.g. `https://ingest.example.com`).
    pub endpoint_base_url: String,
    /// Per-request transport timeout in seconds.
    pub request_timeout_secs: u64,
    /// Never sync samples older than this.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub default_origin: DateTime<Utc>,
    /// Never sync more than this many days of backlog.
    pub max_backlog_days: i64,
    /// Local hour of the daily statistics anchor.
    pub anchor_hour: u32,
    /// Calendar offset for the statistics anchor; `None` uses device local time.
    pub utc_offset_minutes: Option<i32>,
    /// Samples carrying this metadata key are never synced.
    pub excluded_metadata_key: String,
    /// Prefix of persisted cursor keys.
    pub cursor_key_prefix: String,
    /// Whether to post a `query_handle_event` after every successful query.
    pub report_query_events: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint_base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_secs: 60,
            default_origin: DateTime::<Utc>::UNIX_EPOCH
                + TimeDelta::seconds(DEFAULT_ORIGIN_EPOCH_SECS),
            max_backlog_days: DEFAULT_MAX_BACKLOG_DAYS,
            anchor_hour: 3,
            utc_offset_minutes: None,
            excluded_metadata_key: "HEALTH_SYNC_EXCLUDED".to_string(),
            cursor_key_prefix: "HealthSync".to_string(),
            report_query_events: true,
        }
    }
}

impl SyncConfig {
    /// Parses a (possibly partial) JSON configuration and validates it.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the engine cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.endpoint_base_url.trim().is_empty() {
            return Err(SyncError::Config("endpoint_base_url is empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(SyncError::Config("request_timeout_secs must be positive".into()));
        }
        if self.max_backlog_days <= 0 || self.max_backlog_days > MAX_BACKLOG_DAYS {
            return Err(SyncError::Config(format!(
                "max_backlog_days must be in 1..={MAX_BACKLOG_DAYS}, got {}",
                self.max_backlog_days
            )));
        }
        if self.anchor_hour >= 24 {
            return Err(SyncError::Config(format!(
                "anchor_hour must be in 0..24, got {}",
                self.anchor_hour
            )));
        }
        if let Some(minutes) = self.utc_offset_minutes {
            if offset_from_minutes(minutes).is_none() {
                return Err(SyncError::Config(format!(
                    "utc_offset_minutes out of range: {minutes}"
                )));
            }
        }
        Ok(())
    }

    /// The backlog window as a duration. Saturates for unvalidated values
    /// outside the representable range.
    #[must_use]
    pub fn max_backlog(&self) -> TimeDelta {
        TimeDelta::try_days(self.max_backlog_days).unwrap_or(TimeDelta::MAX)
    }

    /// Persisted cursor key for a sample type.
    #[must_use]
    pub fn cursor_key(&self, identifier: &SampleTypeId) -> String {
        cursor_key(&self.cursor_key_prefix, identifier)
    }

    /// Calendar the statistics anchor is computed in: the configured fixed
    /// offset, or device local time (with its DST rules) when unset.
    #[must_use]
    pub fn calendar(&self) -> Calendar {
        match self.utc_offset_minutes.and_then(offset_from_minutes) {
            Some(offset) => Calendar::Fixed(offset),
            None => Calendar::Local,
        }
    }
}

/// Derives the cursor key for a sample type: `{prefix}_{identifier}_Cursor`.
#[must_use]
pub fn cursor_key(prefix: &str, identifier: &SampleTypeId) -> String {
    format!("{prefix}_{identifier}_Cursor")
}

fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}
