//! Raw samples as returned by the health store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A discrete, enumerated event sample (e.g. a menstrual flow entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySample {
    /// Start of the event.
    pub start: DateTime<Utc>,
    /// End of the event.
    pub end: DateTime<Utc>,
    /// Raw enumerated value.
    pub value: i64,
    /// Store metadata attached by the writing app.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CategorySample {
    /// Creates an instantaneous sample with no metadata.
    #[must_use]
    pub fn new(start: DateTime<Utc>, value: i64) -> Self {
        Self {
            start,
            end: start,
            value,
            metadata: HashMap::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the sample carries the given metadata key.
    #[must_use]
    pub fn has_metadata(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }
}

/// A continuous numeric reading, already expressed in the unit it was
/// requested in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantitySample {
    /// Start of the measurement.
    pub start: DateTime<Utc>,
    /// End of the measurement.
    pub end: DateTime<Utc>,
    /// Reading.
    pub value: f64,
    /// Store metadata attached by the writing app.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl QuantitySample {
    /// Creates an instantaneous reading with no metadata.
    #[must_use]
    pub fn new(start: DateTime<Utc>, value: f64) -> Self {
        Self {
            start,
            end: start,
            value,
            metadata: HashMap::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the sample carries the given metadata key.
    #[must_use]
    pub fn has_metadata(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }
}
