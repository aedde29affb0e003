//! Descriptors for trackable measurement categories.
//!
//! A descriptor is immutable configuration: which store type to read, which
//! server key to report under, how often the store may wake us, and how raw
//! values become wire strings. Descriptors are cheap to clone (encoders are
//! shared behind `Arc`).

use crate::{Error, Result, SampleTypeId};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Encodes a quantity (already in the descriptor's unit) as a wire string.
pub type QuantityEncoder = Arc<dyn Fn(f64) -> String + Send + Sync>;

/// Encodes a raw enumerated category value. `None` drops the sample.
pub type CategoryEncoder = Arc<dyn Fn(i64) -> Option<String> + Send + Sync>;

/// Default statistics bucket width for quantity types.
pub const DEFAULT_INTERVAL_MINUTES: i64 = 5;

/// Maximum frequency at which the store may deliver background updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateFrequency {
    Immediate,
    Hourly,
    Daily,
    Weekly,
}

impl fmt::Display for UpdateFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Immediate => "immediate",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        };
        f.write_str(s)
    }
}

/// How several raw readings inside one interval collapse into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStyle {
    /// Sum of readings (steps, distance, energy).
    Cumulative,
    /// Arithmetic mean of readings (heart rate, temperature).
    DiscreteAverage,
}

impl AggregationStyle {
    /// Collapses the readings of one interval. Returns `None` for an empty
    /// interval: no readings means no value, not zero.
    #[must_use]
    pub fn aggregate(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let sum: f64 = values.iter().sum();
        match self {
            Self::Cumulative => Some(sum),
            Self::DiscreteAverage => Some(sum / values.len() as f64),
        }
    }
}

/// Configuration for a continuous numeric type, synced as aggregated
/// interval statistics.
#[derive(Clone)]
pub struct QuantityDescriptor {
    identifier: SampleTypeId,
    server_key: String,
    unit: String,
    aggregation: AggregationStyle,
    interval: TimeDelta,
    update_frequency: UpdateFrequency,
    encoder: Option<QuantityEncoder>,
}

impl QuantityDescriptor {
    /// Creates a quantity descriptor with the default five minute interval
    /// and plain number formatting.
    pub fn new(
        identifier: impl Into<SampleTypeId>,
        unit: impl Into<String>,
        server_key: impl Into<String>,
        aggregation: AggregationStyle,
        update_frequency: UpdateFrequency,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            server_key: server_key.into(),
            unit: unit.into(),
            aggregation,
            interval: TimeDelta::minutes(DEFAULT_INTERVAL_MINUTES),
            update_frequency,
            encoder: None,
        }
    }

    /// Sets the statistics bucket width. Must be positive.
    pub fn with_interval(mut self, interval: TimeDelta) -> Result<Self> {
        if interval <= TimeDelta::zero() {
            return Err(Error::InvalidDescriptor(format!(
                "{}: interval must be positive",
                self.identifier
            )));
        }
        self.interval = interval;
        Ok(self)
    }

    /// Sets a custom value encoder.
    #[must_use]
    pub fn with_encoder<F>(mut self, encoder: F) -> Self
    where
        F: Fn(f64) -> String + Send + Sync + 'static,
    {
        self.encoder = Some(Arc::new(encoder));
        self
    }

    pub fn identifier(&self) -> &SampleTypeId {
        &self.identifier
    }

    pub fn server_key(&self) -> &str {
        &self.server_key
    }

    /// Unit the store must express readings in.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn aggregation(&self) -> AggregationStyle {
        self.aggregation
    }

    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    pub fn update_frequency(&self) -> UpdateFrequency {
        self.update_frequency
    }

    pub fn encoder(&self) -> Option<&QuantityEncoder> {
        self.encoder.as_ref()
    }
}

impl fmt::Debug for QuantityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantityDescriptor")
            .field("identifier", &self.identifier)
            .field("server_key", &self.server_key)
            .field("unit", &self.unit)
            .field("aggregation", &self.aggregation)
            .field("interval", &self.interval)
            .field("update_frequency", &self.update_frequency)
            .field("custom_encoder", &self.encoder.is_some())
            .finish()
    }
}

/// Configuration for an enumerated event type, synced incrementally by
/// anchor.
#[derive(Clone)]
pub struct CategoryDescriptor {
    identifier: SampleTypeId,
    server_key: String,
    update_frequency: UpdateFrequency,
    encoder: CategoryEncoder,
}

impl CategoryDescriptor {
    /// Creates a category descriptor. The encoder returns `None` for values
    /// that must not be synced.
    pub fn new<F>(
        identifier: impl Into<SampleTypeId>,
        server_key: impl Into<String>,
        update_frequency: UpdateFrequency,
        encoder: F,
    ) -> Self
    where
        F: Fn(i64) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            identifier: identifier.into(),
            server_key: server_key.into(),
            update_frequency,
            encoder: Arc::new(encoder),
        }
    }

    pub fn identifier(&self) -> &SampleTypeId {
        &self.identifier
    }

    pub fn server_key(&self) -> &str {
        &self.server_key
    }

    pub fn update_frequency(&self) -> UpdateFrequency {
        self.update_frequency
    }

    /// Encodes a raw value, `None` if the value is unmapped.
    pub fn encode(&self, raw: i64) -> Option<String> {
        (self.encoder)(raw)
    }
}

impl fmt::Debug for CategoryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoryDescriptor")
            .field("identifier", &self.identifier)
            .field("server_key", &self.server_key)
            .field("update_frequency", &self.update_frequency)
            .finish_non_exhaustive()
    }
}

/// Which query variant a descriptor syncs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Quantity,
    Category,
}

/// Any trackable sample type.
#[derive(Debug, Clone)]
pub enum SampleTypeDescriptor {
    Quantity(QuantityDescriptor),
    Category(CategoryDescriptor),
}

impl SampleTypeDescriptor {
    /// Stable store type identifier.
    #[must_use]
    pub fn identifier(&self) -> &SampleTypeId {
        match self {
            Self::Quantity(q) => q.identifier(),
            Self::Category(c) => c.identifier(),
        }
    }

    /// Server-side category key.
    #[must_use]
    pub fn server_key(&self) -> &str {
        match self {
            Self::Quantity(q) => q.server_key(),
            Self::Category(c) => c.server_key(),
        }
    }

    /// Background delivery frequency hint.
    #[must_use]
    pub fn update_frequency(&self) -> UpdateFrequency {
        match self {
            Self::Quantity(q) => q.update_frequency(),
            Self::Category(c) => c.update_frequency(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> DescriptorKind {
        match self {
            Self::Quantity(_) => DescriptorKind::Quantity,
            Self::Category(_) => DescriptorKind::Category,
        }
    }
}

impl From<QuantityDescriptor> for SampleTypeDescriptor {
    fn from(d: QuantityDescriptor) -> Self {
        Self::Quantity(d)
    }
}

impl From<CategoryDescriptor> for SampleTypeDescriptor {
    fn from(d: CategoryDescriptor) -> Self {
        Self::Category(d)
    }
}
