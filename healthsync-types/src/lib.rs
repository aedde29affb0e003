//! Core type definitions for HealthSync.
//!
//! This crate defines the plain data shared by the sync engine:
//! - Sample type descriptors (what to read, how to encode it)
//! - Sync cursors (timestamp lower bounds and opaque store anchors)
//! - Raw store samples and normalized wire records
//! - Subscription handles
//!
//! Nothing here performs I/O.

mod cursor;
mod descriptor;
mod ids;
mod record;
mod sample;

pub use cursor::{AnchorToken, SyncCursor};
pub use descriptor::{
    AggregationStyle, CategoryDescriptor, CategoryEncoder, DEFAULT_INTERVAL_MINUTES,
    DescriptorKind, QuantityDescriptor, QuantityEncoder, SampleTypeDescriptor, UpdateFrequency,
};
pub use ids::{SampleTypeId, SubscriptionId};
pub use record::{NormalizedRecord, QueryHandleEvent, RECORD_SOURCE};
pub use sample::{CategorySample, QuantitySample};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
}
