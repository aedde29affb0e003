//! Per-sample-type sync progress markers.
//!
//! A cursor is either a plain time lower bound (aggregated quantity types) or
//! an opaque, store-issued anchor token (anchored category types). Which one is
//! valid depends on the query variant the sample type uses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque incremental-change marker issued by the health store.
///
/// The bytes are never interpreted by the sync core; they are persisted as-is
/// and handed back to the store on the next anchored query.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorToken(Vec<u8>);

impl AnchorToken {
    /// Wraps raw anchor bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw anchor bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the token and returns the raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Number of bytes in the token.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the token carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AnchorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnchorToken({} bytes)", self.0.len())
    }
}

/// The sync progress marker for one sample type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum SyncCursor {
    /// Lower time bound for time-windowed queries.
    Timestamp(DateTime<Utc>),
    /// Store-specific incremental-change marker.
    Anchor(AnchorToken),
}

impl SyncCursor {
    /// Returns the timestamp if this is a timestamp cursor.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            Self::Anchor(_) => None,
        }
    }

    /// Returns the anchor if this is an anchor cursor.
    #[must_use]
    pub fn as_anchor(&self) -> Option<&AnchorToken> {
        match self {
            Self::Anchor(a) => Some(a),
            Self::Timestamp(_) => None,
        }
    }

    /// Short name of the cursor kind, used in logs and persistence.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timestamp(_) => "timestamp",
            Self::Anchor(_) => "anchor",
        }
    }
}

impl From<DateTime<Utc>> for SyncCursor {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<AnchorToken> for SyncCursor {
    fn from(a: AnchorToken) -> Self {
        Self::Anchor(a)
    }
}
