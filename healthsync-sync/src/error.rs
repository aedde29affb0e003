//! Error types for the sync layer.

use crate::cursor_store::CursorStoreError;
use crate::health_store::HealthStoreError;
use crate::transport::TransportError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while syncing one sample type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The user denied read access.
    #[error("authorization denied")]
    AuthorizationDenied,

    /// Authorization has not been determined yet, or the request timed out.
    #[error("authorization indeterminate: {0}")]
    AuthorizationIndeterminate(#[source] HealthStoreError),

    /// Protected data is unavailable (device locked).
    #[error("health data is locked")]
    DataLocked,

    /// The store rejected or failed the query.
    #[error("query failed: {0}")]
    QueryFailed(#[source] HealthStoreError),

    /// The store returned no result container at all.
    #[error("statistics query returned no results")]
    ResultsUnavailable,

    /// No daily anchor boundary could be computed for the bucket grid.
    #[error("failed to compute statistics anchor date")]
    AnchorDateComputationFailed,

    /// Submitting records to the remote endpoint failed.
    #[error("submission failed: {0}")]
    SubmissionFailed(#[source] TransportError),

    /// Persisting the advanced cursor failed.
    #[error("cursor write failed: {0}")]
    StoreWriteFailed(#[source] CursorStoreError),

    /// Reading the persisted cursor failed.
    #[error("cursor read failed: {0}")]
    StoreReadFailed(#[source] CursorStoreError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<HealthStoreError> for SyncError {
    fn from(err: HealthStoreError) -> Self {
        match err {
            HealthStoreError::AuthorizationSessionTimedOut
            | HealthStoreError::AuthorizationNotDetermined => {
                SyncError::AuthorizationIndeterminate(err)
            }
            HealthStoreError::AuthorizationDenied => SyncError::AuthorizationDenied,
            HealthStoreError::DatabaseInaccessible => SyncError::DataLocked,
            other => SyncError::QueryFailed(other),
        }
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        SyncError::SubmissionFailed(err)
    }
}
