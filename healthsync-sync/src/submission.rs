//! Submission client for the ingestion endpoint.

use crate::error::{SyncError, SyncResult};
use crate::transport::UploadTransport;
use healthsync_types::{NormalizedRecord, QueryHandleEvent};
use std::sync::Arc;
use tracing::debug;

/// Path receiving record batches.
pub const SAMPLE_PATH: &str = "/sample/";

/// Path receiving query telemetry.
pub const QUERY_HANDLE_EVENT_PATH: &str = "/query_handle_event/";

/// Posts record batches and telemetry as JSON.
#[derive(Clone)]
pub struct SubmissionClient {
    transport: Arc<dyn UploadTransport>,
}

impl SubmissionClient {
    pub fn new(transport: Arc<dyn UploadTransport>) -> Self {
        Self { transport }
    }

    /// Submits a batch as one JSON array. An empty batch succeeds without
    /// any request.
    pub async fn submit(&self, records: &[NormalizedRecord]) -> SyncResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_vec(records)?;
        self.transport
            .post_json(SAMPLE_PATH, body)
            .await
            .map_err(SyncError::SubmissionFailed)?;
        debug!("Submitted {} records", records.len());
        Ok(())
    }

    /// Reports that a query for a sample type finished.
    pub async fn report_query_handled(&self, event: &QueryHandleEvent) -> SyncResult<()> {
        let body = serde_json::to_vec(event)?;
        self.transport
            .post_json(QUERY_HANDLE_EVENT_PATH, body)
            .await
            .map_err(SyncError::SubmissionFailed)
    }
}

impl std::fmt::Debug for SubmissionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionClient").finish_non_exhaustive()
    }
}
