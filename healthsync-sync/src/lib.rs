//! Incremental health-sample sync for HealthSync.
//!
//! Reads new samples from the on-device health store, normalizes them into
//! wire records, submits them to the ingestion endpoint, and advances a
//! per-sample-type cursor only once the submission succeeded.
//!
//! # Architecture
//!
//! ## Components
//!
//! - **Health store**: the on-device data source, behind [`HealthStore`]
//! - **Cursor store**: persisted sync progress per sample type
//! - **Query**: anchored (category) and statistics (quantity) queries
//! - **Encoder**: samples to [`healthsync_types::NormalizedRecord`]s
//! - **Submission**: JSON batches over an [`UploadTransport`]
//! - **Observer**: per-type fetch lock, subscription and cursor handling
//! - **Service**: fans operations out across every configured type
//!
//! ## Sync Process
//!
//! 1. **Notify**: the store signals a change (or the host calls `fetch_samples`)
//! 2. **Lock**: the observer takes its fetch lock; concurrent fetches return early
//! 3. **Query**: read from the persisted cursor, capped to the backlog window
//! 4. **Submit**: post the encoded batch; empty batches are never posted
//! 5. **Advance**: persist the new cursor only after a successful submit
//!
//! # Example
//!
//! ```
//! use healthsync_sync::{
//!     HealthSyncService, MemoryCursorStore, SyncConfig, SyncContext,
//!     health_store::mock::MockHealthStore, transport::mock::MockTransport,
//! };
//! use healthsync_types::{CategoryDescriptor, SampleTypeDescriptor, UpdateFrequency};
//! use std::sync::Arc;
//!
//! let ctx = SyncContext::new(
//!     SyncConfig::default(),
//!     Arc::new(MockHealthStore::new()),
//!     Arc::new(MemoryCursorStore::new()),
//!     Arc::new(MockTransport::new()),
//! );
//! let sleep = CategoryDescriptor::new(
//!     "HKCategoryTypeIdentifierSleepAnalysis",
//!     "sleep",
//!     UpdateFrequency::Hourly,
//!     |raw| Some(raw.to_string()),
//! );
//! let service = HealthSyncService::new(ctx, [SampleTypeDescriptor::from(sleep)]);
//! assert_eq!(service.descriptors().len(), 1);
//! ```

pub mod classifier;
pub mod clock;
pub mod completion;
pub mod config;
mod context;
pub mod cursor_store;
pub mod device;
pub mod encoder;
mod error;
pub mod health_store;
mod observer;
pub mod query;
mod service;
pub mod submission;
pub mod transport;
pub mod window;

pub use classifier::{ErrorClass, ErrorHandler, ErrorSink, LogOnlySink};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{SyncConfig, cursor_key};
pub use context::SyncContext;
pub use cursor_store::{
    CursorStore, CursorStoreError, CursorStoreResult, MemoryCursorStore, SqliteCursorStore,
};
pub use device::{AlwaysAvailable, DeviceState, ProtectedDataFlag};
pub use error::{SyncError, SyncResult};
pub use health_store::{
    ChangeNotification, ChangeSubscription, HealthStore, HealthStoreError, HealthStoreResult,
};
pub use observer::{FetchOutcome, FetchReport, NotificationOutcome, Observer};
pub use service::HealthSyncService;
pub use submission::{QUERY_HANDLE_EVENT_PATH, SAMPLE_PATH, SubmissionClient};
pub use transport::{HttpTransport, TransportError, TransportResult, UploadTransport};
