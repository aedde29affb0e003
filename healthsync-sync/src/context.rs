//! Shared collaborators of every observer.

use crate::classifier::{ErrorHandler, ErrorSink};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::cursor_store::CursorStore;
use crate::device::{AlwaysAvailable, DeviceState};
use crate::error::{SyncError, SyncResult};
use crate::health_store::HealthStore;
use crate::submission::SubmissionClient;
use crate::transport::{HttpTransport, UploadTransport};
use std::sync::Arc;

/// Everything an observer needs besides its descriptor.
pub struct SyncContext {
    config: SyncConfig,
    health_store: Arc<dyn HealthStore>,
    cursors: Arc<dyn CursorStore>,
    submission: SubmissionClient,
    clock: Arc<dyn Clock>,
    device: Arc<dyn DeviceState>,
    errors: ErrorHandler,
}

impl SyncContext {
    /// Creates a context with the wall clock, no device lock, and a log-only
    /// error sink.
    pub fn new(
        config: SyncConfig,
        health_store: Arc<dyn HealthStore>,
        cursors: Arc<dyn CursorStore>,
        transport: Arc<dyn UploadTransport>,
    ) -> Self {
        Self {
            config,
            health_store,
            cursors,
            submission: SubmissionClient::new(transport),
            clock: Arc::new(SystemClock),
            device: Arc::new(AlwaysAvailable),
            errors: ErrorHandler::log_only(),
        }
    }

    /// Validates `config` and creates a context that submits over HTTP.
    pub fn http(
        config: SyncConfig,
        health_store: Arc<dyn HealthStore>,
        cursors: Arc<dyn CursorStore>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config).map_err(|e| SyncError::Config(e.to_string()))?;
        Ok(Self::new(config, health_store, cursors, Arc::new(transport)))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_device_state(mut self, device: Arc<dyn DeviceState>) -> Self {
        self.device = device;
        self
    }

    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.errors = ErrorHandler::new(sink);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn health_store(&self) -> &dyn HealthStore {
        self.health_store.as_ref()
    }

    pub fn cursors(&self) -> &dyn CursorStore {
        self.cursors.as_ref()
    }

    pub fn submission(&self) -> &SubmissionClient {
        &self.submission
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn device(&self) -> &dyn DeviceState {
        self.device.as_ref()
    }

    pub fn errors(&self) -> &ErrorHandler {
        &self.errors
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
