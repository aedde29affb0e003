//! Error classification for everything that talks to the store or network.
//!
//! Failures fall into three buckets:
//! - expected authorization states (session timeout, not determined): warn only
//! - data locked: logged locally at error level, never captured
//! - everything else: logged and forwarded to the [`ErrorSink`]

use crate::error::SyncError;
use std::sync::Arc;
use tracing::{error, warn};

/// Which handling bucket an error falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Recoverable and user-actionable; never a hard failure.
    Expected,
    /// Store is protected; retry later.
    Locked,
    /// Anything else; captured to the error tracker.
    Unexpected,
}

impl SyncError {
    /// Returns the handling bucket for this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::AuthorizationIndeterminate(_) => ErrorClass::Expected,
            SyncError::DataLocked => ErrorClass::Locked,
            _ => ErrorClass::Unexpected,
        }
    }
}

/// External error tracker.
pub trait ErrorSink: Send + Sync {
    /// Records an unexpected error with a context message.
    fn capture(&self, error: &(dyn std::error::Error + 'static), message: &str);
}

/// Error sink that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlySink;

impl ErrorSink for LogOnlySink {
    fn capture(&self, error: &(dyn std::error::Error + 'static), message: &str) {
        error!("CAPTURED ERROR: {}: {}", message, error);
    }
}

/// Classifies errors, logs them and forwards unexpected ones to the sink.
#[derive(Clone)]
pub struct ErrorHandler {
    sink: Arc<dyn ErrorSink>,
}

impl ErrorHandler {
    /// Creates a handler that forwards unexpected errors to `sink`.
    pub fn new(sink: Arc<dyn ErrorSink>) -> Self {
        Self { sink }
    }

    /// Creates a handler backed by [`LogOnlySink`].
    pub fn log_only() -> Self {
        Self::new(Arc::new(LogOnlySink))
    }

    /// Handles an error raised while doing `context`. Returns the bucket it
    /// was handled as.
    pub fn handle(&self, err: &SyncError, context: &str) -> ErrorClass {
        let class = err.class();
        match class {
            ErrorClass::Expected => {
                warn!("{}: {}", context, err);
            }
            ErrorClass::Locked => {
                error!(
                    "{}: health data is unavailable because it is protected and the device is locked",
                    context
                );
            }
            ErrorClass::Unexpected => {
                error!("{}: {}", context, err);
                self.sink.capture(err, context);
            }
        }
        class
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::log_only()
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler").finish_non_exhaustive()
    }
}
