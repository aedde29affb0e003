//! Shared test helpers for sync tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use healthsync_sync::health_store::mock::MockHealthStore;
use healthsync_sync::transport::mock::MockTransport;
use healthsync_sync::{
    CursorStore, CursorStoreError, CursorStoreResult, ErrorSink, FixedClock, MemoryCursorStore,
    SyncConfig, SyncContext,
};
use healthsync_types::{
    AggregationStyle, CategoryDescriptor, QuantityDescriptor, SyncCursor, UpdateFrequency,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

pub const HEART_RATE: &str = "HKQuantityTypeIdentifierHeartRate";
pub const STEPS: &str = "HKQuantityTypeIdentifierStepCount";
pub const SLEEP: &str = "HKCategoryTypeIdentifierSleepAnalysis";

/// Routes `tracing` output to the test harness; filter with `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// 2026-03-10T12:00:00Z, well past the default origin.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

pub fn heart_rate() -> QuantityDescriptor {
    QuantityDescriptor::new(
        HEART_RATE,
        "count/min",
        "pulse",
        AggregationStyle::DiscreteAverage,
        UpdateFrequency::Immediate,
    )
}

pub fn steps() -> QuantityDescriptor {
    QuantityDescriptor::new(
        STEPS,
        "count",
        "steps",
        AggregationStyle::Cumulative,
        UpdateFrequency::Hourly,
    )
}

/// Sleep analysis: 0 = in bed, 1 = asleep, anything else is unmapped.
pub fn sleep() -> CategoryDescriptor {
    CategoryDescriptor::new(SLEEP, "sleep", UpdateFrequency::Immediate, |raw| match raw {
        0 => Some("in_bed".to_string()),
        1 => Some("asleep".to_string()),
        _ => None,
    })
}

/// Config pinned to UTC so statistics anchors are deterministic.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        utc_offset_minutes: Some(0),
        ..Default::default()
    }
}

/// Error sink that remembers every capture.
#[derive(Debug, Default)]
pub struct RecordingSink {
    captured: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn captured(&self) -> Vec<String> {
        self.captured.lock().unwrap().clone()
    }
}

impl ErrorSink for RecordingSink {
    fn capture(&self, error: &(dyn std::error::Error + 'static), message: &str) {
        self.captured
            .lock()
            .unwrap()
            .push(format!("{message}: {error}"));
    }
}

/// Memory cursor store whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyCursorStore {
    inner: MemoryCursorStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl FlakyCursorStore {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CursorStore for FlakyCursorStore {
    async fn get(&self, key: &str) -> CursorStoreResult<Option<SyncCursor>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CursorStoreError::Unavailable("reads disabled".into()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, cursor: SyncCursor) -> CursorStoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CursorStoreError::Unavailable("writes disabled".into()));
        }
        self.inner.set(key, cursor).await
    }
}

/// Every collaborator of a sync context, kept for inspection.
pub struct Harness {
    pub store: Arc<MockHealthStore>,
    pub cursors: Arc<FlakyCursorStore>,
    pub transport: Arc<MockTransport>,
    pub clock: Arc<FixedClock>,
    pub sink: Arc<RecordingSink>,
    pub config: SyncConfig,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        init_tracing();
        Self {
            store: Arc::new(MockHealthStore::new()),
            cursors: Arc::new(FlakyCursorStore::default()),
            transport: Arc::new(MockTransport::new()),
            clock: Arc::new(FixedClock::new(now())),
            sink: Arc::new(RecordingSink::default()),
            config,
        }
    }

    pub fn context(&self) -> SyncContext {
        SyncContext::new(
            self.config.clone(),
            self.store.clone(),
            self.cursors.clone(),
            self.transport.clone(),
        )
        .with_clock(self.clock.clone())
        .with_error_sink(self.sink.clone())
    }

    pub fn cursor_key(&self, identifier: &str) -> String {
        self.config.cursor_key(&identifier.into())
    }

    pub async fn cursor(&self, identifier: &str) -> Option<SyncCursor> {
        self.cursors.get(&self.cursor_key(identifier)).await.unwrap()
    }

    pub async fn set_cursor(&self, identifier: &str, cursor: SyncCursor) {
        self.cursors
            .set(&self.cursor_key(identifier), cursor)
            .await
            .unwrap();
    }

    pub fn advance(&self, by: TimeDelta) {
        self.clock.advance(by);
    }
}
