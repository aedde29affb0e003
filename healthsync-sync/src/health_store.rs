//! Health data store capability.
//!
//! The on-device store is an external collaborator. The sync core consumes it
//! through [`HealthStore`]: authorize, run one anchored or statistics query,
//! and register change-notification subscriptions. Adapters over
//! callback-based native APIs should bridge each query through
//! [`crate::completion`].

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use healthsync_types::{
    AggregationStyle, AnchorToken, CategorySample, SampleTypeId, SubscriptionId, UpdateFrequency,
};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Result type for health store operations.
pub type HealthStoreResult<T> = Result<T, HealthStoreError>;

/// Errors reported by the health store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthStoreError {
    #[error("authorization session timed out")]
    AuthorizationSessionTimedOut,

    #[error("authorization not determined")]
    AuthorizationNotDetermined,

    #[error("authorization denied")]
    AuthorizationDenied,

    /// Protected data is inaccessible while the device is locked.
    #[error("health database inaccessible")]
    DatabaseInaccessible,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    /// The native callback never resolved the query.
    #[error("query completion dropped without a result")]
    CompletionDropped,

    #[error("{0}")]
    Other(String),
}

/// Predicate applied to store samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFilter {
    /// Inclusive lower bound on sample start.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound on sample start.
    pub end: Option<DateTime<Utc>>,
    /// Samples carrying this metadata key are excluded.
    pub excluded_metadata_key: String,
}

impl SampleFilter {
    /// Excludes tagged samples only; an anchor bounds the result.
    pub fn excluding(excluded_metadata_key: impl Into<String>) -> Self {
        Self {
            start: None,
            end: None,
            excluded_metadata_key: excluded_metadata_key.into(),
        }
    }

    /// Samples starting in `[start, end)` that are not tagged.
    pub fn between(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        excluded_metadata_key: impl Into<String>,
    ) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            excluded_metadata_key: excluded_metadata_key.into(),
        }
    }

    /// Evaluates the predicate against one sample.
    #[must_use]
    pub fn matches(&self, start: DateTime<Utc>, metadata: &HashMap<String, String>) -> bool {
        if self.start.is_some_and(|lower| start < lower) {
            return false;
        }
        if self.end.is_some_and(|upper| start >= upper) {
            return false;
        }
        !metadata.contains_key(&self.excluded_metadata_key)
    }
}

/// One-shot anchored (incremental) query.
#[derive(Debug, Clone)]
pub struct AnchoredQuery {
    pub sample_type: SampleTypeId,
    pub filter: SampleFilter,
    /// `None` on the first run.
    pub anchor: Option<AnchorToken>,
}

/// Result of an anchored query.
#[derive(Debug, Clone, Default)]
pub struct AnchoredQueryResult {
    pub samples: Vec<CategorySample>,
    /// The store may return a fresh anchor even when there are no samples.
    pub new_anchor: Option<AnchorToken>,
}

/// Aggregated statistics query over fixed-width intervals.
#[derive(Debug, Clone)]
pub struct StatisticsQuery {
    pub sample_type: SampleTypeId,
    /// Unit the returned values are expressed in.
    pub unit: String,
    pub filter: SampleFilter,
    pub aggregation: AggregationStyle,
    /// Interval boundaries are aligned to this instant.
    pub anchor_date: DateTime<Utc>,
    pub interval: TimeDelta,
}

/// Statistics for one interval.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsBucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Present for cumulative queries with at least one sample.
    pub sum: Option<f64>,
    /// Present for discrete queries with at least one sample.
    pub average: Option<f64>,
}

impl StatisticsBucket {
    /// Aggregates raw readings the way a statistics query with `style` would.
    #[must_use]
    pub fn aggregate(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        style: AggregationStyle,
        values: &[f64],
    ) -> Self {
        let value = style.aggregate(values);
        let (sum, average) = match style {
            AggregationStyle::Cumulative => (value, None),
            AggregationStyle::DiscreteAverage => (None, value),
        };
        Self {
            start,
            end,
            sum,
            average,
        }
    }

    /// The bucket value for `style`, `None` if no sample contributed.
    #[must_use]
    pub fn value_for(&self, style: AggregationStyle) -> Option<f64> {
        match style {
            AggregationStyle::Cumulative => self.sum,
            AggregationStyle::DiscreteAverage => self.average,
        }
    }
}

/// Result container of a statistics query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsCollection {
    pub buckets: Vec<StatisticsBucket>,
}

/// "Data changed" notification delivered on a subscription.
///
/// Hosts that must tell the OS when background handling is done attach an
/// acknowledgement; the observer fires it once handling (including any fetch)
/// finishes.
#[derive(Debug, Default)]
pub struct ChangeNotification {
    error: Option<HealthStoreError>,
    ack: Option<oneshot::Sender<()>>,
}

impl ChangeNotification {
    /// New data is available.
    #[must_use]
    pub fn changed() -> Self {
        Self::default()
    }

    /// The store reported an error instead of a change.
    #[must_use]
    pub fn failed(error: HealthStoreError) -> Self {
        Self {
            error: Some(error),
            ack: None,
        }
    }

    /// Attaches an acknowledgement and returns the receiving end.
    #[must_use]
    pub fn with_ack(mut self) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        self.ack = Some(tx);
        (self, rx)
    }

    pub fn error(&self) -> Option<&HealthStoreError> {
        self.error.as_ref()
    }

    /// Signals that handling finished.
    pub fn acknowledge(self) {
        if let Some(ack) = self.ack {
            let _ = ack.send(());
        }
    }
}

/// A live change-notification subscription.
#[derive(Debug)]
pub struct ChangeSubscription {
    pub id: SubscriptionId,
    /// Ends when the store cancels the subscription.
    pub notifications: mpsc::UnboundedReceiver<ChangeNotification>,
}

/// The on-device health data store.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Whether health data exists on this device at all.
    fn is_health_data_available(&self) -> bool;

    /// Requests read access. `Ok(false)` means the request could not be shown.
    async fn request_authorization(&self, read_types: &[SampleTypeId]) -> HealthStoreResult<bool>;

    /// Runs one anchored query.
    async fn anchored_query(&self, query: AnchoredQuery) -> HealthStoreResult<AnchoredQueryResult>;

    /// Runs one statistics query. `Ok(None)` means the store produced no
    /// result container, which is distinct from an empty collection.
    async fn statistics_query(
        &self,
        query: StatisticsQuery,
    ) -> HealthStoreResult<Option<StatisticsCollection>>;

    /// Registers a change-notification subscription.
    async fn observe_changes(&self, sample_type: &SampleTypeId)
    -> HealthStoreResult<ChangeSubscription>;

    /// Cancels a subscription. Unknown handles are ignored.
    async fn stop_observing(&self, subscription: SubscriptionId);

    /// Asks the store to wake the host for this type at most once per `frequency`.
    async fn enable_background_delivery(
        &self,
        sample_type: &SampleTypeId,
        frequency: UpdateFrequency,
    ) -> HealthStoreResult<()>;

    async fn disable_background_delivery(&self, sample_type: &SampleTypeId)
    -> HealthStoreResult<()>;
}

/// In-memory health store for tests and dry runs.
pub mod mock {
    use super::*;
    use crate::completion::{self, CompletionHandler};
    use healthsync_types::QuantitySample;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use std::time::Duration;
    use tokio::sync::watch;

    #[derive(Default)]
    struct Inner {
        unavailable: bool,
        authorization: Option<HealthStoreError>,
        category: HashMap<SampleTypeId, Vec<(u64, CategorySample)>>,
        quantity: HashMap<SampleTypeId, Vec<QuantitySample>>,
        next_seq: u64,
        query_error: Option<HealthStoreError>,
        statistics_missing: bool,
        observe_error: Option<HealthStoreError>,
        background_error: Option<HealthStoreError>,
        subscriptions: HashMap<SubscriptionId, (SampleTypeId, mpsc::UnboundedSender<ChangeNotification>)>,
        background: HashMap<SampleTypeId, UpdateFrequency>,
        last_statistics: Option<StatisticsQuery>,
        last_anchored: Option<AnchoredQuery>,
    }

    /// A complete in-memory [`HealthStore`].
    ///
    /// Anchors are sequence numbers of inserted category samples; statistics
    /// are bucketed from raw quantity readings on the requested grid.
    pub struct MockHealthStore {
        inner: Mutex<Inner>,
        paused: watch::Sender<bool>,
        anchored_queries: AtomicUsize,
        statistics_queries: AtomicUsize,
        stop_calls: AtomicUsize,
    }

    impl Default for MockHealthStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockHealthStore {
        pub fn new() -> Self {
            Self {
                inner: Mutex::new(Inner::default()),
                paused: watch::Sender::new(false),
                anchored_queries: AtomicUsize::new(0),
                statistics_queries: AtomicUsize::new(0),
                stop_calls: AtomicUsize::new(0),
            }
        }

        fn inner(&self) -> MutexGuard<'_, Inner> {
            self.inner.lock().unwrap_or_else(PoisonError::into_inner)
        }

        // ── Data ─────────────────────────────────────────────────

        /// Inserts a category sample; it gets the next anchor sequence number.
        pub fn add_category_sample(&self, sample_type: impl Into<SampleTypeId>, sample: CategorySample) {
            let mut inner = self.inner();
            inner.next_seq += 1;
            let seq = inner.next_seq;
            inner
                .category
                .entry(sample_type.into())
                .or_default()
                .push((seq, sample));
        }

        pub fn add_quantity_sample(&self, sample_type: impl Into<SampleTypeId>, sample: QuantitySample) {
            self.inner()
                .quantity
                .entry(sample_type.into())
                .or_default()
                .push(sample);
        }

        /// Encodes a sequence number as an anchor token.
        pub fn anchor_for(seq: u64) -> AnchorToken {
            AnchorToken::new(seq.to_be_bytes().to_vec())
        }

        // ── Behaviour ────────────────────────────────────────────

        pub fn set_health_data_available(&self, available: bool) {
            self.inner().unavailable = !available;
        }

        pub fn fail_authorization(&self, error: Option<HealthStoreError>) {
            self.inner().authorization = error;
        }

        /// Makes every query fail with `error` until cleared.
        pub fn fail_queries(&self, error: Option<HealthStoreError>) {
            self.inner().query_error = error;
        }

        /// Makes statistics queries return no result container.
        pub fn omit_statistics_results(&self, omit: bool) {
            self.inner().statistics_missing = omit;
        }

        pub fn fail_observe(&self, error: Option<HealthStoreError>) {
            self.inner().observe_error = error;
        }

        pub fn fail_background_delivery(&self, error: Option<HealthStoreError>) {
            self.inner().background_error = error;
        }

        /// Holds queries at their start until [`Self::resume_queries`].
        pub fn pause_queries(&self) {
            self.paused.send_replace(true);
        }

        pub fn resume_queries(&self) {
            self.paused.send_replace(false);
        }

        // ── Notifications ────────────────────────────────────────

        /// Delivers a change notification to every subscriber of
        /// `sample_type`; returns one acknowledgement receiver per delivery.
        pub fn notify_change(&self, sample_type: &SampleTypeId) -> Vec<oneshot::Receiver<()>> {
            self.deliver(sample_type, None)
        }

        /// Delivers a notification carrying a store error.
        pub fn notify_error(
            &self,
            sample_type: &SampleTypeId,
            error: HealthStoreError,
        ) -> Vec<oneshot::Receiver<()>> {
            self.deliver(sample_type, Some(error))
        }

        fn deliver(
            &self,
            sample_type: &SampleTypeId,
            error: Option<HealthStoreError>,
        ) -> Vec<oneshot::Receiver<()>> {
            let inner = self.inner();
            let mut acks = Vec::new();
            for (ty, tx) in inner.subscriptions.values() {
                if ty != sample_type {
                    continue;
                }
                let notification = match &error {
                    Some(e) => ChangeNotification::failed(e.clone()),
                    None => ChangeNotification::changed(),
                };
                let (notification, ack) = notification.with_ack();
                if tx.send(notification).is_ok() {
                    acks.push(ack);
                }
            }
            acks
        }

        // ── Inspection ───────────────────────────────────────────

        pub fn anchored_query_count(&self) -> usize {
            self.anchored_queries.load(Ordering::SeqCst)
        }

        pub fn statistics_query_count(&self) -> usize {
            self.statistics_queries.load(Ordering::SeqCst)
        }

        pub fn query_count(&self) -> usize {
            self.anchored_query_count() + self.statistics_query_count()
        }

        pub fn stop_observing_count(&self) -> usize {
            self.stop_calls.load(Ordering::SeqCst)
        }

        pub fn active_subscriptions(&self, sample_type: &SampleTypeId) -> usize {
            self.inner()
                .subscriptions
                .values()
                .filter(|(ty, _)| ty == sample_type)
                .count()
        }

        pub fn background_delivery(&self, sample_type: &SampleTypeId) -> Option<UpdateFrequency> {
            self.inner().background.get(sample_type).copied()
        }

        pub fn last_statistics_query(&self) -> Option<StatisticsQuery> {
            self.inner().last_statistics.clone()
        }

        pub fn last_anchored_query(&self) -> Option<AnchoredQuery> {
            self.inner().last_anchored.clone()
        }

        /// Waits until at least `n` queries have started.
        pub async fn wait_for_queries(&self, n: usize) {
            while self.query_count() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }

        async fn gate(&self) {
            let mut rx = self.paused.subscribe();
            let _ = rx.wait_for(|paused| !*paused).await;
        }

        // ── Callback-style execution ─────────────────────────────

        fn execute_anchored(&self, query: AnchoredQuery, done: CompletionHandler<AnchoredQueryResult>) {
            let mut inner = self.inner();
            inner.last_anchored = Some(query.clone());
            if let Some(err) = inner.query_error.clone() {
                done.fail(err);
                return;
            }

            let after = match &query.anchor {
                None => 0,
                Some(token) => match <[u8; 8]>::try_from(token.as_bytes()) {
                    Ok(bytes) => u64::from_be_bytes(bytes),
                    Err(_) => {
                        done.fail(HealthStoreError::InvalidArgument("malformed anchor".into()));
                        return;
                    }
                },
            };

            let samples = inner
                .category
                .get(&query.sample_type)
                .map(|all| {
                    all.iter()
                        .filter(|(seq, s)| *seq > after && query.filter.matches(s.start, &s.metadata))
                        .map(|(_, s)| s.clone())
                        .collect()
                })
                .unwrap_or_default();

            done.succeed(AnchoredQueryResult {
                samples,
                new_anchor: Some(Self::anchor_for(inner.next_seq.max(after))),
            });
        }

        fn execute_statistics(
            &self,
            query: StatisticsQuery,
            done: CompletionHandler<Option<StatisticsCollection>>,
        ) {
            let mut inner = self.inner();
            inner.last_statistics = Some(query.clone());
            if let Some(err) = inner.query_error.clone() {
                done.fail(err);
                return;
            }
            if inner.statistics_missing {
                done.succeed(None);
                return;
            }
            let interval_ms = query.interval.num_milliseconds();
            if interval_ms <= 0 {
                done.fail(HealthStoreError::InvalidArgument("interval must be positive".into()));
                return;
            }

            let mut grid: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
            if let Some(all) = inner.quantity.get(&query.sample_type) {
                for s in all.iter().filter(|s| query.filter.matches(s.start, &s.metadata)) {
                    let offset = (s.start - query.anchor_date).num_milliseconds();
                    grid.entry(offset.div_euclid(interval_ms))
                        .or_default()
                        .push(s.value);
                }
            }

            // Emit every interval between the first and last populated one,
            // so empty intervals show up as buckets without a value.
            let mut buckets = Vec::new();
            if let (Some(&first), Some(&last)) = (grid.keys().next(), grid.keys().next_back()) {
                for index in first..=last {
                    let start = query.anchor_date + TimeDelta::milliseconds(index * interval_ms);
                    let end = start + query.interval;
                    let values = grid.get(&index).map(Vec::as_slice).unwrap_or(&[]);
                    buckets.push(StatisticsBucket::aggregate(start, end, query.aggregation, values));
                }
            }

            done.succeed(Some(StatisticsCollection { buckets }));
        }
    }

    #[async_trait]
    impl HealthStore for MockHealthStore {
        fn is_health_data_available(&self) -> bool {
            !self.inner().unavailable
        }

        async fn request_authorization(&self, _read_types: &[SampleTypeId]) -> HealthStoreResult<bool> {
            match self.inner().authorization.clone() {
                Some(err) => Err(err),
                None => Ok(true),
            }
        }

        async fn anchored_query(&self, query: AnchoredQuery) -> HealthStoreResult<AnchoredQueryResult> {
            self.anchored_queries.fetch_add(1, Ordering::SeqCst);
            self.gate().await;
            let (done, pending) = completion::channel();
            self.execute_anchored(query, done);
            pending.await
        }

        async fn statistics_query(
            &self,
            query: StatisticsQuery,
        ) -> HealthStoreResult<Option<StatisticsCollection>> {
            self.statistics_queries.fetch_add(1, Ordering::SeqCst);
            self.gate().await;
            let (done, pending) = completion::channel();
            self.execute_statistics(query, done);
            pending.await
        }

        async fn observe_changes(
            &self,
            sample_type: &SampleTypeId,
        ) -> HealthStoreResult<ChangeSubscription> {
            let mut inner = self.inner();
            if let Some(err) = inner.observe_error.clone() {
                return Err(err);
            }
            let (tx, rx) = mpsc::unbounded_channel();
            let id = SubscriptionId::new();
            inner.subscriptions.insert(id, (sample_type.clone(), tx));
            Ok(ChangeSubscription {
                id,
                notifications: rx,
            })
        }

        async fn stop_observing(&self, subscription: SubscriptionId) {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            self.inner().subscriptions.remove(&subscription);
        }

        async fn enable_background_delivery(
            &self,
            sample_type: &SampleTypeId,
            frequency: UpdateFrequency,
        ) -> HealthStoreResult<()> {
            let mut inner = self.inner();
            if let Some(err) = inner.background_error.clone() {
                return Err(err);
            }
            inner.background.insert(sample_type.clone(), frequency);
            Ok(())
        }

        async fn disable_background_delivery(
            &self,
            sample_type: &SampleTypeId,
        ) -> HealthStoreResult<()> {
            let mut inner = self.inner();
            inner.background.remove(sample_type);
            match inner.background_error.clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }
}
