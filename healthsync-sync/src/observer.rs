//! Per-sample-type sync orchestration.
//!
//! An [`Observer`] owns one sample type: its fetch lock, its change
//! subscription, and the read-modify-write of its cursor. Observers never
//! share locks, so different sample types sync fully concurrently.
//!
//! A cursor is advanced only after the batch it covers was submitted, or for
//! category types after the anchored query itself succeeded with nothing to
//! submit.

use crate::classifier::ErrorClass;
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::health_store::{ChangeNotification, ChangeSubscription};
use crate::query::{AnchoredSampleQuery, CategoryStart, StatisticsSampleQuery};
use crate::window;
use chrono::{DateTime, Utc};
use healthsync_types::{
    CategoryDescriptor, QuantityDescriptor, QueryHandleEvent, SampleTypeDescriptor, SampleTypeId,
    SubscriptionId, SyncCursor,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// What one `fetch_samples` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Another fetch held the lock; nothing was done.
    AlreadyInProgress,
    Completed(FetchReport),
    /// The attempt failed and the error was handled as this class.
    Failed(ErrorClass),
}

impl FetchOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, FetchOutcome::Completed(_))
    }

    #[must_use]
    pub fn report(&self) -> Option<FetchReport> {
        match self {
            FetchOutcome::Completed(report) => Some(*report),
            _ => None,
        }
    }
}

/// Summary of a completed fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Records (or samples, for category types) the query returned.
    pub fetched: usize,
    /// Records submitted to the endpoint.
    pub submitted: usize,
    pub cursor_advanced: bool,
}

/// What handling one change notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Fetched(FetchOutcome),
    /// The notification carried a store error.
    StoreError(ErrorClass),
    /// Protected data was unavailable; the fetch was skipped.
    DeviceLocked,
}

struct ActiveSubscription {
    id: SubscriptionId,
    listener: JoinHandle<()>,
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Holds the fetch lock; releases it on every exit path.
struct FetchGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FetchGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Syncs one sample type.
pub struct Observer {
    descriptor: SampleTypeDescriptor,
    cursor_key: String,
    ctx: Arc<SyncContext>,
    fetching: AtomicBool,
    subscription: Mutex<Option<ActiveSubscription>>,
    /// Reachable without awaiting, so teardown from `Drop` always works.
    listener_abort: std::sync::Mutex<Option<AbortHandle>>,
}

impl Observer {
    pub fn new(descriptor: SampleTypeDescriptor, ctx: Arc<SyncContext>) -> Self {
        let cursor_key = ctx.config().cursor_key(descriptor.identifier());
        Self {
            descriptor,
            cursor_key,
            ctx,
            fetching: AtomicBool::new(false),
            subscription: Mutex::new(None),
            listener_abort: std::sync::Mutex::new(None),
        }
    }

    pub fn descriptor(&self) -> &SampleTypeDescriptor {
        &self.descriptor
    }

    pub fn identifier(&self) -> &SampleTypeId {
        self.descriptor.identifier()
    }

    /// Key this observer's cursor is persisted under.
    pub fn cursor_key(&self) -> &str {
        &self.cursor_key
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching.load(Ordering::Acquire)
    }

    pub async fn is_observing(&self) -> bool {
        self.subscription.lock().await.is_some()
    }

    // ── Fetch ────────────────────────────────────────────────────

    /// Fetches new samples, submits them and advances the cursor.
    ///
    /// Returns [`FetchOutcome::AlreadyInProgress`] without side effects if a
    /// fetch is already running. Failures are classified and logged here and
    /// never propagate.
    pub async fn fetch_samples(&self) -> FetchOutcome {
        let Some(_guard) = FetchGuard::try_acquire(&self.fetching) else {
            debug!("Fetch already in progress for {}", self.identifier());
            return FetchOutcome::AlreadyInProgress;
        };

        let result = match &self.descriptor {
            SampleTypeDescriptor::Quantity(d) => self.fetch_quantity(d).await,
            SampleTypeDescriptor::Category(d) => self.fetch_category(d).await,
        };

        match result {
            Ok(report) => {
                debug!(
                    "Fetched {} for {} (submitted {}, cursor advanced: {})",
                    report.fetched,
                    self.identifier(),
                    report.submitted,
                    report.cursor_advanced
                );
                FetchOutcome::Completed(report)
            }
            Err(err) => {
                let context = format!("Fetch {}", self.identifier());
                FetchOutcome::Failed(self.ctx.errors().handle(&err, &context))
            }
        }
    }

    async fn fetch_quantity(&self, descriptor: &QuantityDescriptor) -> SyncResult<FetchReport> {
        let config = self.ctx.config();
        let now = self.ctx.clock().now();

        let (start, first) = match self.read_cursor().await? {
            Some(SyncCursor::Timestamp(stored)) => (
                window::clamp_to_backlog(stored, now, config.max_backlog()),
                false,
            ),
            Some(other) => {
                self.ignore_cursor(&other);
                (self.default_start(now), true)
            }
            None => (self.default_start(now), true),
        };

        let records = StatisticsSampleQuery {
            descriptor,
            start,
            now,
            excluded_metadata_key: &config.excluded_metadata_key,
            calendar: config.calendar(),
            anchor_hour: config.anchor_hour,
        }
        .run(self.ctx.health_store())
        .await?;
        self.report_query(records.len()).await;

        let fetched = records.len();
        if records.is_empty() && !first {
            debug!("No new samples for {}", self.identifier());
            return Ok(FetchReport::default());
        }

        self.ctx.submission().submit(&records).await?;
        self.write_cursor(SyncCursor::Timestamp(now)).await?;

        Ok(FetchReport {
            fetched,
            submitted: fetched,
            cursor_advanced: true,
        })
    }

    async fn fetch_category(&self, descriptor: &CategoryDescriptor) -> SyncResult<FetchReport> {
        let config = self.ctx.config();
        let now = self.ctx.clock().now();

        let start = match self.read_cursor().await? {
            Some(SyncCursor::Anchor(anchor)) => CategoryStart::Anchor(anchor),
            Some(other) => {
                self.ignore_cursor(&other);
                CategoryStart::Date(self.default_start(now))
            }
            None => CategoryStart::Date(self.default_start(now)),
        };

        let batch = AnchoredSampleQuery {
            descriptor,
            start,
            now,
            excluded_metadata_key: &config.excluded_metadata_key,
        }
        .run(self.ctx.health_store())
        .await?;
        self.report_query(batch.records.len()).await;

        self.ctx.submission().submit(&batch.records).await?;

        let cursor_advanced = match batch.new_anchor {
            Some(anchor) => {
                self.write_cursor(SyncCursor::Anchor(anchor)).await?;
                true
            }
            None => false,
        };

        Ok(FetchReport {
            fetched: batch.fetched,
            submitted: batch.records.len(),
            cursor_advanced,
        })
    }

    fn default_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let config = self.ctx.config();
        window::default_start(now, config.default_origin, config.max_backlog())
    }

    fn ignore_cursor(&self, cursor: &SyncCursor) {
        warn!(
            "Ignoring stored {} cursor for {}",
            cursor.kind(),
            self.identifier()
        );
    }

    async fn read_cursor(&self) -> SyncResult<Option<SyncCursor>> {
        self.ctx
            .cursors()
            .get(&self.cursor_key)
            .await
            .map_err(SyncError::StoreReadFailed)
    }

    async fn write_cursor(&self, cursor: SyncCursor) -> SyncResult<()> {
        self.ctx
            .cursors()
            .set(&self.cursor_key, cursor)
            .await
            .map_err(SyncError::StoreWriteFailed)
    }

    /// Posts query telemetry. Failures are handled here and never abort the
    /// fetch.
    async fn report_query(&self, values_count: usize) {
        if !self.ctx.config().report_query_events {
            return;
        }
        let event = QueryHandleEvent::new(self.identifier().as_str(), values_count);
        if let Err(err) = self.ctx.submission().report_query_handled(&event).await {
            let context = format!("Report query event {}", self.identifier());
            self.ctx.errors().handle(&err, &context);
        }
    }

    // ── Change notifications ─────────────────────────────────────

    /// Subscribes to store change notifications and requests background
    /// delivery. A no-op while a subscription is live; registration failures
    /// are handled and leave the observer unsubscribed.
    pub async fn start_observing_changes(self: &Arc<Self>) {
        let store = self.ctx.health_store();
        let identifier = self.identifier();

        {
            let mut subscription = self.subscription.lock().await;
            if subscription.is_some() {
                debug!("Already observing {}", identifier);
                return;
            }

            let ChangeSubscription { id, notifications } =
                match store.observe_changes(identifier).await {
                    Ok(subscription) => subscription,
                    Err(err) => {
                        let context = format!("Observe {}", identifier);
                        self.ctx.errors().handle(&SyncError::from(err), &context);
                        return;
                    }
                };

            let listener = tokio::spawn(listen(Arc::downgrade(self), notifications));
            *self.listener_abort() = Some(listener.abort_handle());
            *subscription = Some(ActiveSubscription { id, listener });
        }

        let frequency = self.descriptor.update_frequency();
        if let Err(err) = store.enable_background_delivery(identifier, frequency).await {
            let context = format!("Enable background delivery {}", identifier);
            self.ctx.errors().handle(&SyncError::from(err), &context);
        }

        info!("Observing {} ({})", identifier, frequency);
    }

    /// Handles one notification and acknowledges it.
    pub async fn process_notification(&self, notification: ChangeNotification) -> NotificationOutcome {
        let outcome = if let Some(err) = notification.error() {
            let context = format!("Change notification {}", self.identifier());
            NotificationOutcome::StoreError(
                self.ctx.errors().handle(&SyncError::from(err.clone()), &context),
            )
        } else if !self.ctx.device().is_protected_data_available().await {
            info!(
                "Protected data unavailable, skipping fetch for {}",
                self.identifier()
            );
            NotificationOutcome::DeviceLocked
        } else {
            NotificationOutcome::Fetched(self.fetch_samples().await)
        };

        notification.acknowledge();
        outcome
    }

    /// Cancels the subscription and unregisters background delivery. Local
    /// state is cleared even if unregistration fails. An in-flight fetch is
    /// not interrupted.
    pub async fn stop_observing_changes(&self) {
        let Some(active) = self.subscription.lock().await.take() else {
            return;
        };

        let store = self.ctx.health_store();
        store.stop_observing(active.id).await;
        self.listener_abort().take();
        drop(active);

        if let Err(err) = store.disable_background_delivery(self.identifier()).await {
            warn!(
                "Failed to disable background delivery for {}: {}",
                self.identifier(),
                err
            );
        }

        info!("Stopped observing {}", self.identifier());
    }

    /// Aborts the notification listener without talking to the store.
    pub(crate) fn detach(&self) {
        if let Some(listener) = self.listener_abort().take() {
            listener.abort();
            debug!("Detached listener for {}", self.identifier());
        }
    }

    fn listener_abort(&self) -> std::sync::MutexGuard<'_, Option<AbortHandle>> {
        self.listener_abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("identifier", self.identifier())
            .field("cursor_key", &self.cursor_key)
            .field("fetching", &self.is_fetching())
            .finish_non_exhaustive()
    }
}

/// Forwards notifications to the observer. Each one is handled on its own
/// task so cancelling the listener never interrupts a fetch.
async fn listen(observer: Weak<Observer>, mut notifications: mpsc::UnboundedReceiver<ChangeNotification>) {
    while let Some(notification) = notifications.recv().await {
        let Some(observer) = observer.upgrade() else {
            break;
        };
        tokio::spawn(async move {
            observer.process_notification(notification).await;
        });
    }
}
