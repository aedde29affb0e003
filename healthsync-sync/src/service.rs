//! The sync service: one observer per configured sample type.

use crate::context::SyncContext;
use crate::error::SyncError;
use crate::observer::{FetchOutcome, Observer};
use futures::future::join_all;
use healthsync_types::{SampleTypeDescriptor, SampleTypeId};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Fans sync operations out across every configured sample type.
///
/// Observers are created lazily on the first `start_observing_changes` or
/// `fetch_samples` call. Operations on different sample types run
/// concurrently.
pub struct HealthSyncService {
    ctx: Arc<SyncContext>,
    descriptors: Vec<SampleTypeDescriptor>,
    observers: Mutex<Vec<Arc<Observer>>>,
}

impl HealthSyncService {
    /// Creates a service. Descriptors repeating an identifier are ignored.
    pub fn new(ctx: SyncContext, descriptors: impl IntoIterator<Item = SampleTypeDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let descriptors = descriptors
            .into_iter()
            .filter(|d| {
                let fresh = seen.insert(d.identifier().clone());
                if !fresh {
                    warn!("Ignoring duplicate descriptor for {}", d.identifier());
                }
                fresh
            })
            .collect();

        Self {
            ctx: Arc::new(ctx),
            descriptors,
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn descriptors(&self) -> &[SampleTypeDescriptor] {
        &self.descriptors
    }

    pub fn is_health_data_available(&self) -> bool {
        self.ctx.health_store().is_health_data_available()
    }

    /// Requests read access for every configured type. Returns `false` if
    /// health data is unavailable or the request failed.
    pub async fn request_authorization(&self) -> bool {
        let store = self.ctx.health_store();
        if !store.is_health_data_available() {
            warn!("Health data is not available on this device");
            return false;
        }

        let read_types: Vec<SampleTypeId> = self
            .descriptors
            .iter()
            .map(|d| d.identifier().clone())
            .collect();

        match store.request_authorization(&read_types).await {
            Ok(granted) => {
                info!("Authorization requested for {} types: {}", read_types.len(), granted);
                granted
            }
            Err(err) => {
                self.ctx
                    .errors()
                    .handle(&SyncError::from(err), "Request authorization");
                false
            }
        }
    }

    async fn ensure_observers(&self) -> Vec<Arc<Observer>> {
        let mut observers = self.observers.lock().await;
        if observers.is_empty() {
            observers.extend(
                self.descriptors
                    .iter()
                    .map(|d| Arc::new(Observer::new(d.clone(), Arc::clone(&self.ctx)))),
            );
            debug!("Created {} observers", observers.len());
        }
        observers.clone()
    }

    /// Starts observing changes for every sample type.
    pub async fn start_observing_changes(&self) {
        let observers = self.ensure_observers().await;
        join_all(observers.iter().map(|o| o.start_observing_changes())).await;
    }

    /// Fetches every sample type concurrently. Subscribes first if no
    /// observer exists yet.
    pub async fn fetch_samples(&self) -> Vec<(SampleTypeId, FetchOutcome)> {
        if self.observer_count().await == 0 {
            self.start_observing_changes().await;
        }
        let observers = self.ensure_observers().await;

        join_all(observers.iter().map(|o| async move {
            (o.identifier().clone(), o.fetch_samples().await)
        }))
        .await
    }

    /// Stops every observer and drops them. In-flight fetches finish on
    /// their own.
    pub async fn stop_observing_changes(&self) {
        let observers: Vec<_> = self.observers.lock().await.drain(..).collect();
        join_all(observers.iter().map(|o| o.stop_observing_changes())).await;
        info!("Stopped {} observers", observers.len());
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.lock().await.len()
    }

    pub async fn observer(&self, identifier: &SampleTypeId) -> Option<Arc<Observer>> {
        self.observers
            .lock()
            .await
            .iter()
            .find(|o| o.identifier() == identifier)
            .cloned()
    }
}

impl Drop for HealthSyncService {
    fn drop(&mut self) {
        for observer in self.observers.get_mut().iter() {
            observer.detach();
        }
    }
}

impl std::fmt::Debug for HealthSyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthSyncService")
            .field("descriptors", &self.descriptors.len())
            .finish_non_exhaustive()
    }
}
