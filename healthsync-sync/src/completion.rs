//! One-shot bridge from callback-style store APIs to a single await point.
//!
//! A store adapter hands the [`CompletionHandler`] to the native callback and
//! awaits the [`PendingCompletion`]. `resolve` consumes the handler, so a
//! query resolves at most once; a handler dropped without resolving yields
//! [`HealthStoreError::CompletionDropped`] instead of hanging the caller.

use crate::health_store::{HealthStoreError, HealthStoreResult};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::debug;

/// Creates a connected handler/future pair.
pub fn channel<T>() -> (CompletionHandler<T>, PendingCompletion<T>) {
    let (tx, rx) = oneshot::channel();
    (CompletionHandler { tx }, PendingCompletion { rx })
}

/// The resolving half, given to the native completion callback.
#[derive(Debug)]
pub struct CompletionHandler<T> {
    tx: oneshot::Sender<HealthStoreResult<T>>,
}

impl<T> CompletionHandler<T> {
    /// Resolves the pending query with `result`.
    pub fn resolve(self, result: HealthStoreResult<T>) {
        if self.tx.send(result).is_err() {
            debug!("Completion resolved after the caller went away");
        }
    }

    pub fn succeed(self, value: T) {
        self.resolve(Ok(value));
    }

    pub fn fail(self, error: HealthStoreError) {
        self.resolve(Err(error));
    }
}

/// The awaiting half.
#[derive(Debug)]
pub struct PendingCompletion<T> {
    rx: oneshot::Receiver<HealthStoreResult<T>>,
}

impl<T> Future for PendingCompletion<T> {
    type Output = HealthStoreResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(HealthStoreError::CompletionDropped)))
    }
}
