mod common;

use chrono::TimeDelta;
use common::{HEART_RATE, Harness, SLEEP, STEPS, heart_rate, now, sleep, steps};
use healthsync_sync::health_store::mock::MockHealthStore;
use healthsync_sync::{
    ErrorClass, FetchOutcome, HealthStoreError, HealthSyncService, MemoryCursorStore, SAMPLE_PATH,
    SqliteCursorStore, SyncConfig, SyncContext,
};
use healthsync_types::{
    CategorySample, NormalizedRecord, QuantitySample, SampleTypeDescriptor, SampleTypeId,
    SyncCursor,
};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn all_descriptors() -> Vec<SampleTypeDescriptor> {
    vec![heart_rate().into(), steps().into(), sleep().into()]
}

fn service(h: &Harness) -> HealthSyncService {
    HealthSyncService::new(h.context(), all_descriptors())
}

// ── Construction ────────────────────────────────────────────────

#[tokio::test]
async fn observers_are_created_lazily() {
    let h = Harness::new();
    let svc = service(&h);

    assert_eq!(svc.descriptors().len(), 3);
    assert_eq!(svc.observer_count().await, 0);

    svc.start_observing_changes().await;
    assert_eq!(svc.observer_count().await, 3);
}

#[tokio::test]
async fn duplicate_descriptors_are_ignored() {
    let h = Harness::new();
    let svc = HealthSyncService::new(h.context(), vec![steps().into(), steps().into()]);
    assert_eq!(svc.descriptors().len(), 1);
}

// ── Authorization ───────────────────────────────────────────────

#[tokio::test]
async fn request_authorization_succeeds() {
    let h = Harness::new();
    assert!(service(&h).request_authorization().await);
}

#[tokio::test]
async fn request_authorization_fails_when_data_unavailable() {
    let h = Harness::new();
    h.store.set_health_data_available(false);
    let svc = service(&h);

    assert!(!svc.is_health_data_available());
    assert!(!svc.request_authorization().await);
}

#[tokio::test]
async fn request_authorization_errors_are_handled() {
    let h = Harness::new();
    h.store.fail_authorization(Some(HealthStoreError::AuthorizationDenied));

    assert!(!service(&h).request_authorization().await);
    assert_eq!(h.sink.captured().len(), 1);
}

// ── Observing ───────────────────────────────────────────────────

#[tokio::test]
async fn start_observing_subscribes_every_type() {
    let h = Harness::new();
    let svc = service(&h);

    svc.start_observing_changes().await;

    for id in [HEART_RATE, STEPS, SLEEP] {
        let id = SampleTypeId::new(id);
        assert_eq!(h.store.active_subscriptions(&id), 1);
        assert!(h.store.background_delivery(&id).is_some());
        assert!(svc.observer(&id).await.unwrap().is_observing().await);
    }
}

#[tokio::test]
async fn stop_observing_tears_everything_down() {
    let h = Harness::new();
    let svc = service(&h);
    svc.start_observing_changes().await;

    svc.stop_observing_changes().await;

    assert_eq!(svc.observer_count().await, 0);
    assert_eq!(h.store.stop_observing_count(), 3);
    for id in [HEART_RATE, STEPS, SLEEP] {
        assert_eq!(h.store.active_subscriptions(&SampleTypeId::new(id)), 0);
    }
}

#[tokio::test]
async fn dropping_the_service_stops_listeners() {
    let h = Harness::new();
    let svc = service(&h);
    svc.start_observing_changes().await;
    drop(svc);
    tokio::task::yield_now().await;

    h.store.add_category_sample(SLEEP, CategorySample::new(now(), 1));
    h.store.notify_change(&SampleTypeId::new(SLEEP));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.store.query_count(), 0);
}

#[tokio::test]
async fn dropping_the_service_detaches_listeners_held_elsewhere() {
    let h = Harness::new();
    let svc = service(&h);
    svc.start_observing_changes().await;
    let id = SampleTypeId::new(SLEEP);
    let observer = svc.observer(&id).await.unwrap();

    drop(svc);
    tokio::time::sleep(Duration::from_millis(20)).await;

    h.store.add_category_sample(SLEEP, CategorySample::new(now(), 1));
    let acks = h.store.notify_change(&id);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(acks.is_empty());
    assert_eq!(h.store.query_count(), 0);
    // Detaching leaves the store subscription to the surviving handle.
    assert!(observer.is_observing().await);
}

// ── Fetching ────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_samples_covers_every_type() {
    let h = Harness::new();
    h.store
        .add_quantity_sample(HEART_RATE, QuantitySample::new(now() - TimeDelta::minutes(7), 72.0));
    h.store
        .add_quantity_sample(STEPS, QuantitySample::new(now() - TimeDelta::minutes(7), 30.0));
    h.store
        .add_category_sample(SLEEP, CategorySample::new(now() - TimeDelta::hours(6), 1));
    let svc = service(&h);

    let outcomes: HashMap<_, _> = svc.fetch_samples().await.into_iter().collect();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.values().all(FetchOutcome::is_completed));
    assert_eq!(svc.observer_count().await, 3);
    assert_eq!(h.transport.requests_to(SAMPLE_PATH).len(), 3);
    assert_eq!(h.cursor(HEART_RATE).await, Some(SyncCursor::Timestamp(now())));
    assert!(matches!(h.cursor(SLEEP).await, Some(SyncCursor::Anchor(_))));
}

#[tokio::test]
async fn one_failing_type_does_not_block_others() {
    let h = Harness::new();
    h.transport.fail_path(SAMPLE_PATH, 500);
    h.store
        .add_category_sample(SLEEP, CategorySample::new(now() - TimeDelta::hours(1), 1));
    let svc = service(&h);

    let outcomes: HashMap<_, _> = svc.fetch_samples().await.into_iter().collect();

    assert_eq!(
        outcomes[&SampleTypeId::new(SLEEP)],
        FetchOutcome::Failed(ErrorClass::Unexpected)
    );
    // Quantity types had nothing to submit and advanced normally.
    assert!(outcomes[&SampleTypeId::new(STEPS)].is_completed());
    assert!(outcomes[&SampleTypeId::new(HEART_RATE)].is_completed());
    assert_eq!(h.cursor(SLEEP).await, None);
}

// ── End to end over HTTP ────────────────────────────────────────

#[tokio::test]
async fn end_to_end_over_http_with_sqlite_cursors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sample/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query_handle_event/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cursors = Arc::new(SqliteCursorStore::open(dir.path().join("cursors.db")).unwrap());
    let store = Arc::new(MockHealthStore::new());
    for m in [30, 20, 10] {
        store.add_category_sample(
            SLEEP,
            CategorySample::new(chrono::Utc::now() - TimeDelta::minutes(m), 1),
        );
    }

    let config = SyncConfig {
        endpoint_base_url: server.uri(),
        ..Default::default()
    };
    let ctx = SyncContext::http(config, store.clone(), cursors.clone()).unwrap();
    let svc = HealthSyncService::new(ctx, [SampleTypeDescriptor::from(sleep())]);

    let outcomes = svc.fetch_samples().await;
    assert!(outcomes[0].1.is_completed());

    let requests = server.received_requests().await.unwrap();
    let sample_post = requests
        .iter()
        .find(|r| r.url.path() == "/sample/")
        .unwrap();
    let records: Vec<NormalizedRecord> = serde_json::from_slice(&sample_post.body).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.category_name == "sleep" && r.value == "asleep"));

    let key = svc.context().config().cursor_key(&SampleTypeId::new(SLEEP));
    assert_eq!(
        healthsync_sync::CursorStore::get(cursors.as_ref(), &key).await.unwrap(),
        Some(SyncCursor::Anchor(MockHealthStore::anchor_for(3)))
    );
}

#[tokio::test]
async fn http_context_rejects_invalid_config() {
    let config = SyncConfig {
        request_timeout_secs: 0,
        ..Default::default()
    };
    let result = SyncContext::http(
        config,
        Arc::new(MockHealthStore::new()),
        Arc::new(MemoryCursorStore::new()),
    );
    assert!(result.is_err());
}
