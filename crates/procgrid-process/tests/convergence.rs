//! ConvergenceNotifier background delivery.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use procgrid_core::StatsConfig;
use procgrid_process::*;
use procgrid_state::StateStore;

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn scale_to(instances: i64) -> ScaleRequest {
    ScaleRequest {
        instances: Some(instances),
        ..Default::default()
    }
}

#[tokio::test]
async fn notifier_delivers_on_wake() {
    let store = StateStore::open_in_memory().unwrap();
    let fake = FakeScheduler::default();
    let scheduler = Arc::new(fake.clone());

    // Long retry interval: only a wake can trigger delivery in time.
    let notifier = ConvergenceNotifier::new(store.clone(), scheduler.clone(), Duration::from_secs(3600));
    let service = ProcessService::new(store, scheduler, &StatsConfig::default())
        .with_notifier(notifier.handle());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(notifier.run(shutdown_rx));

    let (_, process) = seed(&service);
    service.scale(&process.guid, &actor(), &scale_to(4)).unwrap();

    wait_until(|| fake.desired().len() == 1).await;
    assert_eq!(fake.desired()[0].instances, 4);
    wait_until(|| service.store().list_pending_sync().unwrap().is_empty()).await;

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn notifier_retries_failed_deliveries() {
    let store = StateStore::open_in_memory().unwrap();
    let fake = FakeScheduler::default();
    let scheduler = Arc::new(fake.clone());
    fake.with(|s| s.fail_desire = true);

    let notifier = ConvergenceNotifier::new(store.clone(), scheduler.clone(), Duration::from_millis(20));
    let service = ProcessService::new(store, scheduler, &StatsConfig::default())
        .with_notifier(notifier.handle());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(notifier.run(shutdown_rx));

    let (_, process) = seed(&service);
    service.scale(&process.guid, &actor(), &scale_to(2)).unwrap();

    wait_until(|| {
        service
            .store()
            .get_pending_sync(&process.guid)
            .unwrap()
            .is_some_and(|p| p.attempts >= 2)
    })
    .await;
    assert!(fake.desired().is_empty());

    fake.with(|s| s.fail_desire = false);
    wait_until(|| fake.desired().len() == 1).await;
    wait_until(|| service.store().list_pending_sync().unwrap().is_empty()).await;

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn latest_change_wins_in_outbox() {
    let (service, fake) = service();
    let (_, process) = seed(&service);

    service
        .scale(
            &process.guid,
            &actor(),
            &ScaleRequest {
                memory_in_mb: Some(256),
                ..Default::default()
            },
        )
        .unwrap();
    let latest = service
        .scale(
            &process.guid,
            &actor(),
            &ScaleRequest {
                memory_in_mb: Some(512),
                ..Default::default()
            },
        )
        .unwrap()
        .into_process();

    let pending = service.store().list_pending_sync().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].version, latest.version);

    service.sync_now().await.unwrap();
    let desired = fake.desired();
    assert_eq!(desired.len(), 1);
    assert_eq!(desired[0].memory_mb, 512);
}

#[tokio::test]
async fn outbox_rows_for_deleted_apps_are_dropped() {
    let (service, fake) = service();
    let (app, process) = seed(&service);
    service.scale(&process.guid, &actor(), &scale_to(3)).unwrap();

    // Deleting the app clears its outbox rows in the same transaction.
    service.delete_app(&app.guid).unwrap();
    assert!(service.store().list_pending_sync().unwrap().is_empty());

    let summary = service.sync_now().await.unwrap();
    assert_eq!(summary, SyncSummary::default());
    assert!(fake.desired().is_empty());
}

#[tokio::test]
async fn rows_for_unscheduled_processes_are_dropped() {
    let (service, fake) = service();
    let (_, process) = seed(&service);
    service.scale(&process.guid, &actor(), &scale_to(3)).unwrap();
    overwrite(&service, &process.guid, |p| p.diego = false);

    let summary = service.sync_now().await.unwrap();
    assert_eq!(summary.dropped, 1);
    assert!(fake.desired().is_empty());
    assert!(service.store().list_pending_sync().unwrap().is_empty());
}

#[tokio::test]
async fn deliver_reports_nothing_pending() {
    let (service, _) = service();
    let (_, process) = seed(&service);

    let delivery = notifier::deliver(service.store(), service.scheduler().as_ref(), &process.guid)
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::NothingPending);
}

#[tokio::test]
async fn undeliverable_state_is_parked_until_requeued() {
    let (service, fake) = service();
    let (_, process) = seed(&service);
    // Not staged yet: the buildpack payload cannot be built.
    overwrite(&service, &process.guid, |p| p.lifecycle.droplet = None);
    service.scale(&process.guid, &actor(), &scale_to(2)).unwrap();

    let summary = service.sync_now().await.unwrap();
    assert_eq!(summary.parked, 1);
    assert_eq!(summary.failed, 0);
    let pending = service.store().get_pending_sync(&process.guid).unwrap().unwrap();
    assert!(pending.parked.as_deref().is_some_and(|r| r.contains("no staged droplet")));
    assert_eq!(pending.attempts, 1);

    // Later passes leave the parked entry alone.
    let summary = service.sync_now().await.unwrap();
    assert_eq!(summary, SyncSummary::default());
    let delivery = notifier::deliver(service.store(), service.scheduler().as_ref(), &process.guid)
        .await
        .unwrap();
    assert!(matches!(delivery, Delivery::Parked(_)));
    assert_eq!(
        service.store().get_pending_sync(&process.guid).unwrap().unwrap().attempts,
        1
    );
    assert!(fake.desired().is_empty());

    overwrite(&service, &process.guid, |p| p.lifecycle = buildpack_lifecycle());
    let requeued = service.requeue(&process.guid).unwrap();
    assert!(requeued.parked.is_none());

    let summary = service.sync_now().await.unwrap();
    assert_eq!(summary.delivered, 1);
    assert_eq!(fake.desired()[0].instances, 2);
    assert!(service.store().list_pending_sync().unwrap().is_empty());
}

#[tokio::test]
async fn requeue_wakes_running_notifier() {
    let store = StateStore::open_in_memory().unwrap();
    let fake = FakeScheduler::default();
    let scheduler = Arc::new(fake.clone());

    let notifier = ConvergenceNotifier::new(store.clone(), scheduler.clone(), Duration::from_secs(3600));
    let service = ProcessService::new(store, scheduler, &StatsConfig::default())
        .with_notifier(notifier.handle());
    let (_, process) = seed(&service);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(notifier.run(shutdown_rx));

    service.requeue(&process.guid).unwrap();
    wait_until(|| fake.desired().len() == 1).await;
    assert_eq!(fake.desired()[0].process_guid, format!("{}-{}", process.guid, process.version));

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn requeue_rejects_unscheduled_processes() {
    let (service, _) = service();
    let (_, process) = seed(&service);
    overwrite(&service, &process.guid, |p| p.diego = false);

    let err = service.requeue(&process.guid).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(service.store().list_pending_sync().unwrap().is_empty());
}
