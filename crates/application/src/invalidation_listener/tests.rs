use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rankguard_core::{AccessIdentity, AppError, AppResult};
use rankguard_domain::{AttributeType, InvalidationEvent, RoleId};
use tokio::sync::{Mutex, watch};

use crate::permission_engine::{PermissionEngine, PermissionEngineConfig};
use crate::permission_ports::{InvalidationBus, InvalidationMessage, InvalidationSubscription};
use crate::permission_registry::PermissionRegistry;
use crate::test_support::{FakePermissionStore, FakeStoreState, attribute, grant, permission, role};

use super::{InvalidationListener, InvalidationListenerConfig};

type Delivery = AppResult<Option<InvalidationMessage>>;

/// Bus handing out scripted subscriptions in order.
///
/// Once the scripts run out, subscriptions stay open without delivering anything.
#[derive(Default)]
struct FakeBus {
    scripts: Mutex<VecDeque<AppResult<Vec<Delivery>>>>,
    acknowledged: Arc<Mutex<Vec<String>>>,
    attempts: AtomicUsize,
}

impl FakeBus {
    fn with_scripts(scripts: Vec<AppResult<Vec<Delivery>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        }
    }

    async fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.lock().await.clone()
    }
}

#[async_trait]
impl InvalidationBus for FakeBus {
    async fn subscribe(&self) -> AppResult<Box<dyn InvalidationSubscription>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let deliveries = self.scripts.lock().await.pop_front().unwrap_or(Ok(Vec::new()))?;

        Ok(Box::new(FakeSubscription {
            deliveries: deliveries.into(),
            acknowledged: self.acknowledged.clone(),
        }))
    }
}

struct FakeSubscription {
    deliveries: VecDeque<Delivery>,
    acknowledged: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl InvalidationSubscription for FakeSubscription {
    async fn next_message(&mut self) -> AppResult<Option<InvalidationMessage>> {
        match self.deliveries.pop_front() {
            Some(delivery) => delivery,
            None => std::future::pending().await,
        }
    }

    async fn acknowledge(&mut self, message: &InvalidationMessage) -> AppResult<()> {
        self.acknowledged
            .lock()
            .await
            .push(message.delivery_id.clone());
        Ok(())
    }
}

fn message(delivery_id: &str, event: InvalidationEvent) -> Delivery {
    Ok(Some(InvalidationMessage {
        delivery_id: delivery_id.to_owned(),
        event,
    }))
}

fn role_perm_update(role_id: u64) -> InvalidationEvent {
    InvalidationEvent::RolePermUpdate {
        role_id: RoleId::new(role_id),
    }
}

fn fixture() -> FakeStoreState {
    FakeStoreState {
        permissions: vec![permission(1, "citizens", "ListCitizens")],
        attributes: vec![attribute(10, 1, "Fields", AttributeType::StringList, None)],
        roles: vec![role(1, "police", 0), role(2, "police", 10)],
        grants: vec![grant(1, 1, true)],
        values: Vec::new(),
        ceilings: Vec::new(),
    }
}

async fn engine(store: &Arc<FakePermissionStore>) -> PermissionEngine {
    let config = PermissionEngineConfig {
        decision_ttl: Duration::ZERO,
        ..PermissionEngineConfig::default()
    };
    match PermissionEngine::bootstrap(store.clone(), &PermissionRegistry::new(), config).await {
        Ok(engine) => engine,
        Err(error) => panic!("bootstrap failed: {error}"),
    }
}

fn fast_retry() -> InvalidationListenerConfig {
    InvalidationListenerConfig {
        retry_min: Duration::from_millis(10),
        retry_max: Duration::from_millis(40),
    }
}

async fn wait_for_acks(bus: &FakeBus, expected: usize) -> Vec<String> {
    for _ in 0..200 {
        let acknowledged = bus.acknowledged().await;
        if acknowledged.len() >= expected {
            return acknowledged;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bus.acknowledged().await
}

#[tokio::test]
async fn applies_events_and_acknowledges_them() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    let engine = engine(&store).await;
    store
        .update(|state| state.grants = vec![grant(1, 1, true), grant(2, 1, false)])
        .await;
    let bus = Arc::new(FakeBus::with_scripts(vec![Ok(vec![
        message("1-0", role_perm_update(2)),
        message("1-1", role_perm_update(2)),
    ])]));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = InvalidationListener::new(engine.clone(), bus.clone(), fast_retry());
    let handle = listener.spawn(shutdown_rx);

    assert_eq!(wait_for_acks(&bus, 2).await, vec!["1-0".to_owned(), "1-1".to_owned()]);
    assert!(!engine.can(&AccessIdentity::new(1, "police", 10), "citizens", "ListCitizens"));
    assert!(engine.can(&AccessIdentity::new(2, "police", 5), "citizens", "ListCitizens"));

    let _ = shutdown_tx.send(true);
    assert!(handle.await.is_ok());
}

#[tokio::test]
async fn failed_reload_is_acknowledged_and_keeps_state() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    let engine = engine(&store).await;
    store.update(|state| state.grants.clear()).await;
    store.set_failing(true);
    let bus = Arc::new(FakeBus::with_scripts(vec![Ok(vec![message(
        "7-0",
        role_perm_update(1),
    )])]));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = InvalidationListener::new(engine.clone(), bus.clone(), fast_retry())
        .spawn(shutdown_rx);

    assert_eq!(wait_for_acks(&bus, 1).await, vec!["7-0".to_owned()]);
    assert!(engine.can(&AccessIdentity::new(1, "police", 0), "citizens", "ListCitizens"));

    let _ = shutdown_tx.send(true);
    assert!(handle.await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn resubscribes_after_failures_with_backoff() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    let engine = engine(&store).await;
    store.update(|state| state.grants.push(grant(2, 1, false))).await;
    let bus = Arc::new(FakeBus::with_scripts(vec![
        Err(AppError::Unavailable("bus offline".to_owned())),
        Ok(vec![Ok(None)]),
        Ok(vec![Err(AppError::Unavailable("connection reset".to_owned()))]),
        Ok(vec![message("3-0", role_perm_update(2))]),
    ]));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = InvalidationListener::new(engine.clone(), bus.clone(), fast_retry())
        .spawn(shutdown_rx);

    assert_eq!(wait_for_acks(&bus, 1).await, vec!["3-0".to_owned()]);
    assert_eq!(bus.attempts.load(Ordering::SeqCst), 4);
    assert!(!engine.can(&AccessIdentity::new(1, "police", 10), "citizens", "ListCitizens"));

    let _ = shutdown_tx.send(true);
    assert!(handle.await.is_ok());
}

#[tokio::test]
async fn stops_while_waiting_for_messages() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    let engine = engine(&store).await;
    let bus = Arc::new(FakeBus::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = InvalidationListener::new(engine, bus.clone(), fast_retry()).spawn(shutdown_rx);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let _ = shutdown_tx.send(true);

    let stopped = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(matches!(stopped, Ok(Ok(()))));
    assert_eq!(bus.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handle_reloads_job_scope() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    let engine = engine(&store).await;
    store
        .update(|state| {
            state.roles.push(role(3, "police", 20));
            state.grants.push(grant(3, 1, false));
        })
        .await;
    let listener =
        InvalidationListener::new(engine.clone(), Arc::new(FakeBus::default()), fast_retry());

    listener
        .handle(&InvalidationMessage {
            delivery_id: "9-0".to_owned(),
            event: InvalidationEvent::JobAttrUpdate {
                job: "police".to_owned(),
            },
        })
        .await;

    assert!(!engine.can(&AccessIdentity::new(1, "police", 25), "citizens", "ListCitizens"));
    assert!(engine.can(&AccessIdentity::new(1, "police", 15), "citizens", "ListCitizens"));
}
