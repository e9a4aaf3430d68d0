use std::sync::Arc;
use std::time::Duration;

use rankguard_core::{AccessIdentity, AppError};
use rankguard_domain::{AttributeType, AttributeValue, InvalidationEvent, RoleId, StringList};
use tokio::sync::watch;

use crate::permission_registry::{PermissionDefinition, PermissionRegistry};
use crate::test_support::{
    FakePermissionStore, FakeStoreState, attribute, grant, permission, role, role_value,
};

use super::{PermissionEngine, PermissionEngineConfig};

fn strings(values: &[&str]) -> AttributeValue {
    AttributeValue::StringList(StringList::new(values.iter().copied()))
}

fn fixture() -> FakeStoreState {
    FakeStoreState {
        permissions: vec![
            permission(1, "citizens", "ListCitizens"),
            permission(2, "settings", "CreateOrUpdateLawBook"),
        ],
        attributes: vec![attribute(10, 1, "Fields", AttributeType::StringList, None)],
        roles: vec![role(1, "police", 5), role(2, "police", 10), role(3, "police", 15)],
        grants: vec![grant(2, 1, true), grant(3, 2, false)],
        values: vec![role_value(2, 10, Some(strings(&["PhoneNumber"])))],
        ceilings: Vec::new(),
    }
}

fn registry() -> PermissionRegistry {
    let mut registry = PermissionRegistry::new();
    let declared = registry.register_all([
        PermissionDefinition::new("citizens", "ListCitizens").with_attribute(
            "Fields",
            AttributeType::StringList,
            None,
        ),
        PermissionDefinition::new("settings", "CreateOrUpdateLawBook"),
    ]);
    if let Err(error) = declared {
        panic!("invalid test registry: {error}");
    }
    registry
}

async fn bootstrap(
    store: &Arc<FakePermissionStore>,
    config: PermissionEngineConfig,
) -> PermissionEngine {
    match PermissionEngine::bootstrap(store.clone(), &registry(), config).await {
        Ok(engine) => engine,
        Err(error) => panic!("bootstrap failed: {error}"),
    }
}

#[tokio::test]
async fn bootstrap_loads_caches_and_resolves() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    let engine = bootstrap(&store, PermissionEngineConfig::default()).await;

    let officer = AccessIdentity::new(1, "police", 20);
    assert!(engine.can(&officer, "citizens", "ListCitizens"));
    assert!(!engine.can(&officer, "settings", "CreateOrUpdateLawBook"));
    assert!(!engine.can(&AccessIdentity::new(2, "police", 7), "citizens", "ListCitizens"));
    assert_eq!(
        engine.flatten_role_attributes("police", 10).into_iter().collect::<Vec<_>>(),
        vec!["citizens-listcitizens-fields-phonenumber".to_owned()]
    );
    assert_eq!(engine.cache_stats().roles, 3);
}

#[tokio::test]
async fn bootstrap_fails_when_store_is_down() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    store.set_failing(true);

    let result =
        PermissionEngine::bootstrap(store.clone(), &registry(), PermissionEngineConfig::default())
            .await;

    assert!(matches!(result, Err(AppError::Unavailable(_))));
}

#[tokio::test]
async fn decisions_are_memoized_until_cleared() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    let engine = bootstrap(&store, PermissionEngineConfig::default()).await;
    let officer = AccessIdentity::new(1, "police", 10);

    assert!(engine.can(&officer, "citizens", "ListCitizens"));
    store
        .update(|state| state.grants.retain(|grant| grant.role_id != RoleId::new(2)))
        .await;
    let reloaded = engine
        .apply_invalidation(&InvalidationEvent::RolePermUpdate {
            role_id: RoleId::new(2),
        })
        .await;
    assert!(reloaded.is_ok());

    // The memoized decision outlives the reload until its TTL passes.
    assert!(engine.can(&officer, "citizens", "ListCitizens"));
    assert!(!engine.can(&AccessIdentity::new(9, "police", 10), "citizens", "ListCitizens"));

    engine.clear_decisions();
    assert!(!engine.can(&officer, "citizens", "ListCitizens"));

    let stats = engine.decision_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 3);
}

#[tokio::test]
async fn zero_ttl_reflects_reload_immediately() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    let config = PermissionEngineConfig {
        decision_ttl: Duration::ZERO,
        ..PermissionEngineConfig::default()
    };
    let engine = bootstrap(&store, config).await;
    let officer = AccessIdentity::new(1, "police", 10);

    assert!(engine.can(&officer, "citizens", "ListCitizens"));
    store
        .update(|state| state.grants = vec![grant(2, 1, false)])
        .await;
    assert!(
        engine
            .apply_invalidation(&InvalidationEvent::RolePermUpdate {
                role_id: RoleId::new(2),
            })
            .await
            .is_ok()
    );

    assert!(!engine.can(&officer, "citizens", "ListCitizens"));
}

#[tokio::test]
async fn superuser_bypasses_the_decision_cache() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    let engine = bootstrap(&store, PermissionEngineConfig::default()).await;
    let admin = AccessIdentity::new(1, "unemployed", 0).with_superuser(true);

    assert!(engine.can(&admin, "settings", "CreateOrUpdateLawBook"));
    assert!(engine.can(&admin, "unknown", "Permission"));
    assert_eq!(engine.decision_stats().entries, 0);
    assert_eq!(engine.decision_stats().misses, 0);
}

#[tokio::test]
async fn replaying_an_invalidation_is_idempotent() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    let engine = bootstrap(&store, PermissionEngineConfig::default()).await;
    store
        .update(|state| state.grants.push(grant(1, 2, true)))
        .await;
    let event = InvalidationEvent::RolePermUpdate {
        role_id: RoleId::new(1),
    };

    let first = engine.apply_invalidation(&event).await;
    let after_first = engine.cache_stats();
    let second = engine.apply_invalidation(&event).await;

    assert_eq!(first.map(|report| report.upserted).ok(), Some(1));
    assert_eq!(second.map(|report| report.removed).ok(), Some(0));
    assert_eq!(engine.cache_stats(), after_first);
    assert!(engine.can(&AccessIdentity::new(3, "police", 5), "settings", "CreateOrUpdateLawBook"));
}

#[tokio::test]
async fn attribute_invalidation_reloads_values() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    let engine = bootstrap(&store, PermissionEngineConfig::default()).await;
    store
        .update(|state| {
            state.values = vec![role_value(2, 10, Some(strings(&["Licenses"])))];
        })
        .await;

    let reloaded = engine
        .apply_invalidation(&InvalidationEvent::RoleAttrUpdate {
            role_id: RoleId::new(2),
        })
        .await;

    assert!(reloaded.is_ok());
    let value = engine.attr(
        &AccessIdentity::new(1, "police", 12),
        "citizens",
        "ListCitizens",
        "Fields",
    );
    assert_eq!(value.ok().flatten(), Some(strings(&["Licenses"])));
}

#[tokio::test(start_paused = true)]
async fn sweeper_stops_on_shutdown() {
    let store = Arc::new(FakePermissionStore::new(fixture()));
    let config = PermissionEngineConfig {
        decision_ttl: Duration::from_secs(1),
        ..PermissionEngineConfig::default()
    };
    let engine = bootstrap(&store, config).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = engine.spawn_decision_sweeper(Duration::from_secs(2), shutdown_rx);

    assert!(engine.can(&AccessIdentity::new(1, "police", 10), "citizens", "ListCitizens"));
    assert_eq!(engine.decision_stats().entries, 1);

    let _ = shutdown_tx.send(true);
    assert!(sweeper.await.is_ok());
}
