use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use rankguard_core::{AccessIdentity, AppResult};
use rankguard_domain::{AttributeValue, InvalidationEvent, Permission};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::decision_cache::{DecisionCache, DecisionCacheStats};
use crate::permission_cache::{CacheStats, PermissionCaches};
use crate::permission_loader::{PermissionLoader, RegistrationReport, ReloadReport, ReloadScope};
use crate::permission_ports::PermissionStore;
use crate::permission_registry::PermissionRegistry;
use crate::permission_resolver::PermissionResolver;

/// Tunables of the permission engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionEngineConfig {
    /// Lifetime of memoized decisions; zero disables the decision cache.
    pub decision_ttl: Duration,
    /// Upper bound for each store query issued by a load or reload.
    pub reload_timeout: Duration,
}

impl Default for PermissionEngineConfig {
    fn default() -> Self {
        Self {
            decision_ttl: Duration::from_secs(300),
            reload_timeout: Duration::from_secs(5),
        }
    }
}

/// Permission engine facade used by request handlers and the invalidation listener.
///
/// Cloning is cheap; clones share the same caches.
#[derive(Clone)]
pub struct PermissionEngine {
    caches: Arc<PermissionCaches>,
    loader: Arc<PermissionLoader>,
    resolver: PermissionResolver,
    decisions: Arc<DecisionCache>,
}

impl PermissionEngine {
    /// Creates an engine with empty caches.
    #[must_use]
    pub fn new(store: Arc<dyn PermissionStore>, config: PermissionEngineConfig) -> Self {
        let caches = Arc::new(PermissionCaches::new());

        Self {
            loader: Arc::new(PermissionLoader::new(
                store,
                caches.clone(),
                config.reload_timeout,
            )),
            resolver: PermissionResolver::new(caches.clone()),
            decisions: Arc::new(DecisionCache::new(config.decision_ttl)),
            caches,
        }
    }

    /// Registers declared permissions, then loads every cache.
    ///
    /// Any failure is returned to the caller, which must not serve traffic.
    pub async fn bootstrap(
        store: Arc<dyn PermissionStore>,
        registry: &PermissionRegistry,
        config: PermissionEngineConfig,
    ) -> AppResult<Self> {
        let engine = Self::new(store, config);
        let registration = engine.register(registry).await?;
        let report = engine.loader.load_all().await?;

        info!(
            declared = registry.len(),
            created_permissions = registration.created_permissions,
            created_attributes = registration.created_attributes,
            updated_attributes = registration.updated_attributes,
            undeclared_permissions = registration.undeclared_permissions.len(),
            upserted = report.upserted,
            skipped = report.skipped,
            clamped = report.clamped,
            "permission engine bootstrapped"
        );

        Ok(engine)
    }

    /// Writes declared permissions missing from the store.
    pub async fn register(&self, registry: &PermissionRegistry) -> AppResult<RegistrationReport> {
        self.loader.register(registry).await
    }

    /// Returns whether the identity may perform `category/name`.
    ///
    /// Decisions are memoized per user for the configured TTL.
    #[must_use]
    pub fn can(&self, identity: &AccessIdentity, category: &str, name: &str) -> bool {
        if identity.is_superuser() {
            return true;
        }

        let Some(permission_id) = self.resolver.permission_id(category, name) else {
            return false;
        };

        if let Some(allowed) = self.decisions.get(identity.user_id(), permission_id) {
            return allowed;
        }

        let allowed = self
            .resolver
            .resolve(identity.job(), identity.grade(), permission_id);
        self.decisions
            .insert(identity.user_id(), permission_id, allowed);
        allowed
    }

    /// Returns the attribute value the identity holds for `category/name/key`.
    pub fn attr(
        &self,
        identity: &AccessIdentity,
        category: &str,
        name: &str,
        key: &str,
    ) -> AppResult<Option<AttributeValue>> {
        self.resolver.attr(identity, category, name, key)
    }

    /// Returns the flattened attribute guard names of `(job, grade)`.
    #[must_use]
    pub fn flatten_role_attributes(&self, job: &str, grade: i32) -> BTreeSet<String> {
        self.resolver.flatten_role_attributes(job, grade)
    }

    /// Returns every permission allowed for `(job, grade)`.
    #[must_use]
    pub fn effective_permissions(&self, job: &str, grade: i32) -> Vec<Permission> {
        self.resolver.effective_permissions(job, grade)
    }

    /// Reloads one scope from the store.
    pub async fn reload(&self, scope: &ReloadScope) -> AppResult<ReloadReport> {
        self.loader.reload(scope).await
    }

    /// Applies one invalidation event by reloading its scope.
    pub async fn apply_invalidation(&self, event: &InvalidationEvent) -> AppResult<ReloadReport> {
        match event {
            InvalidationEvent::RolePermUpdate { role_id } => {
                self.loader.reload_role_grants(*role_id).await
            }
            InvalidationEvent::RoleAttrUpdate { role_id } => {
                self.loader.reload_role_attributes(*role_id).await
            }
            InvalidationEvent::JobAttrUpdate { job } => self.loader.reload_job(job).await,
        }
    }

    /// Drops every memoized decision.
    pub fn clear_decisions(&self) {
        self.decisions.clear();
    }

    /// Returns decision cache counters.
    #[must_use]
    pub fn decision_stats(&self) -> DecisionCacheStats {
        self.decisions.stats()
    }

    /// Returns entry counts of the permission caches.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.caches.stats()
    }

    /// Spawns a task evicting expired decisions every `interval` until `shutdown` flips.
    pub fn spawn_decision_sweeper(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let decisions = self.decisions.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = decisions.purge_expired();
                        if evicted > 0 {
                            debug!(evicted, "expired permission decisions evicted");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("decision sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests;
