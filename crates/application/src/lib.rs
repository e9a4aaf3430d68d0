//! Permission engine services and ports.
//!
//! The engine keeps every permission, role, grant and attribute row in sharded
//! in-memory caches, answers checks from those caches without I/O, and reloads
//! individual scopes when invalidation events arrive.

#![forbid(unsafe_code)]

mod decision_cache;
mod invalidation_listener;
mod permission_cache;
mod permission_engine;
mod permission_loader;
mod permission_ports;
mod permission_registry;
mod permission_resolver;

#[cfg(test)]
mod test_support;

pub use decision_cache::{DecisionCache, DecisionCacheStats};
pub use invalidation_listener::{InvalidationListener, InvalidationListenerConfig};
pub use permission_cache::{
    CacheStats, JobCeilingCache, PermissionCaches, PermissionCatalog, ReconcileStats,
    RoleAttributeCache, RoleCache, RoleGrantCache,
};
pub use permission_engine::{PermissionEngine, PermissionEngineConfig};
pub use permission_loader::{PermissionLoader, RegistrationReport, ReloadReport, ReloadScope};
pub use permission_ports::{
    InvalidationBus, InvalidationMessage, InvalidationPublisher, InvalidationSubscription,
    NewAttribute, NewPermission, PermissionStore,
};
pub use permission_registry::{AttributeDefinition, PermissionDefinition, PermissionRegistry};
pub use permission_resolver::PermissionResolver;
