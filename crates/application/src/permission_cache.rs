//! Concurrent in-memory mirrors of the permission store.
//!
//! Every cache is a sharded map with atomic per-key updates. Scoped replacement
//! publishes fresh keys before it removes stale ones, so readers never observe a
//! scope with some of its keys missing mid-reload.

mod catalog;
mod roles;
mod scoped_map;

use rankguard_domain::{AttributeId, AttributeValue, PermissionId, RoleId};

pub use catalog::PermissionCatalog;
pub use roles::RoleCache;
pub use scoped_map::ReconcileStats;

use scoped_map::ScopedMap;

/// `(role id, permission id)` → explicit grant.
#[derive(Default)]
pub struct RoleGrantCache {
    grants: ScopedMap<RoleId, PermissionId, bool>,
}

impl RoleGrantCache {
    /// Returns the explicit grant of a role for a permission, if one is set.
    #[must_use]
    pub fn grant(&self, role_id: RoleId, permission_id: PermissionId) -> Option<bool> {
        self.grants.get(&role_id, &permission_id)
    }

    /// Returns every permission with an explicit grant on the role.
    #[must_use]
    pub fn permission_ids(&self, role_id: RoleId) -> Vec<PermissionId> {
        self.grants.keys(&role_id)
    }

    /// Replaces all grants of one role.
    pub fn replace_role(
        &self,
        role_id: RoleId,
        grants: Vec<(PermissionId, bool)>,
    ) -> ReconcileStats {
        self.grants.replace_scope(role_id, grants)
    }

    /// Returns roles that currently hold at least one grant.
    #[must_use]
    pub fn role_ids(&self) -> Vec<RoleId> {
        self.grants.scopes()
    }

    /// Returns the number of cached grants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Returns whether no grant is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.len() == 0
    }
}

/// `(role id, attribute id)` → clamped attribute value.
#[derive(Default)]
pub struct RoleAttributeCache {
    values: ScopedMap<RoleId, AttributeId, AttributeValue>,
}

impl RoleAttributeCache {
    /// Returns the value a role holds for an attribute.
    #[must_use]
    pub fn value(&self, role_id: RoleId, attribute_id: AttributeId) -> Option<AttributeValue> {
        self.values.get(&role_id, &attribute_id)
    }

    /// Returns every attribute value held by the role.
    #[must_use]
    pub fn values(&self, role_id: RoleId) -> Vec<(AttributeId, AttributeValue)> {
        self.values.entries(&role_id)
    }

    /// Replaces all attribute values of one role.
    pub fn replace_role(
        &self,
        role_id: RoleId,
        values: Vec<(AttributeId, AttributeValue)>,
    ) -> ReconcileStats {
        self.values.replace_scope(role_id, values)
    }

    /// Returns roles that currently hold at least one value.
    #[must_use]
    pub fn role_ids(&self) -> Vec<RoleId> {
        self.values.scopes()
    }

    /// Returns the number of cached values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether no value is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.len() == 0
    }
}

/// `(job, attribute id)` → per-job maximum values.
#[derive(Default)]
pub struct JobCeilingCache {
    ceilings: ScopedMap<String, AttributeId, AttributeValue>,
}

impl JobCeilingCache {
    /// Returns the ceiling of a job for an attribute.
    #[must_use]
    pub fn ceiling(&self, job: &str, attribute_id: AttributeId) -> Option<AttributeValue> {
        self.ceilings.get(&job.to_owned(), &attribute_id)
    }

    /// Replaces all ceilings of one job.
    pub fn replace_job(
        &self,
        job: &str,
        ceilings: Vec<(AttributeId, AttributeValue)>,
    ) -> ReconcileStats {
        self.ceilings.replace_scope(job.to_owned(), ceilings)
    }

    /// Returns jobs that currently hold at least one ceiling.
    #[must_use]
    pub fn jobs(&self) -> Vec<String> {
        self.ceilings.scopes()
    }

    /// Returns the number of cached ceilings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ceilings.len()
    }

    /// Returns whether no ceiling is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ceilings.len() == 0
    }
}

/// Entry counts of every cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Cached permissions.
    pub permissions: usize,
    /// Cached attribute definitions.
    pub attributes: usize,
    /// Cached roles.
    pub roles: usize,
    /// Cached explicit grants.
    pub grants: usize,
    /// Cached role attribute values.
    pub attribute_values: usize,
    /// Cached job ceilings.
    pub ceilings: usize,
}

/// All caches the resolver reads and the loader writes.
#[derive(Default)]
pub struct PermissionCaches {
    /// Permission and attribute catalog.
    pub catalog: PermissionCatalog,
    /// Roles by id and by `(job, grade)`.
    pub roles: RoleCache,
    /// Explicit role grants.
    pub grants: RoleGrantCache,
    /// Clamped role attribute values.
    pub attributes: RoleAttributeCache,
    /// Per-job attribute ceilings.
    pub ceilings: JobCeilingCache,
}

impl PermissionCaches {
    /// Creates empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns entry counts of every cache.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            permissions: self.catalog.permission_count(),
            attributes: self.catalog.attribute_count(),
            roles: self.roles.len(),
            grants: self.grants.len(),
            attribute_values: self.attributes.len(),
            ceilings: self.ceilings.len(),
        }
    }
}
