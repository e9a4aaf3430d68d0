use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use rankguard_core::{AccessIdentity, AppResult};
use rankguard_domain::{
    AttributeValue, Permission, PermissionId, attribute_guard_name, guard_name,
};

use crate::permission_cache::PermissionCaches;

/// Answers permission and attribute questions from the caches alone.
///
/// Nothing here performs I/O, so every call is synchronous and cannot time out.
#[derive(Clone)]
pub struct PermissionResolver {
    caches: Arc<PermissionCaches>,
}

impl PermissionResolver {
    /// Creates a resolver reading `caches`.
    #[must_use]
    pub fn new(caches: Arc<PermissionCaches>) -> Self {
        Self { caches }
    }

    /// Returns the permission id of `(category, name)`, if it exists.
    #[must_use]
    pub fn permission_id(&self, category: &str, name: &str) -> Option<PermissionId> {
        self.caches
            .catalog
            .permission_id(guard_name(category, name).as_str())
    }

    /// Returns whether the identity may perform `category/name`.
    #[must_use]
    pub fn can(&self, identity: &AccessIdentity, category: &str, name: &str) -> bool {
        if identity.is_superuser() {
            return true;
        }

        self.permission_id(category, name)
            .is_some_and(|permission_id| {
                self.resolve(identity.job(), identity.grade(), permission_id)
            })
    }

    /// Resolves one permission for `(job, grade)`.
    ///
    /// Walks the job's roles from the highest qualifying grade downward; the first
    /// explicit grant wins. A role without an explicit grant defers to the next
    /// lower grade. No explicit grant anywhere resolves to `false`.
    #[must_use]
    pub fn resolve(&self, job: &str, grade: i32, permission_id: PermissionId) -> bool {
        self.caches
            .roles
            .chain(job, grade)
            .into_iter()
            .rev()
            .find_map(|role_id| self.caches.grants.grant(role_id, permission_id))
            .unwrap_or(false)
    }

    /// Returns the attribute value the identity holds for `category/name/key`.
    ///
    /// Superusers receive the catalog valid values. Otherwise the highest role of the
    /// chain holding a value wins. Unknown permissions and keys yield `None`.
    pub fn attr(
        &self,
        identity: &AccessIdentity,
        category: &str,
        name: &str,
        key: &str,
    ) -> AppResult<Option<AttributeValue>> {
        let Some(permission_id) = self.permission_id(category, name) else {
            return Ok(None);
        };
        let Some(attribute) = self.caches.catalog.attribute_by_key(permission_id, key) else {
            return Ok(None);
        };

        if identity.is_superuser() {
            return Ok(Some(attribute.valid_values().clone()));
        }

        let value = self
            .caches
            .roles
            .chain(identity.job(), identity.grade())
            .into_iter()
            .rev()
            .find_map(|role_id| self.caches.attributes.value(role_id, attribute.id()));

        value
            .map(|value| AttributeValue::or_default(Some(value), attribute.attribute_type()))
            .transpose()
    }

    /// Returns the flattened attribute guard names of every role in the chain.
    ///
    /// Higher grades only add to what lower grades contribute.
    #[must_use]
    pub fn flatten_role_attributes(&self, job: &str, grade: i32) -> BTreeSet<String> {
        let mut flattened = BTreeSet::new();

        for role_id in self.caches.roles.chain(job, grade) {
            for (attribute_id, value) in self.caches.attributes.values(role_id) {
                let Some(attribute) = self.caches.catalog.attribute(attribute_id) else {
                    continue;
                };
                let Some(permission) = self.caches.catalog.permission(attribute.permission_id())
                else {
                    continue;
                };

                for entry in value.flat_values() {
                    flattened.insert(attribute_guard_name(
                        permission.category(),
                        permission.name(),
                        attribute.key(),
                        entry,
                    ));
                }
            }
        }

        flattened
    }

    /// Returns every permission that resolves to `true` for `(job, grade)`.
    ///
    /// Sorted by display order, then guard name.
    #[must_use]
    pub fn effective_permissions(&self, job: &str, grade: i32) -> Vec<Permission> {
        let candidates: HashSet<PermissionId> = self
            .caches
            .roles
            .chain(job, grade)
            .into_iter()
            .flat_map(|role_id| self.caches.grants.permission_ids(role_id))
            .collect();

        let mut permissions: Vec<Permission> = candidates
            .into_iter()
            .filter(|permission_id| self.resolve(job, grade, *permission_id))
            .filter_map(|permission_id| self.caches.catalog.permission(permission_id))
            .collect();

        permissions.sort_by(|left, right| {
            left.order()
                .cmp(&right.order())
                .then_with(|| left.guard_name().cmp(right.guard_name()))
        });
        permissions
    }
}
