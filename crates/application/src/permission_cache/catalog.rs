use std::collections::HashSet;

use dashmap::DashMap;
use rankguard_domain::{Attribute, AttributeId, Permission, PermissionId};

use super::ReconcileStats;

/// Permission identity ⇄ id, and `(permission id, attribute key)` → attribute.
#[derive(Default)]
pub struct PermissionCatalog {
    permissions: DashMap<PermissionId, Permission>,
    guards: DashMap<String, PermissionId>,
    attributes: DashMap<AttributeId, Attribute>,
    attribute_keys: DashMap<(PermissionId, String), AttributeId>,
}

impl PermissionCatalog {
    /// Returns the permission id registered for a guard name.
    #[must_use]
    pub fn permission_id(&self, guard_name: &str) -> Option<PermissionId> {
        self.guards.get(guard_name).map(|entry| *entry.value())
    }

    /// Returns one permission by id.
    #[must_use]
    pub fn permission(&self, permission_id: PermissionId) -> Option<Permission> {
        self.permissions
            .get(&permission_id)
            .map(|entry| entry.value().clone())
    }

    /// Returns every cached permission.
    #[must_use]
    pub fn permissions(&self) -> Vec<Permission> {
        self.permissions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Returns one attribute by id.
    #[must_use]
    pub fn attribute(&self, attribute_id: AttributeId) -> Option<Attribute> {
        self.attributes
            .get(&attribute_id)
            .map(|entry| entry.value().clone())
    }

    /// Returns the attribute of a permission with the given key.
    #[must_use]
    pub fn attribute_by_key(&self, permission_id: PermissionId, key: &str) -> Option<Attribute> {
        let attribute_id = self
            .attribute_keys
            .get(&(permission_id, key.to_owned()))
            .map(|entry| *entry.value())?;

        self.attribute(attribute_id)
    }

    /// Returns the number of cached permissions.
    #[must_use]
    pub fn permission_count(&self) -> usize {
        self.permissions.len()
    }

    /// Returns the number of cached attributes.
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Replaces the whole permission catalog with `permissions`.
    pub fn replace_permissions(&self, permissions: Vec<Permission>) -> ReconcileStats {
        let fresh_ids: HashSet<PermissionId> =
            permissions.iter().map(Permission::id).collect();
        let fresh_guards: HashSet<String> = permissions
            .iter()
            .map(|permission| permission.guard_name().to_owned())
            .collect();
        let upserted = permissions.len();

        for permission in permissions {
            self.guards
                .insert(permission.guard_name().to_owned(), permission.id());
            self.permissions.insert(permission.id(), permission);
        }

        let mut removed = 0;
        self.permissions.retain(|permission_id, _| {
            let keep = fresh_ids.contains(permission_id);
            removed += usize::from(!keep);
            keep
        });
        self.guards.retain(|guard, _| fresh_guards.contains(guard));

        ReconcileStats { upserted, removed }
    }

    /// Replaces the whole attribute catalog with `attributes`.
    pub fn replace_attributes(&self, attributes: Vec<Attribute>) -> ReconcileStats {
        let fresh_ids: HashSet<AttributeId> = attributes.iter().map(Attribute::id).collect();
        let upserted = attributes.len();

        for attribute in attributes {
            self.attribute_keys.insert(
                (attribute.permission_id(), attribute.key().to_owned()),
                attribute.id(),
            );
            self.attributes.insert(attribute.id(), attribute);
        }

        let mut removed = 0;
        self.attributes.retain(|attribute_id, _| {
            let keep = fresh_ids.contains(attribute_id);
            removed += usize::from(!keep);
            keep
        });
        self.attribute_keys
            .retain(|_, attribute_id| fresh_ids.contains(attribute_id));

        ReconcileStats { upserted, removed }
    }
}
