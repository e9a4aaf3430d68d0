use std::collections::HashMap;

use rankguard_core::AppResult;
use rankguard_domain::{Attribute, AttributeValue, PermissionId};
use tracing::{info, warn};

use crate::permission_ports::{NewAttribute, NewPermission};
use crate::permission_registry::PermissionRegistry;

use super::PermissionLoader;

/// Changes made to the store while registering declared permissions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrationReport {
    /// Permissions inserted because they were declared but missing.
    pub created_permissions: usize,
    /// Attributes inserted because they were declared but missing.
    pub created_attributes: usize,
    /// Attributes whose type or valid values were brought in line with the declaration.
    pub updated_attributes: usize,
    /// Guard names present in the store but no longer declared.
    pub undeclared_permissions: Vec<String>,
}

impl PermissionLoader {
    /// Writes declared permissions and attributes missing from the store.
    ///
    /// Store rows that are no longer declared are reported, never deleted.
    pub async fn register(&self, registry: &PermissionRegistry) -> AppResult<RegistrationReport> {
        let mut report = RegistrationReport::default();
        let permissions = self
            .fetch("permissions", self.store.list_permissions())
            .await?;

        let mut by_guard: HashMap<String, PermissionId> = permissions
            .iter()
            .map(|permission| (permission.guard_name().to_owned(), permission.id()))
            .collect();

        for definition in registry.definitions() {
            let guard = definition.guard_name();
            if by_guard.contains_key(&guard) {
                continue;
            }

            let created = self
                .fetch(
                    "permission registration",
                    self.store.create_permission(NewPermission {
                        category: definition.category.clone(),
                        name: definition.name.clone(),
                        order: definition.order,
                    }),
                )
                .await?;
            info!(
                guard_name = %created.guard_name(),
                permission_id = %created.id(),
                "registered declared permission"
            );
            by_guard.insert(guard, created.id());
            report.created_permissions += 1;
        }

        for permission in &permissions {
            if !registry.contains(permission.guard_name()) {
                warn!(
                    guard_name = %permission.guard_name(),
                    permission_id = %permission.id(),
                    "store permission is not declared by any service"
                );
                report
                    .undeclared_permissions
                    .push(permission.guard_name().to_owned());
            }
        }

        let attributes = self
            .fetch("attributes", self.store.list_attributes())
            .await?;
        let by_key: HashMap<(PermissionId, String), Attribute> = attributes
            .into_iter()
            .map(|attribute| ((attribute.permission_id(), attribute.key().to_owned()), attribute))
            .collect();

        for definition in registry.definitions() {
            let Some(permission_id) = by_guard.get(&definition.guard_name()).copied() else {
                continue;
            };

            for declared in &definition.attributes {
                match by_key.get(&(permission_id, declared.key.clone())) {
                    None => {
                        let created = self
                            .fetch(
                                "attribute registration",
                                self.store.create_attribute(NewAttribute {
                                    permission_id,
                                    key: declared.key.clone(),
                                    attribute_type: declared.attribute_type,
                                    valid_values: declared.valid_values.clone(),
                                }),
                            )
                            .await?;
                        info!(
                            permission_id = %permission_id,
                            attribute_id = %created.id(),
                            key = %created.key(),
                            "registered declared attribute"
                        );
                        report.created_attributes += 1;
                    }
                    Some(existing) => {
                        let declared_values = AttributeValue::or_default(
                            declared.valid_values.clone(),
                            declared.attribute_type,
                        )?;
                        if existing.attribute_type() == declared.attribute_type
                            && existing.valid_values() == &declared_values
                        {
                            continue;
                        }

                        self.fetch(
                            "attribute update",
                            self.store.update_attribute_definition(
                                existing.id(),
                                declared.attribute_type,
                                declared.valid_values.clone(),
                            ),
                        )
                        .await?;
                        info!(
                            permission_id = %permission_id,
                            attribute_id = %existing.id(),
                            key = %existing.key(),
                            "updated declared attribute definition"
                        );
                        report.updated_attributes += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}
