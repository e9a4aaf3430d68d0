use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rankguard_application::{NewAttribute, NewPermission, PermissionStore};
use rankguard_core::{AppError, AppResult};
use rankguard_domain::{
    Attribute, AttributeId, AttributeType, AttributeValue, JobAttributeCeiling, Permission,
    PermissionId, Role, RoleAttributeValue, RoleGrant, RoleId,
};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct StoreState {
    permissions: BTreeMap<PermissionId, Permission>,
    attributes: BTreeMap<AttributeId, Attribute>,
    roles: BTreeMap<RoleId, Role>,
    grants: BTreeMap<(RoleId, PermissionId), bool>,
    values: BTreeMap<(RoleId, AttributeId), Option<AttributeValue>>,
    ceilings: BTreeMap<(String, AttributeId), Option<AttributeValue>>,
}

impl StoreState {
    fn ensure_role(&self, role_id: RoleId) -> AppResult<()> {
        if self.roles.contains_key(&role_id) {
            return Ok(());
        }
        Err(AppError::NotFound(format!("role '{role_id}' does not exist")))
    }

    fn ensure_attribute(&self, attribute_id: AttributeId) -> AppResult<()> {
        if self.attributes.contains_key(&attribute_id) {
            return Ok(());
        }
        Err(AppError::NotFound(format!(
            "attribute '{attribute_id}' does not exist"
        )))
    }
}

/// In-memory permission store for tests and local development.
///
/// Mutators mirror what role-management tooling writes; they do not publish
/// invalidation events.
#[derive(Debug)]
pub struct InMemoryPermissionStore {
    state: RwLock<StoreState>,
    next_id: AtomicU64,
}

impl Default for InMemoryPermissionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPermissionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Creates a role for `(job, grade)`.
    pub async fn create_role(&self, job: &str, grade: i32) -> AppResult<Role> {
        let mut state = self.state.write().await;
        if state
            .roles
            .values()
            .any(|role| role.job == job && role.grade == grade)
        {
            return Err(AppError::Conflict(format!(
                "role for job '{job}' grade '{grade}' already exists"
            )));
        }

        let role = Role {
            id: RoleId::new(self.next_id()),
            job: job.to_owned(),
            grade,
        };
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    /// Deletes a role with its grants and attribute values.
    pub async fn delete_role(&self, role_id: RoleId) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.ensure_role(role_id)?;

        state.roles.remove(&role_id);
        state.grants.retain(|(owner, _), _| *owner != role_id);
        state.values.retain(|(owner, _), _| *owner != role_id);
        Ok(())
    }

    /// Sets or, with `None`, removes the explicit grant of one permission.
    pub async fn set_grant(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
        value: Option<bool>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.ensure_role(role_id)?;
        if !state.permissions.contains_key(&permission_id) {
            return Err(AppError::NotFound(format!(
                "permission '{permission_id}' does not exist"
            )));
        }

        match value {
            Some(value) => {
                state.grants.insert((role_id, permission_id), value);
            }
            None => {
                state.grants.remove(&(role_id, permission_id));
            }
        }
        Ok(())
    }

    /// Stores the attribute value of one role.
    pub async fn set_role_attribute_value(
        &self,
        role_id: RoleId,
        attribute_id: AttributeId,
        value: Option<AttributeValue>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.ensure_role(role_id)?;
        state.ensure_attribute(attribute_id)?;

        state.values.insert((role_id, attribute_id), value);
        Ok(())
    }

    /// Removes the attribute value of one role.
    pub async fn remove_role_attribute_value(
        &self,
        role_id: RoleId,
        attribute_id: AttributeId,
    ) -> AppResult<()> {
        self.state
            .write()
            .await
            .values
            .remove(&(role_id, attribute_id));
        Ok(())
    }

    /// Stores the ceiling of one attribute for `job`.
    pub async fn set_job_ceiling(
        &self,
        job: &str,
        attribute_id: AttributeId,
        max_values: Option<AttributeValue>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.ensure_attribute(attribute_id)?;

        state
            .ceilings
            .insert((job.to_owned(), attribute_id), max_values);
        Ok(())
    }

    /// Removes the ceiling of one attribute for `job`.
    pub async fn remove_job_ceiling(&self, job: &str, attribute_id: AttributeId) -> AppResult<()> {
        self.state
            .write()
            .await
            .ceilings
            .remove(&(job.to_owned(), attribute_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        Ok(self.state.read().await.permissions.values().cloned().collect())
    }

    async fn list_attributes(&self) -> AppResult<Vec<Attribute>> {
        Ok(self.state.read().await.attributes.values().cloned().collect())
    }

    async fn list_roles(&self, job: Option<&str>) -> AppResult<Vec<Role>> {
        Ok(self
            .state
            .read()
            .await
            .roles
            .values()
            .filter(|role| job.is_none_or(|job| role.job == job))
            .cloned()
            .collect())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.state.read().await.roles.get(&role_id).cloned())
    }

    async fn list_role_grants(&self, role_id: Option<RoleId>) -> AppResult<Vec<RoleGrant>> {
        Ok(self
            .state
            .read()
            .await
            .grants
            .iter()
            .filter(|((owner, _), _)| role_id.is_none_or(|role_id| *owner == role_id))
            .map(|((role_id, permission_id), value)| RoleGrant {
                role_id: *role_id,
                permission_id: *permission_id,
                value: *value,
            })
            .collect())
    }

    async fn list_role_attribute_values(
        &self,
        role_id: Option<RoleId>,
    ) -> AppResult<Vec<RoleAttributeValue>> {
        Ok(self
            .state
            .read()
            .await
            .values
            .iter()
            .filter(|((owner, _), _)| role_id.is_none_or(|role_id| *owner == role_id))
            .map(|((role_id, attribute_id), value)| RoleAttributeValue {
                role_id: *role_id,
                attribute_id: *attribute_id,
                value: value.clone(),
            })
            .collect())
    }

    async fn list_job_attribute_ceilings(
        &self,
        job: Option<&str>,
    ) -> AppResult<Vec<JobAttributeCeiling>> {
        Ok(self
            .state
            .read()
            .await
            .ceilings
            .iter()
            .filter(|((owner, _), _)| job.is_none_or(|job| owner == job))
            .map(|((job, attribute_id), max_values)| JobAttributeCeiling {
                job: job.clone(),
                attribute_id: *attribute_id,
                max_values: max_values.clone(),
            })
            .collect())
    }

    async fn create_permission(&self, input: NewPermission) -> AppResult<Permission> {
        let mut state = self.state.write().await;
        let permission = Permission::new(
            PermissionId::new(self.next_id()),
            input.category,
            input.name,
            input.order,
        )?;

        if state
            .permissions
            .values()
            .any(|existing| existing.guard_name() == permission.guard_name())
        {
            return Err(AppError::Conflict(format!(
                "permission '{}' already exists",
                permission.guard_name()
            )));
        }

        state.permissions.insert(permission.id(), permission.clone());
        Ok(permission)
    }

    async fn create_attribute(&self, input: NewAttribute) -> AppResult<Attribute> {
        let mut state = self.state.write().await;
        if !state.permissions.contains_key(&input.permission_id) {
            return Err(AppError::NotFound(format!(
                "permission '{}' does not exist",
                input.permission_id
            )));
        }
        if state.attributes.values().any(|existing| {
            existing.permission_id() == input.permission_id && existing.key() == input.key
        }) {
            return Err(AppError::Conflict(format!(
                "attribute '{}' already exists for permission '{}'",
                input.key, input.permission_id
            )));
        }

        let attribute = Attribute::new(
            AttributeId::new(self.next_id()),
            input.permission_id,
            input.key,
            input.attribute_type,
            input.valid_values,
        )?;
        state.attributes.insert(attribute.id(), attribute.clone());
        Ok(attribute)
    }

    async fn update_attribute_definition(
        &self,
        attribute_id: AttributeId,
        attribute_type: AttributeType,
        valid_values: Option<AttributeValue>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let Some(existing) = state.attributes.get(&attribute_id) else {
            return Err(AppError::NotFound(format!(
                "attribute '{attribute_id}' does not exist"
            )));
        };

        let updated = Attribute::new(
            attribute_id,
            existing.permission_id(),
            existing.key(),
            attribute_type,
            valid_values,
        )?;
        state.attributes.insert(attribute_id, updated);
        Ok(())
    }
}
