use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rankguard_core::{AppError, AppResult};
use rankguard_domain::{
    Attribute, AttributeId, AttributeType, AttributeValue, JobAttributeCeiling, Permission,
    PermissionId, Role, RoleAttributeValue, RoleGrant, RoleId,
};
use tokio::sync::Mutex;

use crate::permission_ports::{NewAttribute, NewPermission, PermissionStore};

pub(crate) fn permission(id: u64, category: &str, name: &str) -> Permission {
    match Permission::new(PermissionId::new(id), category, name, 0) {
        Ok(permission) => permission,
        Err(error) => panic!("invalid test permission: {error}"),
    }
}

pub(crate) fn attribute(
    id: u64,
    permission_id: u64,
    key: &str,
    attribute_type: AttributeType,
    valid_values: Option<AttributeValue>,
) -> Attribute {
    match Attribute::new(
        AttributeId::new(id),
        PermissionId::new(permission_id),
        key,
        attribute_type,
        valid_values,
    ) {
        Ok(attribute) => attribute,
        Err(error) => panic!("invalid test attribute: {error}"),
    }
}

pub(crate) fn role(id: u64, job: &str, grade: i32) -> Role {
    Role {
        id: RoleId::new(id),
        job: job.to_owned(),
        grade,
    }
}

pub(crate) fn grant(role_id: u64, permission_id: u64, value: bool) -> RoleGrant {
    RoleGrant {
        role_id: RoleId::new(role_id),
        permission_id: PermissionId::new(permission_id),
        value,
    }
}

pub(crate) fn role_value(
    role_id: u64,
    attribute_id: u64,
    value: Option<AttributeValue>,
) -> RoleAttributeValue {
    RoleAttributeValue {
        role_id: RoleId::new(role_id),
        attribute_id: AttributeId::new(attribute_id),
        value,
    }
}

pub(crate) fn ceiling(job: &str, attribute_id: u64, max_values: Option<AttributeValue>) -> JobAttributeCeiling {
    JobAttributeCeiling {
        job: job.to_owned(),
        attribute_id: AttributeId::new(attribute_id),
        max_values,
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeStoreState {
    pub permissions: Vec<Permission>,
    pub attributes: Vec<Attribute>,
    pub roles: Vec<Role>,
    pub grants: Vec<RoleGrant>,
    pub values: Vec<RoleAttributeValue>,
    pub ceilings: Vec<JobAttributeCeiling>,
}

/// In-process store with switchable failure and latency.
pub(crate) struct FakePermissionStore {
    state: Mutex<FakeStoreState>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    next_id: AtomicU64,
}

impl FakePermissionStore {
    pub(crate) fn new(state: FakeStoreState) -> Self {
        Self {
            state: Mutex::new(state),
            failing: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            next_id: AtomicU64::new(1_000),
        }
    }

    pub(crate) async fn update(&self, change: impl FnOnce(&mut FakeStoreState)) {
        change(&mut *self.state.lock().await);
    }

    pub(crate) async fn snapshot(&self) -> FakeStoreState {
        self.state.lock().await.clone()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    async fn guard(&self) -> AppResult<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("fake store offline".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for FakePermissionStore {
    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        self.guard().await?;
        Ok(self.state.lock().await.permissions.clone())
    }

    async fn list_attributes(&self) -> AppResult<Vec<Attribute>> {
        self.guard().await?;
        Ok(self.state.lock().await.attributes.clone())
    }

    async fn list_roles(&self, job: Option<&str>) -> AppResult<Vec<Role>> {
        self.guard().await?;
        Ok(self
            .state
            .lock()
            .await
            .roles
            .iter()
            .filter(|role| job.is_none_or(|job| role.job == job))
            .cloned()
            .collect())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        self.guard().await?;
        Ok(self
            .state
            .lock()
            .await
            .roles
            .iter()
            .find(|role| role.id == role_id)
            .cloned())
    }

    async fn list_role_grants(&self, role_id: Option<RoleId>) -> AppResult<Vec<RoleGrant>> {
        self.guard().await?;
        Ok(self
            .state
            .lock()
            .await
            .grants
            .iter()
            .filter(|grant| role_id.is_none_or(|role_id| grant.role_id == role_id))
            .copied()
            .collect())
    }

    async fn list_role_attribute_values(
        &self,
        role_id: Option<RoleId>,
    ) -> AppResult<Vec<RoleAttributeValue>> {
        self.guard().await?;
        Ok(self
            .state
            .lock()
            .await
            .values
            .iter()
            .filter(|value| role_id.is_none_or(|role_id| value.role_id == role_id))
            .cloned()
            .collect())
    }

    async fn list_job_attribute_ceilings(
        &self,
        job: Option<&str>,
    ) -> AppResult<Vec<JobAttributeCeiling>> {
        self.guard().await?;
        Ok(self
            .state
            .lock()
            .await
            .ceilings
            .iter()
            .filter(|ceiling| job.is_none_or(|job| ceiling.job == job))
            .cloned()
            .collect())
    }

    async fn create_permission(&self, input: NewPermission) -> AppResult<Permission> {
        self.guard().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = Permission::new(PermissionId::new(id), input.category, input.name, input.order)?;
        self.state.lock().await.permissions.push(created.clone());
        Ok(created)
    }

    async fn create_attribute(&self, input: NewAttribute) -> AppResult<Attribute> {
        self.guard().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = Attribute::new(
            AttributeId::new(id),
            input.permission_id,
            input.key,
            input.attribute_type,
            input.valid_values,
        )?;
        self.state.lock().await.attributes.push(created.clone());
        Ok(created)
    }

    async fn update_attribute_definition(
        &self,
        attribute_id: AttributeId,
        attribute_type: AttributeType,
        valid_values: Option<AttributeValue>,
    ) -> AppResult<()> {
        self.guard().await?;
        let mut state = self.state.lock().await;
        let Some(existing) = state
            .attributes
            .iter_mut()
            .find(|attribute| attribute.id() == attribute_id)
        else {
            return Err(AppError::NotFound(format!("attribute '{attribute_id}'")));
        };

        *existing = Attribute::new(
            attribute_id,
            existing.permission_id(),
            existing.key(),
            attribute_type,
            valid_values,
        )?;
        Ok(())
    }
}
