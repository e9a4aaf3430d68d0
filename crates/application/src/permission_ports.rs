use async_trait::async_trait;
use rankguard_core::AppResult;
use rankguard_domain::{
    Attribute, AttributeId, AttributeType, AttributeValue, InvalidationEvent, JobAttributeCeiling,
    Permission, PermissionId, Role, RoleAttributeValue, RoleGrant, RoleId,
};

/// Input payload for registering a declared permission in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPermission {
    /// Permission category.
    pub category: String,
    /// Permission name.
    pub name: String,
    /// Display order.
    pub order: i32,
}

/// Input payload for registering a declared attribute in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttribute {
    /// Owning permission.
    pub permission_id: PermissionId,
    /// Attribute key, unique per permission.
    pub key: String,
    /// Value type.
    pub attribute_type: AttributeType,
    /// Globally valid values.
    pub valid_values: Option<AttributeValue>,
}

/// Store port returning typed permission rows, optionally scoped.
///
/// Apart from registering declared permissions at startup the engine only reads.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Lists every permission.
    async fn list_permissions(&self) -> AppResult<Vec<Permission>>;

    /// Lists every attribute with its catalog valid values.
    async fn list_attributes(&self) -> AppResult<Vec<Attribute>>;

    /// Lists roles, optionally restricted to one job.
    async fn list_roles(&self, job: Option<&str>) -> AppResult<Vec<Role>>;

    /// Finds one role by id.
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Lists explicit grants, optionally restricted to one role.
    async fn list_role_grants(&self, role_id: Option<RoleId>) -> AppResult<Vec<RoleGrant>>;

    /// Lists role attribute values, optionally restricted to one role.
    async fn list_role_attribute_values(
        &self,
        role_id: Option<RoleId>,
    ) -> AppResult<Vec<RoleAttributeValue>>;

    /// Lists job attribute ceilings, optionally restricted to one job.
    async fn list_job_attribute_ceilings(
        &self,
        job: Option<&str>,
    ) -> AppResult<Vec<JobAttributeCeiling>>;

    /// Creates a permission row and returns it with its assigned id.
    async fn create_permission(&self, input: NewPermission) -> AppResult<Permission>;

    /// Creates an attribute row and returns it with its assigned id.
    async fn create_attribute(&self, input: NewAttribute) -> AppResult<Attribute>;

    /// Replaces the type and catalog valid values of an existing attribute.
    async fn update_attribute_definition(
        &self,
        attribute_id: AttributeId,
        attribute_type: AttributeType,
        valid_values: Option<AttributeValue>,
    ) -> AppResult<()>;
}

/// One event delivered by the invalidation bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationMessage {
    /// Bus-assigned delivery identifier used for acknowledgement.
    pub delivery_id: String,
    /// Decoded event.
    pub event: InvalidationEvent,
}

/// Bus port opening invalidation subscriptions.
#[async_trait]
pub trait InvalidationBus: Send + Sync {
    /// Opens a subscription to every invalidation subject.
    async fn subscribe(&self) -> AppResult<Box<dyn InvalidationSubscription>>;
}

/// Live subscription on the invalidation bus.
#[async_trait]
pub trait InvalidationSubscription: Send {
    /// Waits for the next event. `None` means the subscription was closed.
    async fn next_message(&mut self) -> AppResult<Option<InvalidationMessage>>;

    /// Acknowledges a processed message.
    async fn acknowledge(&mut self, message: &InvalidationMessage) -> AppResult<()>;
}

/// Bus port used by role-management code to emit invalidation events.
#[async_trait]
pub trait InvalidationPublisher: Send + Sync {
    /// Publishes one event on its subject.
    async fn publish(&self, event: &InvalidationEvent) -> AppResult<()>;
}
