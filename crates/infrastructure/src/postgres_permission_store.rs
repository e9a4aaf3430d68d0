mod rows;

use async_trait::async_trait;
use rankguard_application::{NewAttribute, NewPermission, PermissionStore};
use rankguard_core::{AppError, AppResult};
use rankguard_domain::{
    Attribute, AttributeId, AttributeType, AttributeValue, JobAttributeCeiling, Permission,
    Role, RoleAttributeValue, RoleGrant, RoleId, guard_name,
};
use sqlx::PgPool;

use rows::{
    AttributeRow, JobAttributeRow, PermissionRow, RoleAttributeRow, RoleGrantRow, RoleRow,
    bind_id, encode_value,
};

/// PostgreSQL-backed permission store.
#[derive(Clone)]
pub struct PostgresPermissionStore {
    pool: PgPool,
}

impl PostgresPermissionStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_error(action: &str, error: sqlx::Error) -> AppError {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            AppError::Unavailable(format!("failed to {action}: {error}"))
        }
        _ => AppError::Internal(format!("failed to {action}: {error}")),
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(database_error) = error
        && database_error.code().as_deref() == Some("23505")
    {
        return true;
    }

    false
}

#[async_trait]
impl PermissionStore for PostgresPermissionStore {
    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT id, category, name, display_order
            FROM rbac_permissions
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error("list permissions", error))?;

        rows.into_iter().map(PermissionRow::into_domain).collect()
    }

    async fn list_attributes(&self) -> AppResult<Vec<Attribute>> {
        let rows = sqlx::query_as::<_, AttributeRow>(
            r#"
            SELECT id, permission_id, attr_key, attr_type, valid_values
            FROM rbac_attributes
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error("list attributes", error))?;

        rows.into_iter().map(AttributeRow::into_domain).collect()
    }

    async fn list_roles(&self, job: Option<&str>) -> AppResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, job, grade
            FROM rbac_roles
            WHERE ($1::TEXT IS NULL OR job = $1)
            ORDER BY job, grade
            "#,
        )
        .bind(job)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error("list roles", error))?;

        rows.into_iter().map(RoleRow::into_domain).collect()
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, job, grade
            FROM rbac_roles
            WHERE id = $1
            "#,
        )
        .bind(bind_id(role_id.as_u64(), "role id")?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error("find role", error))?;

        row.map(RoleRow::into_domain).transpose()
    }

    async fn list_role_grants(&self, role_id: Option<RoleId>) -> AppResult<Vec<RoleGrant>> {
        let role_id = role_id
            .map(|role_id| bind_id(role_id.as_u64(), "role id"))
            .transpose()?;
        let rows = sqlx::query_as::<_, RoleGrantRow>(
            r#"
            SELECT role_id, permission_id, granted
            FROM rbac_role_permissions
            WHERE ($1::BIGINT IS NULL OR role_id = $1)
            ORDER BY role_id, permission_id
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error("list role grants", error))?;

        rows.into_iter().map(RoleGrantRow::into_domain).collect()
    }

    async fn list_role_attribute_values(
        &self,
        role_id: Option<RoleId>,
    ) -> AppResult<Vec<RoleAttributeValue>> {
        let role_id = role_id
            .map(|role_id| bind_id(role_id.as_u64(), "role id"))
            .transpose()?;
        let rows = sqlx::query_as::<_, RoleAttributeRow>(
            r#"
            SELECT role_id, attribute_id, attr_value
            FROM rbac_role_attributes
            WHERE ($1::BIGINT IS NULL OR role_id = $1)
            ORDER BY role_id, attribute_id
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error("list role attribute values", error))?;

        rows.into_iter().map(RoleAttributeRow::into_domain).collect()
    }

    async fn list_job_attribute_ceilings(
        &self,
        job: Option<&str>,
    ) -> AppResult<Vec<JobAttributeCeiling>> {
        let rows = sqlx::query_as::<_, JobAttributeRow>(
            r#"
            SELECT job, attribute_id, max_values
            FROM rbac_job_attributes
            WHERE ($1::TEXT IS NULL OR job = $1)
            ORDER BY job, attribute_id
            "#,
        )
        .bind(job)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error("list job attribute ceilings", error))?;

        rows.into_iter().map(JobAttributeRow::into_domain).collect()
    }

    async fn create_permission(&self, input: NewPermission) -> AppResult<Permission> {
        let guard = guard_name(input.category.as_str(), input.name.as_str());
        let row = sqlx::query_as::<_, PermissionRow>(
            r#"
            INSERT INTO rbac_permissions (category, name, guard_name, display_order)
            VALUES ($1, $2, $3, $4)
            RETURNING id, category, name, display_order
            "#,
        )
        .bind(input.category.as_str())
        .bind(input.name.as_str())
        .bind(guard.as_str())
        .bind(input.order)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                return AppError::Conflict(format!("permission '{guard}' already exists"));
            }
            store_error("create permission", error)
        })?;

        row.into_domain()
    }

    async fn create_attribute(&self, input: NewAttribute) -> AppResult<Attribute> {
        let valid_values = encode_value(input.valid_values.as_ref())?;
        let row = sqlx::query_as::<_, AttributeRow>(
            r#"
            INSERT INTO rbac_attributes (permission_id, attr_key, attr_type, valid_values)
            VALUES ($1, $2, $3, $4)
            RETURNING id, permission_id, attr_key, attr_type, valid_values
            "#,
        )
        .bind(bind_id(input.permission_id.as_u64(), "permission id")?)
        .bind(input.key.as_str())
        .bind(input.attribute_type.as_str())
        .bind(valid_values)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                return AppError::Conflict(format!(
                    "attribute '{}' already exists for permission '{}'",
                    input.key, input.permission_id
                ));
            }
            store_error("create attribute", error)
        })?;

        row.into_domain()
    }

    async fn update_attribute_definition(
        &self,
        attribute_id: AttributeId,
        attribute_type: AttributeType,
        valid_values: Option<AttributeValue>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE rbac_attributes
            SET attr_type = $2, valid_values = $3
            WHERE id = $1
            "#,
        )
        .bind(bind_id(attribute_id.as_u64(), "attribute id")?)
        .bind(attribute_type.as_str())
        .bind(encode_value(valid_values.as_ref())?)
        .execute(&self.pool)
        .await
        .map_err(|error| store_error("update attribute definition", error))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "attribute '{attribute_id}' does not exist"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
