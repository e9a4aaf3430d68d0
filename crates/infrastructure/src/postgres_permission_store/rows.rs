use std::str::FromStr;

use rankguard_core::{AppError, AppResult};
use rankguard_domain::{
    Attribute, AttributeId, AttributeType, AttributeValue, JobAttributeCeiling, Permission,
    PermissionId, Role, RoleAttributeValue, RoleGrant, RoleId,
};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub(super) struct PermissionRow {
    pub id: i64,
    pub category: String,
    pub name: String,
    pub display_order: i32,
}

#[derive(Debug, FromRow)]
pub(super) struct AttributeRow {
    pub id: i64,
    pub permission_id: i64,
    pub attr_key: String,
    pub attr_type: String,
    pub valid_values: Option<Value>,
}

#[derive(Debug, FromRow)]
pub(super) struct RoleRow {
    pub id: i64,
    pub job: String,
    pub grade: i32,
}

#[derive(Debug, FromRow)]
pub(super) struct RoleGrantRow {
    pub role_id: i64,
    pub permission_id: i64,
    pub granted: bool,
}

#[derive(Debug, FromRow)]
pub(super) struct RoleAttributeRow {
    pub role_id: i64,
    pub attribute_id: i64,
    pub attr_value: Option<Value>,
}

#[derive(Debug, FromRow)]
pub(super) struct JobAttributeRow {
    pub job: String,
    pub attribute_id: i64,
    pub max_values: Option<Value>,
}

pub(super) fn row_id(value: i64, column: &str) -> AppResult<u64> {
    u64::try_from(value)
        .map_err(|_| AppError::Internal(format!("negative {column} '{value}' in permission store")))
}

pub(super) fn bind_id(value: u64, column: &str) -> AppResult<i64> {
    i64::try_from(value)
        .map_err(|_| AppError::Validation(format!("{column} '{value}' is out of range")))
}

pub(super) fn decode_value(value: Option<Value>, context: &str) -> AppResult<Option<AttributeValue>> {
    value
        .filter(|value| !value.is_null())
        .map(|value| {
            serde_json::from_value::<AttributeValue>(value).map_err(|error| {
                AppError::Internal(format!("failed to decode {context}: {error}"))
            })
        })
        .transpose()
}

pub(super) fn encode_value(value: Option<&AttributeValue>) -> AppResult<Option<Value>> {
    value
        .map(|value| {
            serde_json::to_value(value).map_err(|error| {
                AppError::Internal(format!("failed to encode attribute value: {error}"))
            })
        })
        .transpose()
}

impl PermissionRow {
    pub(super) fn into_domain(self) -> AppResult<Permission> {
        Permission::new(
            PermissionId::new(row_id(self.id, "permission id")?),
            self.category,
            self.name,
            self.display_order,
        )
    }
}

impl AttributeRow {
    pub(super) fn into_domain(self) -> AppResult<Attribute> {
        let attribute_type = AttributeType::from_str(self.attr_type.as_str())?;
        let context = format!("valid values of attribute '{}'", self.id);

        Attribute::new(
            AttributeId::new(row_id(self.id, "attribute id")?),
            PermissionId::new(row_id(self.permission_id, "permission id")?),
            self.attr_key,
            attribute_type,
            decode_value(self.valid_values, context.as_str())?,
        )
    }
}

impl RoleRow {
    pub(super) fn into_domain(self) -> AppResult<Role> {
        Ok(Role {
            id: RoleId::new(row_id(self.id, "role id")?),
            job: self.job,
            grade: self.grade,
        })
    }
}

impl RoleGrantRow {
    pub(super) fn into_domain(self) -> AppResult<RoleGrant> {
        Ok(RoleGrant {
            role_id: RoleId::new(row_id(self.role_id, "role id")?),
            permission_id: PermissionId::new(row_id(self.permission_id, "permission id")?),
            value: self.granted,
        })
    }
}

impl RoleAttributeRow {
    pub(super) fn into_domain(self) -> AppResult<RoleAttributeValue> {
        let context = format!(
            "value of attribute '{}' for role '{}'",
            self.attribute_id, self.role_id
        );

        Ok(RoleAttributeValue {
            role_id: RoleId::new(row_id(self.role_id, "role id")?),
            attribute_id: AttributeId::new(row_id(self.attribute_id, "attribute id")?),
            value: decode_value(self.attr_value, context.as_str())?,
        })
    }
}

impl JobAttributeRow {
    pub(super) fn into_domain(self) -> AppResult<JobAttributeCeiling> {
        let context = format!(
            "ceiling of attribute '{}' for job '{}'",
            self.attribute_id, self.job
        );

        Ok(JobAttributeCeiling {
            attribute_id: AttributeId::new(row_id(self.attribute_id, "attribute id")?),
            max_values: decode_value(self.max_values, context.as_str())?,
            job: self.job,
        })
    }
}
