use std::fmt::{Display, Formatter};

use rankguard_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeType, AttributeValue};
use crate::guard::guard_name;

/// Numeric identifier of a permission row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionId(u64);

impl PermissionId {
    /// Creates a permission identifier from its stored value.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying numeric value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for PermissionId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Numeric identifier of a `(job, grade)` role row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(u64);

impl RoleId {
    /// Creates a role identifier from its stored value.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying numeric value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Numeric identifier of an attribute catalog row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeId(u64);

impl AttributeId {
    /// Creates an attribute identifier from its stored value.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying numeric value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for AttributeId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A named capability identified by `(category, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    id: PermissionId,
    category: String,
    name: String,
    guard_name: String,
    order: i32,
}

impl Permission {
    /// Creates a permission and derives its guard name.
    pub fn new(
        id: PermissionId,
        category: impl Into<String>,
        name: impl Into<String>,
        order: i32,
    ) -> AppResult<Self> {
        let category = category.into();
        let name = name.into();
        let guard_name = guard_name(category.as_str(), name.as_str());

        if guard_name.is_empty() {
            return Err(AppError::Validation(format!(
                "permission '{category}/{name}' does not produce a guard name"
            )));
        }

        Ok(Self {
            id,
            category,
            name,
            guard_name,
            order,
        })
    }

    /// Returns the permission identifier.
    #[must_use]
    pub fn id(&self) -> PermissionId {
        self.id
    }

    /// Returns the permission category, usually a service name.
    #[must_use]
    pub fn category(&self) -> &str {
        self.category.as_str()
    }

    /// Returns the permission name within its category.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the canonical lookup key.
    #[must_use]
    pub fn guard_name(&self) -> &str {
        self.guard_name.as_str()
    }

    /// Returns the display order.
    #[must_use]
    pub fn order(&self) -> i32 {
        self.order
    }
}

/// The unique `(job, grade)` pair that grants and attribute values attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role identifier.
    pub id: RoleId,
    /// Job code owning the role.
    pub job: String,
    /// Grade within the job; higher is more senior.
    pub grade: i32,
}

/// Explicit allow or deny of one permission for one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    /// Role the grant belongs to.
    pub role_id: RoleId,
    /// Granted permission.
    pub permission_id: PermissionId,
    /// `true` allows, `false` explicitly denies.
    pub value: bool,
}

/// Typed constraint attached to a permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    id: AttributeId,
    permission_id: PermissionId,
    key: String,
    attribute_type: AttributeType,
    valid_values: AttributeValue,
}

impl Attribute {
    /// Creates an attribute definition.
    ///
    /// Absent `valid_values` are normalized to the empty form of `attribute_type`.
    pub fn new(
        id: AttributeId,
        permission_id: PermissionId,
        key: impl Into<String>,
        attribute_type: AttributeType,
        valid_values: Option<AttributeValue>,
    ) -> AppResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "attribute '{id}' of permission '{permission_id}' must have a key"
            )));
        }

        let valid_values = AttributeValue::or_default(valid_values, attribute_type)?;

        Ok(Self {
            id,
            permission_id,
            key,
            attribute_type,
            valid_values,
        })
    }

    /// Returns the attribute identifier.
    #[must_use]
    pub fn id(&self) -> AttributeId {
        self.id
    }

    /// Returns the permission the attribute belongs to.
    #[must_use]
    pub fn permission_id(&self) -> PermissionId {
        self.permission_id
    }

    /// Returns the attribute key, unique per permission.
    #[must_use]
    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    /// Returns the attribute value type.
    #[must_use]
    pub fn attribute_type(&self) -> AttributeType {
        self.attribute_type
    }

    /// Returns the globally valid values. Empty means unrestricted.
    #[must_use]
    pub fn valid_values(&self) -> &AttributeValue {
        &self.valid_values
    }
}

/// Per-job ceiling narrowing what any role of the job may be granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAttributeCeiling {
    /// Job code the ceiling applies to.
    pub job: String,
    /// Constrained attribute.
    pub attribute_id: AttributeId,
    /// Maximum values; absent means the empty form of the attribute type.
    pub max_values: Option<AttributeValue>,
}

/// Attribute value configured for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAttributeValue {
    /// Role owning the value.
    pub role_id: RoleId,
    /// Attribute the value is for.
    pub attribute_id: AttributeId,
    /// Configured value; absent means the empty form of the attribute type.
    pub value: Option<AttributeValue>,
}

#[cfg(test)]
mod tests {
    use crate::attribute::{AttributeType, AttributeValue, StringList};

    use super::{Attribute, AttributeId, Permission, PermissionId};

    #[test]
    fn permission_derives_guard_name() {
        let permission = Permission::new(
            PermissionId::new(1),
            "settings.LawsService",
            "CreateOrUpdateLawBook",
            10,
        );
        assert!(permission.is_ok());
        assert_eq!(
            permission.map(|value| value.guard_name().to_owned()).ok(),
            Some("settings-lawsservice-createorupdatelawbook".to_owned())
        );
    }

    #[test]
    fn permission_rejects_blank_identity() {
        let permission = Permission::new(PermissionId::new(1), "..", " ", 0);
        assert!(permission.is_err());
    }

    #[test]
    fn attribute_defaults_missing_valid_values() {
        let attribute = Attribute::new(
            AttributeId::new(3),
            PermissionId::new(1),
            "Players",
            AttributeType::JobGradeList,
            None,
        );
        let Ok(attribute) = attribute else {
            panic!("attribute should be valid");
        };
        assert!(attribute.valid_values().is_empty());
        assert_eq!(attribute.valid_values().kind(), AttributeType::JobGradeList);
    }

    #[test]
    fn attribute_rejects_mismatched_valid_values() {
        let attribute = Attribute::new(
            AttributeId::new(3),
            PermissionId::new(1),
            "Players",
            AttributeType::JobGradeList,
            Some(AttributeValue::StringList(StringList::new(["a"]))),
        );
        assert!(attribute.is_err());
    }
}
