use std::collections::HashSet;

use rankguard_core::{AppError, AppResult};
use rankguard_domain::{AttributeType, AttributeValue, guard_name};

/// Attribute declared by service code for one permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDefinition {
    /// Attribute key, unique per permission.
    pub key: String,
    /// Value type.
    pub attribute_type: AttributeType,
    /// Globally valid values; `None` means unrestricted.
    pub valid_values: Option<AttributeValue>,
}

/// Permission declared by service code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDefinition {
    /// Permission category.
    pub category: String,
    /// Permission name.
    pub name: String,
    /// Display order.
    pub order: i32,
    /// Declared attributes.
    pub attributes: Vec<AttributeDefinition>,
}

impl PermissionDefinition {
    /// Creates a definition without attributes.
    #[must_use]
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            order: 0,
            attributes: Vec::new(),
        }
    }

    /// Sets the display order.
    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Declares one attribute.
    #[must_use]
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        attribute_type: AttributeType,
        valid_values: Option<AttributeValue>,
    ) -> Self {
        self.attributes.push(AttributeDefinition {
            key: key.into(),
            attribute_type,
            valid_values,
        });
        self
    }

    /// Returns the guard name the definition registers under.
    #[must_use]
    pub fn guard_name(&self) -> String {
        guard_name(self.category.as_str(), self.name.as_str())
    }
}

/// Catalog of permissions declared by the services using the engine.
///
/// Built once at startup and handed to the engine; there is no global registry.
#[derive(Debug, Clone, Default)]
pub struct PermissionRegistry {
    definitions: Vec<PermissionDefinition>,
    guards: HashSet<String>,
}

impl PermissionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one definition.
    pub fn register(&mut self, definition: PermissionDefinition) -> AppResult<()> {
        let guard = definition.guard_name();
        if guard.is_empty() {
            return Err(AppError::Validation(format!(
                "permission '{}/{}' does not produce a guard name",
                definition.category, definition.name
            )));
        }

        let mut keys = HashSet::new();
        for attribute in &definition.attributes {
            if let Some(valid_values) = &attribute.valid_values
                && valid_values.kind() != attribute.attribute_type
            {
                return Err(AppError::Validation(format!(
                    "attribute '{}' of permission '{guard}' declares valid values of type '{}' for type '{}'",
                    attribute.key,
                    valid_values.kind(),
                    attribute.attribute_type
                )));
            }
            if !keys.insert(attribute.key.as_str()) {
                return Err(AppError::Conflict(format!(
                    "attribute '{}' is declared twice for permission '{guard}'",
                    attribute.key
                )));
            }
        }

        if !self.guards.insert(guard.clone()) {
            return Err(AppError::Conflict(format!(
                "permission '{guard}' is declared twice"
            )));
        }

        self.definitions.push(definition);
        Ok(())
    }

    /// Adds several definitions.
    pub fn register_all(
        &mut self,
        definitions: impl IntoIterator<Item = PermissionDefinition>,
    ) -> AppResult<()> {
        for definition in definitions {
            self.register(definition)?;
        }

        Ok(())
    }

    /// Returns every declared permission in declaration order.
    #[must_use]
    pub fn definitions(&self) -> &[PermissionDefinition] {
        self.definitions.as_slice()
    }

    /// Returns whether a guard name is declared.
    #[must_use]
    pub fn contains(&self, guard_name: &str) -> bool {
        self.guards.contains(guard_name)
    }

    /// Returns the number of declared permissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns whether nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
