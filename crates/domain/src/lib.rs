//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod attribute;
mod guard;
mod invalidation;
mod security;

pub use attribute::{AttributeType, AttributeValue, CheckOutcome, JobGradeList, StringList};
pub use guard::{attribute_guard_name, guard_name, slugify};
pub use invalidation::{InvalidationEvent, InvalidationSubject};
pub use security::{
    Attribute, AttributeId, JobAttributeCeiling, Permission, PermissionId, Role, RoleAttributeValue,
    RoleGrant, RoleId,
};
