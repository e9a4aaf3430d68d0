use std::str::FromStr;

use rankguard_core::AppError;
use serde::{Deserialize, Serialize};

use crate::security::RoleId;

/// Bus subjects carrying cache invalidation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationSubject {
    /// Grants of one role changed.
    RolePermUpdate,
    /// Attribute values of one role changed.
    RoleAttrUpdate,
    /// Attribute ceilings of one job changed.
    JobAttrUpdate,
}

impl InvalidationSubject {
    /// Returns the stable bus subject name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RolePermUpdate => "perms.roleperm.update",
            Self::RoleAttrUpdate => "perms.roleattr.update",
            Self::JobAttrUpdate => "perms.jobattr.update",
        }
    }

    /// Returns all subjects the engine consumes.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[InvalidationSubject] = &[
            InvalidationSubject::RolePermUpdate,
            InvalidationSubject::RoleAttrUpdate,
            InvalidationSubject::JobAttrUpdate,
        ];

        ALL
    }
}

impl FromStr for InvalidationSubject {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "perms.roleperm.update" => Ok(Self::RolePermUpdate),
            "perms.roleattr.update" => Ok(Self::RoleAttrUpdate),
            "perms.jobattr.update" => Ok(Self::JobAttrUpdate),
            _ => Err(AppError::Validation(format!(
                "unknown invalidation subject '{value}'"
            ))),
        }
    }
}

/// Decoded cache invalidation event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidationEvent {
    /// Reload the grants of one role.
    RolePermUpdate {
        /// Affected role.
        role_id: RoleId,
    },
    /// Reload the attribute values of one role.
    RoleAttrUpdate {
        /// Affected role.
        role_id: RoleId,
    },
    /// Reload everything scoped to one job, including its attribute ceilings.
    JobAttrUpdate {
        /// Affected job.
        job: String,
    },
}

impl InvalidationEvent {
    /// Returns the subject the event travels on.
    #[must_use]
    pub fn subject(&self) -> InvalidationSubject {
        match self {
            Self::RolePermUpdate { .. } => InvalidationSubject::RolePermUpdate,
            Self::RoleAttrUpdate { .. } => InvalidationSubject::RoleAttrUpdate,
            Self::JobAttrUpdate { .. } => InvalidationSubject::JobAttrUpdate,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::security::RoleId;

    use super::{InvalidationEvent, InvalidationSubject};

    #[test]
    fn subject_round_trips_storage_value() {
        for subject in InvalidationSubject::all() {
            assert_eq!(
                InvalidationSubject::from_str(subject.as_str()).ok(),
                Some(*subject)
            );
        }
    }

    #[test]
    fn unknown_subject_is_rejected() {
        assert!(InvalidationSubject::from_str("perms.role.delete").is_err());
    }

    #[test]
    fn event_reports_its_subject() {
        let event = InvalidationEvent::RoleAttrUpdate {
            role_id: RoleId::new(4),
        };
        assert_eq!(event.subject(), InvalidationSubject::RoleAttrUpdate);
    }
}
