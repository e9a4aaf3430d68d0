use serde::{Deserialize, Serialize};

/// Caller identity evaluated by permission checks.
///
/// The identity is already authenticated; it only carries what the resolver needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessIdentity {
    user_id: u64,
    job: String,
    grade: i32,
    superuser: bool,
}

impl AccessIdentity {
    /// Creates a regular (non-superuser) identity for one job and grade.
    #[must_use]
    pub fn new(user_id: u64, job: impl Into<String>, grade: i32) -> Self {
        Self {
            user_id,
            job: job.into(),
            grade,
            superuser: false,
        }
    }

    /// Returns the identity with the superuser flag set to `superuser`.
    #[must_use]
    pub fn with_superuser(mut self, superuser: bool) -> Self {
        self.superuser = superuser;
        self
    }

    /// Returns the stable user identifier.
    #[must_use]
    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Returns the job code of the identity.
    #[must_use]
    pub fn job(&self) -> &str {
        self.job.as_str()
    }

    /// Returns the grade within the job.
    #[must_use]
    pub fn grade(&self) -> i32 {
        self.grade
    }

    /// Returns whether the identity bypasses all permission checks.
    #[must_use]
    pub fn is_superuser(&self) -> bool {
        self.superuser
    }
}
