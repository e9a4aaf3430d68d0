//! Bootstrap and scoped reload of the permission caches.
//!
//! Every reload fetches all rows of its scope before touching a cache, so a failed
//! or timed-out query leaves the previous cache state in place.

mod prepare;
mod registration;

use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rankguard_core::{AppError, AppResult};
use rankguard_domain::{Attribute, AttributeId, AttributeValue, PermissionId, Role, RoleId};
use tracing::{debug, info};

use crate::permission_cache::{PermissionCaches, ReconcileStats};
use crate::permission_ports::PermissionStore;

pub use registration::RegistrationReport;

use prepare::{prepare_attribute_values, prepare_ceilings, prepare_grants};

/// Part of the caches a reload refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReloadScope {
    /// Every cache.
    All,
    /// Role row, grants and attribute values of one role.
    Role(RoleId),
    /// Roles, grants, attribute values and ceilings of one job.
    Job(String),
}

impl Display for ReloadScope {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => formatter.write_str("all"),
            Self::Role(role_id) => write!(formatter, "role:{role_id}"),
            Self::Job(job) => write!(formatter, "job:{job}"),
        }
    }
}

/// Totals of one reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReloadReport {
    /// Keys written from fresh rows.
    pub upserted: usize,
    /// Cached keys removed because the store no longer returns them.
    pub removed: usize,
    /// Rows ignored because they reference unknown roles, permissions or attributes.
    pub skipped: usize,
    /// Role attribute values narrowed by the catalog or a job ceiling.
    pub clamped: usize,
}

impl ReloadReport {
    fn absorb(&mut self, stats: ReconcileStats) {
        self.upserted += stats.upserted;
        self.removed += stats.removed;
    }
}

/// Loads store rows into the caches.
pub struct PermissionLoader {
    store: Arc<dyn PermissionStore>,
    caches: Arc<PermissionCaches>,
    reload_timeout: Duration,
}

impl PermissionLoader {
    /// Creates a loader writing into `caches`.
    #[must_use]
    pub fn new(
        store: Arc<dyn PermissionStore>,
        caches: Arc<PermissionCaches>,
        reload_timeout: Duration,
    ) -> Self {
        Self {
            store,
            caches,
            reload_timeout,
        }
    }

    /// Reloads one scope.
    pub async fn reload(&self, scope: &ReloadScope) -> AppResult<ReloadReport> {
        match scope {
            ReloadScope::All => self.load_all().await,
            ReloadScope::Role(role_id) => self.reload_role(*role_id).await,
            ReloadScope::Job(job) => self.reload_job(job.as_str()).await,
        }
    }

    /// Loads every cache from the store.
    ///
    /// Stages apply in order: permissions, attributes, roles, grants, role attribute
    /// values, job ceilings.
    pub async fn load_all(&self) -> AppResult<ReloadReport> {
        let permissions = self
            .fetch("permissions", self.store.list_permissions())
            .await?;
        let attributes = self
            .fetch("attributes", self.store.list_attributes())
            .await?;
        let roles = self.fetch("roles", self.store.list_roles(None)).await?;
        let grants = self
            .fetch("role grants", self.store.list_role_grants(None))
            .await?;
        let values = self
            .fetch(
                "role attribute values",
                self.store.list_role_attribute_values(None),
            )
            .await?;
        let ceilings = self
            .fetch(
                "job attribute ceilings",
                self.store.list_job_attribute_ceilings(None),
            )
            .await?;

        let mut report = ReloadReport::default();
        let permission_ids: HashSet<PermissionId> =
            permissions.iter().map(|permission| permission.id()).collect();
        let attributes_by_id: HashMap<AttributeId, Attribute> = attributes
            .iter()
            .filter(|attribute| permission_ids.contains(&attribute.permission_id()))
            .map(|attribute| (attribute.id(), attribute.clone()))
            .collect();
        let roles_by_id: HashMap<RoleId, Role> =
            roles.iter().map(|role| (role.id, role.clone())).collect();

        let grants = prepare_grants(
            grants,
            |role_id| roles_by_id.contains_key(&role_id),
            |permission_id| permission_ids.contains(&permission_id),
            &mut report,
        );
        let ceilings = prepare_ceilings(
            ceilings,
            |attribute_id| attributes_by_id.get(&attribute_id).cloned(),
            &mut report,
        )?;
        let values = prepare_attribute_values(
            values,
            |role_id| roles_by_id.get(&role_id).map(|role| role.job.clone()),
            |attribute_id| attributes_by_id.get(&attribute_id).cloned(),
            |job, attribute_id| ceiling_in(&ceilings, job, attribute_id),
            &mut report,
        )?;

        report.absorb(self.caches.catalog.replace_permissions(permissions));
        report.absorb(
            self.caches
                .catalog
                .replace_attributes(attributes_by_id.into_values().collect()),
        );
        report.absorb(self.caches.roles.replace_all(roles));
        self.apply_role_grants(grants, self.caches.grants.role_ids(), &mut report);
        self.apply_role_values(values, self.caches.attributes.role_ids(), &mut report);
        self.apply_ceilings(ceilings, self.caches.ceilings.jobs(), &mut report);

        info!(
            upserted = report.upserted,
            removed = report.removed,
            skipped = report.skipped,
            clamped = report.clamped,
            "permission caches loaded"
        );

        Ok(report)
    }

    /// Reloads the role row and grants of one role.
    pub async fn reload_role_grants(&self, role_id: RoleId) -> AppResult<ReloadReport> {
        let role = self
            .fetch("role", self.store.find_role(role_id))
            .await?;
        let grants = self
            .fetch("role grants", self.store.list_role_grants(Some(role_id)))
            .await?;

        let mut report = ReloadReport::default();
        let Some(role) = role else {
            self.forget_role(role_id, &mut report);
            return Ok(report);
        };

        let grants = prepare_grants(
            grants,
            |candidate| candidate == role_id,
            |permission_id| self.caches.catalog.permission(permission_id).is_some(),
            &mut report,
        );

        self.caches.roles.upsert(role);
        self.apply_role_grants(grants, vec![role_id], &mut report);

        debug!(role_id = %role_id, upserted = report.upserted, removed = report.removed, "role grants reloaded");
        Ok(report)
    }

    /// Reloads the role row and attribute values of one role.
    pub async fn reload_role_attributes(&self, role_id: RoleId) -> AppResult<ReloadReport> {
        let role = self
            .fetch("role", self.store.find_role(role_id))
            .await?;
        let values = self
            .fetch(
                "role attribute values",
                self.store.list_role_attribute_values(Some(role_id)),
            )
            .await?;

        let mut report = ReloadReport::default();
        let Some(role) = role else {
            self.forget_role(role_id, &mut report);
            return Ok(report);
        };

        let job = role.job.clone();
        let values = prepare_attribute_values(
            values,
            |candidate| (candidate == role_id).then(|| job.clone()),
            |attribute_id| self.caches.catalog.attribute(attribute_id),
            |job, attribute_id| self.caches.ceilings.ceiling(job, attribute_id),
            &mut report,
        )?;

        self.caches.roles.upsert(role);
        self.apply_role_values(values, vec![role_id], &mut report);

        debug!(role_id = %role_id, upserted = report.upserted, removed = report.removed, "role attributes reloaded");
        Ok(report)
    }

    /// Reloads grants and attribute values of one role.
    pub async fn reload_role(&self, role_id: RoleId) -> AppResult<ReloadReport> {
        let mut report = self.reload_role_grants(role_id).await?;
        let attributes = self.reload_role_attributes(role_id).await?;

        report.upserted += attributes.upserted;
        report.removed += attributes.removed;
        report.skipped += attributes.skipped;
        report.clamped += attributes.clamped;
        Ok(report)
    }

    /// Reloads roles, grants, attribute values and ceilings of one job.
    pub async fn reload_job(&self, job: &str) -> AppResult<ReloadReport> {
        let roles = self
            .fetch("roles", self.store.list_roles(Some(job)))
            .await?;
        let ceilings = self
            .fetch(
                "job attribute ceilings",
                self.store.list_job_attribute_ceilings(Some(job)),
            )
            .await?;

        let mut grants = Vec::new();
        let mut values = Vec::new();
        for role in &roles {
            grants.extend(
                self.fetch("role grants", self.store.list_role_grants(Some(role.id)))
                    .await?,
            );
            values.extend(
                self.fetch(
                    "role attribute values",
                    self.store.list_role_attribute_values(Some(role.id)),
                )
                .await?,
            );
        }

        let mut report = ReloadReport::default();
        let roles: Vec<Role> = roles.into_iter().filter(|role| role.job == job).collect();
        let roles_by_id: HashMap<RoleId, Role> =
            roles.iter().map(|role| (role.id, role.clone())).collect();

        let grants = prepare_grants(
            grants,
            |role_id| roles_by_id.contains_key(&role_id),
            |permission_id| self.caches.catalog.permission(permission_id).is_some(),
            &mut report,
        );
        let ceilings = prepare_ceilings(
            ceilings.into_iter().filter(|ceiling| ceiling.job == job).collect(),
            |attribute_id| self.caches.catalog.attribute(attribute_id),
            &mut report,
        )?;
        let values = prepare_attribute_values(
            values,
            |role_id| roles_by_id.get(&role_id).map(|role| role.job.clone()),
            |attribute_id| self.caches.catalog.attribute(attribute_id),
            |job, attribute_id| ceiling_in(&ceilings, job, attribute_id),
            &mut report,
        )?;

        let mut affected_roles = self.caches.roles.job_roles(job);
        affected_roles.extend(roles_by_id.keys().copied());
        report.absorb(self.caches.roles.replace_job(job, roles));
        self.apply_role_grants(grants, affected_roles.clone(), &mut report);
        self.apply_role_values(values, affected_roles, &mut report);
        self.apply_ceilings(ceilings, vec![job.to_owned()], &mut report);

        debug!(job = %job, upserted = report.upserted, removed = report.removed, "job scope reloaded");
        Ok(report)
    }

    async fn fetch<T>(
        &self,
        what: &str,
        query: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        tokio::time::timeout(self.reload_timeout, query)
            .await
            .map_err(|_| {
                AppError::Unavailable(format!(
                    "loading {what} timed out after {}ms",
                    self.reload_timeout.as_millis()
                ))
            })?
    }

    fn forget_role(&self, role_id: RoleId, report: &mut ReloadReport) {
        if self.caches.roles.remove(role_id).is_some() {
            report.removed += 1;
        }
        report.absorb(self.caches.grants.replace_role(role_id, Vec::new()));
        report.absorb(self.caches.attributes.replace_role(role_id, Vec::new()));
        debug!(role_id = %role_id, "role no longer exists, cached state dropped");
    }

    fn apply_role_grants(
        &self,
        mut grants: HashMap<RoleId, Vec<(PermissionId, bool)>>,
        previous: Vec<RoleId>,
        report: &mut ReloadReport,
    ) {
        for role_id in previous {
            if !grants.contains_key(&role_id) {
                report.absorb(self.caches.grants.replace_role(role_id, Vec::new()));
            }
        }
        for (role_id, role_grants) in grants.drain() {
            report.absorb(self.caches.grants.replace_role(role_id, role_grants));
        }
    }

    fn apply_role_values(
        &self,
        mut values: HashMap<RoleId, Vec<(AttributeId, AttributeValue)>>,
        previous: Vec<RoleId>,
        report: &mut ReloadReport,
    ) {
        for role_id in previous {
            if !values.contains_key(&role_id) {
                report.absorb(self.caches.attributes.replace_role(role_id, Vec::new()));
            }
        }
        for (role_id, role_values) in values.drain() {
            report.absorb(self.caches.attributes.replace_role(role_id, role_values));
        }
    }

    fn apply_ceilings(
        &self,
        ceilings: HashMap<String, HashMap<AttributeId, AttributeValue>>,
        previous: Vec<String>,
        report: &mut ReloadReport,
    ) {
        for job in previous {
            if !ceilings.contains_key(&job) {
                report.absorb(self.caches.ceilings.replace_job(job.as_str(), Vec::new()));
            }
        }
        for (job, job_ceilings) in ceilings {
            report.absorb(
                self.caches
                    .ceilings
                    .replace_job(job.as_str(), job_ceilings.into_iter().collect()),
            );
        }
    }
}

fn ceiling_in(
    ceilings: &HashMap<String, HashMap<AttributeId, AttributeValue>>,
    job: &str,
    attribute_id: AttributeId,
) -> Option<AttributeValue> {
    ceilings
        .get(job)
        .and_then(|job_ceilings| job_ceilings.get(&attribute_id))
        .cloned()
}
