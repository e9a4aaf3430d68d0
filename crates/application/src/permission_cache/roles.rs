use std::collections::{BTreeMap, HashMap, HashSet};

use dashmap::DashMap;
use rankguard_domain::{Role, RoleId};

use super::ReconcileStats;

/// `(job, grade)` ⇄ role id and role id ⇄ job.
#[derive(Default)]
pub struct RoleCache {
    roles: DashMap<RoleId, Role>,
    job_grades: DashMap<String, BTreeMap<i32, RoleId>>,
}

impl RoleCache {
    /// Returns one role by id.
    #[must_use]
    pub fn role(&self, role_id: RoleId) -> Option<Role> {
        self.roles.get(&role_id).map(|entry| entry.value().clone())
    }

    /// Returns the role of a `(job, grade)` pair.
    #[must_use]
    pub fn role_id(&self, job: &str, grade: i32) -> Option<RoleId> {
        self.job_grades
            .get(job)
            .and_then(|grades| grades.get(&grade).copied())
    }

    /// Returns the job owning a role.
    #[must_use]
    pub fn job_of(&self, role_id: RoleId) -> Option<String> {
        self.roles.get(&role_id).map(|entry| entry.job.clone())
    }

    /// Returns the roles of `job` with a grade at or below `grade`, ascending by grade.
    #[must_use]
    pub fn chain(&self, job: &str, grade: i32) -> Vec<RoleId> {
        self.job_grades
            .get(job)
            .map(|grades| grades.range(..=grade).map(|(_, role_id)| *role_id).collect())
            .unwrap_or_default()
    }

    /// Returns every role of `job`, ascending by grade.
    #[must_use]
    pub fn job_roles(&self, job: &str) -> Vec<RoleId> {
        self.chain(job, i32::MAX)
    }

    /// Returns every job with at least one role.
    #[must_use]
    pub fn jobs(&self) -> Vec<String> {
        self.job_grades
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Returns the number of cached roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns whether no role is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Inserts or moves one role.
    pub fn upsert(&self, role: Role) {
        let previous = self.roles.insert(role.id, role.clone());
        if let Some(previous) = previous
            && (previous.job != role.job || previous.grade != role.grade)
        {
            self.unlink(&previous);
        }

        self.job_grades
            .entry(role.job)
            .or_default()
            .insert(role.grade, role.id);
    }

    /// Removes one role.
    pub fn remove(&self, role_id: RoleId) -> Option<Role> {
        let (_, role) = self.roles.remove(&role_id)?;
        self.unlink(&role);
        Some(role)
    }

    /// Replaces every role of one job.
    ///
    /// Duplicate `(job, grade)` rows keep the lowest role id.
    pub fn replace_job(&self, job: &str, roles: Vec<Role>) -> ReconcileStats {
        let mut grades: BTreeMap<i32, RoleId> = BTreeMap::new();
        let mut fresh: Vec<Role> = Vec::with_capacity(roles.len());
        for role in roles.into_iter().filter(|role| role.job == job) {
            let keep = grades
                .get(&role.grade)
                .is_none_or(|existing| role.id < *existing);
            if keep {
                grades.insert(role.grade, role.id);
            }
            fresh.push(role);
        }
        fresh.retain(|role| grades.get(&role.grade) == Some(&role.id));

        let fresh_ids: HashSet<RoleId> = fresh.iter().map(|role| role.id).collect();
        let upserted = fresh.len();
        for role in fresh {
            if let Some(previous) = self.roles.insert(role.id, role)
                && previous.job != job
            {
                self.unlink(&previous);
            }
        }

        let previous = if grades.is_empty() {
            self.job_grades.remove(job).map(|(_, grades)| grades)
        } else {
            self.job_grades.insert(job.to_owned(), grades)
        };

        let mut removed = 0;
        for role_id in previous.unwrap_or_default().into_values() {
            if fresh_ids.contains(&role_id) {
                continue;
            }
            if self
                .roles
                .remove_if(&role_id, |_, role| role.job == job)
                .is_some()
            {
                removed += 1;
            }
        }

        ReconcileStats { upserted, removed }
    }

    /// Replaces every role, removing jobs absent from `roles`.
    pub fn replace_all(&self, roles: Vec<Role>) -> ReconcileStats {
        let mut by_job: HashMap<String, Vec<Role>> = HashMap::new();
        for role in roles {
            by_job.entry(role.job.clone()).or_default().push(role);
        }

        let mut stats = ReconcileStats::default();
        for job in self.jobs() {
            if !by_job.contains_key(&job) {
                stats.absorb(self.replace_job(job.as_str(), Vec::new()));
            }
        }
        for (job, roles) in by_job {
            stats.absorb(self.replace_job(job.as_str(), roles));
        }

        let orphaned: Vec<RoleId> = self
            .roles
            .iter()
            .filter(|entry| self.role_id(entry.job.as_str(), entry.grade) != Some(entry.id))
            .map(|entry| entry.id)
            .collect();
        for role_id in orphaned {
            if self.roles.remove(&role_id).is_some() {
                stats.removed += 1;
            }
        }

        stats
    }

    fn unlink(&self, role: &Role) {
        if let Some(mut grades) = self.job_grades.get_mut(role.job.as_str())
            && grades.get(&role.grade) == Some(&role.id)
        {
            grades.remove(&role.grade);
        }

        self.job_grades
            .remove_if(role.job.as_str(), |_, grades| grades.is_empty());
    }
}
