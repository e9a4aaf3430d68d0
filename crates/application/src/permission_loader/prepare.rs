use std::collections::HashMap;

use rankguard_core::AppResult;
use rankguard_domain::{
    Attribute, AttributeId, AttributeValue, JobAttributeCeiling, PermissionId, RoleAttributeValue,
    RoleGrant, RoleId,
};
use tracing::warn;

use super::ReloadReport;

/// Groups grants by role, dropping rows that reference unknown roles or permissions.
pub(super) fn prepare_grants(
    grants: Vec<RoleGrant>,
    role_known: impl Fn(RoleId) -> bool,
    permission_known: impl Fn(PermissionId) -> bool,
    report: &mut ReloadReport,
) -> HashMap<RoleId, Vec<(PermissionId, bool)>> {
    let mut grouped: HashMap<RoleId, Vec<(PermissionId, bool)>> = HashMap::new();

    for grant in grants {
        if !role_known(grant.role_id) || !permission_known(grant.permission_id) {
            warn!(
                role_id = %grant.role_id,
                permission_id = %grant.permission_id,
                "skipping role grant referencing unknown role or permission"
            );
            report.skipped += 1;
            continue;
        }

        grouped
            .entry(grant.role_id)
            .or_default()
            .push((grant.permission_id, grant.value));
    }

    grouped
}

/// Groups ceilings by job, normalizing absent values to the empty form.
pub(super) fn prepare_ceilings(
    ceilings: Vec<JobAttributeCeiling>,
    attribute_of: impl Fn(AttributeId) -> Option<Attribute>,
    report: &mut ReloadReport,
) -> AppResult<HashMap<String, HashMap<AttributeId, AttributeValue>>> {
    let mut grouped: HashMap<String, HashMap<AttributeId, AttributeValue>> = HashMap::new();

    for ceiling in ceilings {
        let Some(attribute) = attribute_of(ceiling.attribute_id) else {
            warn!(
                job = %ceiling.job,
                attribute_id = %ceiling.attribute_id,
                "skipping job attribute ceiling referencing unknown attribute"
            );
            report.skipped += 1;
            continue;
        };

        let max_values = AttributeValue::or_default(ceiling.max_values, attribute.attribute_type())?;
        grouped
            .entry(ceiling.job)
            .or_default()
            .insert(ceiling.attribute_id, max_values);
    }

    Ok(grouped)
}

/// Groups role attribute values by role, clamping each against the catalog valid
/// values and the job ceiling.
pub(super) fn prepare_attribute_values(
    values: Vec<RoleAttributeValue>,
    job_of: impl Fn(RoleId) -> Option<String>,
    attribute_of: impl Fn(AttributeId) -> Option<Attribute>,
    ceiling_of: impl Fn(&str, AttributeId) -> Option<AttributeValue>,
    report: &mut ReloadReport,
) -> AppResult<HashMap<RoleId, Vec<(AttributeId, AttributeValue)>>> {
    let mut grouped: HashMap<RoleId, Vec<(AttributeId, AttributeValue)>> = HashMap::new();

    for row in values {
        let (Some(job), Some(attribute)) = (job_of(row.role_id), attribute_of(row.attribute_id))
        else {
            warn!(
                role_id = %row.role_id,
                attribute_id = %row.attribute_id,
                "skipping role attribute value referencing unknown role or attribute"
            );
            report.skipped += 1;
            continue;
        };

        let mut value = AttributeValue::or_default(row.value, attribute.attribute_type())?;
        let ceiling = ceiling_of(job.as_str(), attribute.id());
        let outcome = value.check(
            attribute.attribute_type(),
            Some(attribute.valid_values()),
            ceiling.as_ref(),
        )?;

        if outcome.changed {
            warn!(
                role_id = %row.role_id,
                job = %job,
                attribute_id = %row.attribute_id,
                reset = !outcome.ok,
                "role attribute value exceeded catalog or job ceiling and was clamped"
            );
            report.clamped += 1;
        }

        grouped
            .entry(row.role_id)
            .or_default()
            .push((row.attribute_id, value));
    }

    Ok(grouped)
}
