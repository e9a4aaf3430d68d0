use rankguard_application::{PermissionDefinition, PermissionRegistry};
use rankguard_core::AppResult;
use rankguard_domain::{AttributeType, AttributeValue, StringList};

fn strings(values: &[&str]) -> Option<AttributeValue> {
    Some(AttributeValue::StringList(StringList::new(
        values.iter().copied(),
    )))
}

/// Permissions declared by the services this engine answers for.
pub(crate) fn declared_permissions() -> AppResult<PermissionRegistry> {
    let mut registry = PermissionRegistry::new();

    registry.register_all([
        PermissionDefinition::new("citizens.CitizensService", "ListCitizens")
            .with_order(10)
            .with_attribute(
                "Fields",
                AttributeType::StringList,
                strings(&[
                    "PhoneNumber",
                    "Licenses",
                    "UserProps",
                    "Mugshot",
                    "Fines",
                    "Notes",
                    "Jail",
                ]),
            ),
        PermissionDefinition::new("citizens.CitizensService", "SetUserProps")
            .with_order(11)
            .with_attribute(
                "Fields",
                AttributeType::StringList,
                strings(&["Wanted", "Job", "TrafficInfractionPoints", "Mugshot"]),
            ),
        PermissionDefinition::new("completor.CompletorService", "CompleteJobs")
            .with_order(20)
            .with_attribute("Jobs", AttributeType::JobList, None),
        PermissionDefinition::new("documents.DocumentsService", "ListDocuments").with_order(30),
        PermissionDefinition::new("documents.DocumentsService", "ViewDocument")
            .with_order(31)
            .with_attribute(
                "Access",
                AttributeType::StringList,
                strings(&["Own", "Lower", "Same", "Any"]),
            ),
        PermissionDefinition::new("jobs.JobsService", "ListColleagues")
            .with_order(40)
            .with_attribute(
                "Types",
                AttributeType::StringList,
                strings(&["Own", "Lower", "Same", "Any"]),
            ),
        PermissionDefinition::new("livemap.LivemapService", "Stream")
            .with_order(50)
            .with_attribute("Markers", AttributeType::JobList, None)
            .with_attribute("Players", AttributeType::JobGradeList, None),
        PermissionDefinition::new("qualifications.QualificationsService", "ListQualifications")
            .with_order(60)
            .with_attribute("Access", AttributeType::JobGradeList, None),
        PermissionDefinition::new("settings.LawsService", "CreateOrUpdateLawBook")
            .with_order(70),
        PermissionDefinition::new("wiki.WikiService", "ListPages")
            .with_order(80)
            .with_attribute("Jobs", AttributeType::JobList, None),
    ])?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::declared_permissions;

    #[test]
    fn declared_catalog_is_consistent() {
        let registry = declared_permissions();

        assert!(registry.is_ok_and(|registry| {
            registry.contains("citizens-citizensservice-listcitizens")
                && registry.contains("livemap-livemapservice-stream")
                && registry.len() == 10
        }));
    }
}
