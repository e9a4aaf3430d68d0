/// Lowercases `value` and collapses every run of non-alphanumeric characters into one `-`.
///
/// Leading and trailing separators are dropped, so `" Foo..Bar "` becomes `foo-bar`.
#[must_use]
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_separator = false;

    for character in value.chars() {
        if character.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(character.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// Returns the canonical guard name for a permission.
#[must_use]
pub fn guard_name(category: &str, name: &str) -> String {
    slugify(format!("{category}-{name}").as_str())
}

/// Returns the flattened guard name for one attribute value of a permission.
#[must_use]
pub fn attribute_guard_name(category: &str, name: &str, key: &str, value: &str) -> String {
    slugify(format!("{category}-{name}-{key}-{value}").as_str())
}

#[cfg(test)]
mod tests {
    use super::{attribute_guard_name, guard_name, slugify};

    #[test]
    fn guard_name_collapses_separators() {
        assert_eq!(
            guard_name("citizens.CitizensService", "ListCitizens"),
            "citizens-citizensservice-listcitizens"
        );
    }

    #[test]
    fn slugify_trims_edges_and_runs() {
        assert_eq!(slugify("  Foo..Bar__baz  "), "foo-bar-baz");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn attribute_guard_name_appends_key_and_value() {
        assert_eq!(
            attribute_guard_name("livemap.LivemapService", "Stream", "Players", "doj"),
            "livemap-livemapservice-stream-players-doj"
        );
        assert_eq!(
            attribute_guard_name("citizens.CitizensService", "ListCitizens", "Fields", "UserProps.Wanted"),
            "citizens-citizensservice-listcitizens-fields-userprops-wanted"
        );
    }
}
