//! Typed attribute values and their validation/clamping rules.
//!
//! Every check both validates and auto-corrects the value in place: entries the
//! catalog or the job ceiling do not allow are removed or clamped, and the caller is
//! told whether anything changed.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rankguard_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Shape of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    /// Unordered set of free-form strings.
    StringList,
    /// Unordered set of job codes.
    JobList,
    /// Per-job grade ceilings or explicit per-job grade sets.
    JobGradeList,
}

impl AttributeType {
    /// Returns a stable storage value for this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StringList => "StringList",
            Self::JobList => "JobList",
            Self::JobGradeList => "JobGradeList",
        }
    }

    /// Returns all known attribute types.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[AttributeType] = &[
            AttributeType::StringList,
            AttributeType::JobList,
            AttributeType::JobGradeList,
        ];

        ALL
    }
}

impl Display for AttributeType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for AttributeType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "StringList" => Ok(Self::StringList),
            "JobList" => Ok(Self::JobList),
            "JobGradeList" => Ok(Self::JobGradeList),
            _ => Err(AppError::Validation(format!(
                "unknown attribute type '{value}'"
            ))),
        }
    }
}

/// Result of checking a value against catalog and ceiling constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOutcome {
    /// `false` when the value had to be reset wholesale.
    pub ok: bool,
    /// Whether any entry was removed or clamped.
    pub changed: bool,
}

/// Unordered list of strings, used for both `StringList` and `JobList`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringList {
    /// Entries of the list.
    #[serde(default)]
    pub strings: Vec<String>,
}

impl StringList {
    /// Creates a list from any iterable of strings.
    #[must_use]
    pub fn new<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            strings: strings.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns whether the list holds `value`.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.strings.iter().any(|entry| entry == value)
    }

    /// Returns whether the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Clamps the list to `max` and, when non-empty, to `valid`.
    ///
    /// A list longer than either constraint cannot be a subset of it and is reset to
    /// empty. A `None` ceiling imposes no constraint.
    pub fn check(&mut self, valid: Option<&StringList>, max: Option<&StringList>) -> CheckOutcome {
        let valid = valid.filter(|list| !list.is_empty());
        let exceeds_max = max.is_some_and(|list| self.strings.len() > list.strings.len());
        let exceeds_valid = valid.is_some_and(|list| self.strings.len() > list.strings.len());

        if exceeds_max || exceeds_valid {
            self.strings.clear();
            return CheckOutcome {
                ok: false,
                changed: true,
            };
        }

        let before = self.strings.len();
        if let Some(max) = max {
            self.strings.retain(|entry| max.contains(entry));
        }
        if let Some(valid) = valid {
            self.strings.retain(|entry| valid.contains(entry));
        }

        CheckOutcome {
            ok: true,
            changed: self.strings.len() != before,
        }
    }
}

/// Job/grade constraint value.
///
/// `fine_grained` selects which map is authoritative: `jobs` holds one grade ceiling
/// per job, `grades` holds an explicit set of allowed grades per job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobGradeList {
    /// Selects `grades` over `jobs`.
    #[serde(default)]
    pub fine_grained: bool,
    /// Highest allowed grade per job.
    #[serde(default)]
    pub jobs: BTreeMap<String, i32>,
    /// Allowed grades per job.
    #[serde(default)]
    pub grades: BTreeMap<String, Vec<i32>>,
}

impl JobGradeList {
    /// Creates a ceiling-based list.
    #[must_use]
    pub fn with_ceilings<I, S>(jobs: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        Self {
            fine_grained: false,
            jobs: jobs.into_iter().map(|(job, grade)| (job.into(), grade)).collect(),
            grades: BTreeMap::new(),
        }
    }

    /// Creates a fine-grained list with explicit grade sets.
    #[must_use]
    pub fn with_grades<I, S>(grades: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<i32>)>,
        S: Into<String>,
    {
        Self {
            fine_grained: true,
            jobs: BTreeMap::new(),
            grades: grades
                .into_iter()
                .map(|(job, grades)| (job.into(), grades))
                .collect(),
        }
    }

    /// Returns whether neither representation holds an entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.grades.is_empty()
    }

    /// Returns the highest grade the list allows for `job`.
    #[must_use]
    pub fn ceiling(&self, job: &str) -> Option<i32> {
        if self.fine_grained {
            self.grades
                .get(job)
                .and_then(|grades| grades.iter().copied().max())
        } else {
            self.jobs.get(job).copied()
        }
    }

    /// Returns whether `grade` of `job` is a member of the list.
    #[must_use]
    pub fn allows(&self, job: &str, grade: i32) -> bool {
        if self.fine_grained {
            self.grades
                .get(job)
                .is_some_and(|grades| grades.contains(&grade))
        } else {
            self.jobs.get(job).is_some_and(|ceiling| grade <= *ceiling)
        }
    }

    /// Returns the jobs that contribute at least one allowed grade.
    pub fn job_codes(&self) -> impl Iterator<Item = &str> {
        let ceilings = self
            .jobs
            .keys()
            .filter(|_| !self.fine_grained)
            .map(String::as_str);
        let grade_sets = self
            .grades
            .iter()
            .filter(|(_, grades)| self.fine_grained && !grades.is_empty())
            .map(|(job, _)| job.as_str());

        ceilings.chain(grade_sets)
    }

    /// Clamps the list to `max` and, when non-empty, to `valid`.
    ///
    /// A `None` ceiling imposes no constraint.
    pub fn check(
        &mut self,
        valid: Option<&JobGradeList>,
        max: Option<&JobGradeList>,
    ) -> CheckOutcome {
        let valid = valid.filter(|list| !list.is_empty());
        let mut changed = false;

        if self.fine_grained {
            self.grades.retain(|job, grades| {
                if grades.is_empty() {
                    changed = true;
                    return false;
                }

                if let Some(max) = max {
                    let Some(ceiling) = max.ceiling(job) else {
                        changed = true;
                        return false;
                    };
                    changed |= retain_up_to(grades, ceiling);
                }

                if let Some(ceiling) = valid.and_then(|valid| valid.ceiling(job)) {
                    changed |= retain_up_to(grades, ceiling);
                }

                !grades.is_empty()
            });

            if !self.jobs.is_empty() {
                self.jobs.clear();
                changed = true;
            }
        } else {
            for constraint in [max, valid].into_iter().flatten() {
                self.jobs.retain(|job, grade| match constraint.ceiling(job) {
                    Some(ceiling) if ceiling > 0 => {
                        if *grade > ceiling {
                            *grade = ceiling;
                            changed = true;
                        }
                        true
                    }
                    _ => {
                        changed = true;
                        false
                    }
                });
            }

            if !self.grades.is_empty() {
                self.grades.clear();
                changed = true;
            }
        }

        CheckOutcome { ok: true, changed }
    }
}

fn retain_up_to(grades: &mut Vec<i32>, ceiling: i32) -> bool {
    let before = grades.len();
    grades.retain(|grade| *grade <= ceiling);
    grades.len() != before
}

/// Attribute value with exactly one active variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeValue {
    /// Free-form string set.
    StringList(StringList),
    /// Job code set.
    JobList(StringList),
    /// Job/grade constraint.
    JobGradeList(JobGradeList),
}

impl AttributeValue {
    /// Returns the canonical empty value of `attribute_type`.
    #[must_use]
    pub fn empty(attribute_type: AttributeType) -> Self {
        match attribute_type {
            AttributeType::StringList => Self::StringList(StringList::default()),
            AttributeType::JobList => Self::JobList(StringList::default()),
            AttributeType::JobGradeList => Self::JobGradeList(JobGradeList::default()),
        }
    }

    /// Returns `value`, or the empty value of `attribute_type` when absent.
    ///
    /// Fails when a present value does not match `attribute_type`.
    pub fn or_default(value: Option<Self>, attribute_type: AttributeType) -> AppResult<Self> {
        match value {
            Some(value) => {
                value.ensure_kind(attribute_type)?;
                Ok(value)
            }
            None => Ok(Self::empty(attribute_type)),
        }
    }

    /// Returns the type this value is shaped as.
    #[must_use]
    pub fn kind(&self) -> AttributeType {
        match self {
            Self::StringList(_) => AttributeType::StringList,
            Self::JobList(_) => AttributeType::JobList,
            Self::JobGradeList(_) => AttributeType::JobGradeList,
        }
    }

    /// Returns whether the value holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::StringList(list) | Self::JobList(list) => list.is_empty(),
            Self::JobGradeList(list) => list.is_empty(),
        }
    }

    /// Returns the entries that expand into flattened guard names.
    #[must_use]
    pub fn flat_values(&self) -> Vec<&str> {
        match self {
            Self::StringList(list) | Self::JobList(list) => {
                list.strings.iter().map(String::as_str).collect()
            }
            Self::JobGradeList(list) => list.job_codes().collect(),
        }
    }

    /// Validates and clamps the value against catalog and ceiling constraints.
    ///
    /// `valid` is ignored when empty; `max` is ignored when `None`. Fails when the
    /// value or a constraint is not shaped as `attribute_type`.
    pub fn check(
        &mut self,
        attribute_type: AttributeType,
        valid: Option<&AttributeValue>,
        max: Option<&AttributeValue>,
    ) -> AppResult<CheckOutcome> {
        self.ensure_kind(attribute_type)?;
        if let Some(valid) = valid {
            valid.ensure_kind(attribute_type)?;
        }
        if let Some(max) = max {
            max.ensure_kind(attribute_type)?;
        }

        let outcome = match self {
            Self::StringList(list) | Self::JobList(list) => {
                list.check(valid.and_then(Self::as_string_list), max.and_then(Self::as_string_list))
            }
            Self::JobGradeList(list) => list.check(
                valid.and_then(Self::as_job_grade_list),
                max.and_then(Self::as_job_grade_list),
            ),
        };

        Ok(outcome)
    }

    /// Returns the string list of a `StringList` or `JobList` value.
    #[must_use]
    pub fn as_string_list(&self) -> Option<&StringList> {
        match self {
            Self::StringList(list) | Self::JobList(list) => Some(list),
            Self::JobGradeList(_) => None,
        }
    }

    /// Returns the job/grade list of a `JobGradeList` value.
    #[must_use]
    pub fn as_job_grade_list(&self) -> Option<&JobGradeList> {
        match self {
            Self::JobGradeList(list) => Some(list),
            Self::StringList(_) | Self::JobList(_) => None,
        }
    }

    fn ensure_kind(&self, attribute_type: AttributeType) -> AppResult<()> {
        if self.kind() == attribute_type {
            return Ok(());
        }

        Err(AppError::Validation(format!(
            "attribute value of type '{}' does not match attribute type '{attribute_type}'",
            self.kind()
        )))
    }
}
