use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Actions that can earn points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointsAction {
    SubmitReport,
    ConfirmReport,
    Comment,
    EarnBadge,
}

impl PointsAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmitReport => "submit_report",
            Self::ConfirmReport => "confirm_report",
            Self::Comment => "comment",
            Self::EarnBadge => "earn_badge",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsRule {
    pub action: String,
    pub points: i32,
    pub description: String,
    pub is_active: bool,
}

/// Canonical badge requirement types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
    ReportCount,
    ConfirmationCount,
    CategoryCount,
    UniqueCategories,
    Points,
}

impl RequirementType {
    /// Maps stored requirement names, current and legacy, onto the canonical
    /// type. Unknown names yield `None`.
    pub fn canonicalize(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "report_count" | "reports_count" | "reports_submitted" | "submit_count"
            | "total_reports" => Some(Self::ReportCount),
            "confirmation_count" | "confirmations_count" | "reports_confirmed"
            | "confirm_count" | "total_confirmations" => Some(Self::ConfirmationCount),
            "category_count" | "category_reports" | "reports_in_category"
            | "specific_category" => Some(Self::CategoryCount),
            "unique_categories" | "distinct_categories" | "categories_count"
            | "category_diversity" => Some(Self::UniqueCategories),
            "points" | "total_points" | "points_threshold" | "points_earned" => {
                Some(Self::Points)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeDefinition {
    pub id: String,
    pub name_en: String,
    pub name_ar: String,
    pub description_en: String,
    pub description_ar: String,
    pub requirement_type: String,
    pub requirement_value: i32,
    pub category: Option<String>,
    pub is_active: bool,
}

/// An active badge whose requirement type has been resolved to its canonical
/// form.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedBadge {
    #[serde(flatten)]
    pub definition: BadgeDefinition,
    pub requirement: RequirementType,
}

impl ResolvedBadge {
    /// Returns `None` when the stored requirement type is unknown.
    pub fn resolve(definition: BadgeDefinition) -> Option<Self> {
        let requirement = RequirementType::canonicalize(&definition.requirement_type)?;
        Some(Self {
            definition,
            requirement,
        })
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn is_satisfied_by(&self, progress: &BadgeProgress) -> bool {
        let threshold = i64::from(self.definition.requirement_value);
        match self.requirement {
            RequirementType::ReportCount => i64::from(progress.reports_count) >= threshold,
            RequirementType::ConfirmationCount => {
                i64::from(progress.reports_confirmed) >= threshold
            }
            RequirementType::CategoryCount => match self.definition.category.as_deref() {
                Some(category) => progress.reports_in_category(category) >= threshold,
                None => false,
            },
            RequirementType::UniqueCategories => progress.unique_categories() as i64 >= threshold,
            RequirementType::Points => progress.points >= threshold,
        }
    }
}

/// Aggregate counters a user's badges are judged against.
#[derive(Debug, Clone, Default)]
pub struct BadgeProgress {
    pub points: i64,
    pub reports_count: i32,
    pub reports_confirmed: i32,
    pub category_counts: HashMap<String, i64>,
}

impl BadgeProgress {
    pub fn reports_in_category(&self, category: &str) -> i64 {
        self.category_counts.get(category).copied().unwrap_or(0)
    }

    pub fn unique_categories(&self) -> usize {
        self.category_counts.values().filter(|count| **count > 0).count()
    }
}

/// Outcome of re-evaluating badges for a set of users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub new_badges_awarded: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(requirement_type: &str, value: i32, category: Option<&str>) -> BadgeDefinition {
        BadgeDefinition {
            id: format!("{}_{}", requirement_type, value),
            name_en: "Badge".into(),
            name_ar: "وسام".into(),
            description_en: String::new(),
            description_ar: String::new(),
            requirement_type: requirement_type.into(),
            requirement_value: value,
            category: category.map(str::to_string),
            is_active: true,
        }
    }

    fn badge(requirement_type: &str, value: i32, category: Option<&str>) -> ResolvedBadge {
        ResolvedBadge::resolve(definition(requirement_type, value, category)).unwrap()
    }

    #[test]
    fn legacy_and_current_names_share_a_canonical_type() {
        let groups = [
            (RequirementType::ReportCount, ["report_count", "reports_submitted"]),
            (RequirementType::ConfirmationCount, ["confirmation_count", "reports_confirmed"]),
            (RequirementType::CategoryCount, ["category_count", "category_reports"]),
            (RequirementType::UniqueCategories, ["unique_categories", "distinct_categories"]),
            (RequirementType::Points, ["points", "total_points"]),
        ];
        for (expected, names) in groups {
            for name in names {
                assert_eq!(RequirementType::canonicalize(name), Some(expected), "{}", name);
            }
        }
    }

    #[test]
    fn canonicalize_ignores_case_and_whitespace() {
        assert_eq!(
            RequirementType::canonicalize(" Reports_Count "),
            Some(RequirementType::ReportCount)
        );
        assert_eq!(RequirementType::canonicalize("streak_days"), None);
    }

    #[test]
    fn confirmation_badge_needs_the_full_threshold() {
        let badge = badge("confirmation_count", 10, None);
        let mut progress = BadgeProgress {
            reports_confirmed: 9,
            ..Default::default()
        };
        assert!(!badge.is_satisfied_by(&progress));
        progress.reports_confirmed = 10;
        assert!(badge.is_satisfied_by(&progress));
    }

    #[test]
    fn category_badge_without_filter_never_matches() {
        let mut progress = BadgeProgress::default();
        progress.category_counts.insert("roads".into(), 50);

        assert!(!badge("category_count", 1, None).is_satisfied_by(&progress));
        assert!(badge("category_count", 5, Some("roads")).is_satisfied_by(&progress));
        assert!(!badge("category_count", 5, Some("lighting")).is_satisfied_by(&progress));
    }

    #[test]
    fn unique_categories_counts_distinct_entries() {
        let mut progress = BadgeProgress::default();
        progress.category_counts.insert("roads".into(), 4);
        progress.category_counts.insert("lighting".into(), 1);
        assert!(!badge("unique_categories", 3, None).is_satisfied_by(&progress));
        progress.category_counts.insert("waste".into(), 1);
        assert!(badge("unique_categories", 3, None).is_satisfied_by(&progress));
    }

    #[test]
    fn unknown_requirement_type_does_not_resolve() {
        assert!(ResolvedBadge::resolve(definition("streak_days", 0, None)).is_none());
    }

    #[test]
    fn legacy_name_resolves_once_to_canonical_type() {
        let badge = badge("Reports_Submitted", 1, None);
        assert_eq!(badge.requirement, RequirementType::ReportCount);
        assert_eq!(badge.definition.requirement_type, "Reports_Submitted");
    }

    #[test]
    fn points_badge_uses_running_total() {
        let progress = BadgeProgress {
            points: 100,
            ..Default::default()
        };
        assert!(badge("points", 100, None).is_satisfied_by(&progress));
        assert!(!badge("points", 101, None).is_satisfied_by(&progress));
    }
}
