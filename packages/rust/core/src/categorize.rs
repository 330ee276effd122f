//! Keyword-based topical categorization.
//!
//! Rules are checked in table order and the first rule with any keyword
//! occurring as a substring of the lower-cased text wins. Text matching no
//! rule gets [`FALLBACK_CATEGORY`].

use billtracker_shared::{AppConfig, CategoryRule, FALLBACK_CATEGORY};

/// Ordered category table.
#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: Vec<CategoryRule>,
}

impl Categorizer {
    /// Build from an ordered rule list. Keywords are lower-cased and empty ones dropped.
    pub fn from_rules(rules: Vec<CategoryRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| CategoryRule {
                label: rule.label,
                keywords: rule
                    .keywords
                    .into_iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Self { rules }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::from_rules(config.categories.clone())
    }

    /// Assign exactly one category to `text`.
    pub fn categorize(&self, text: &str) -> &str {
        let text = text.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| text.contains(k.as_str())))
            .map_or(FALLBACK_CATEGORY, |rule| rule.label.as_str())
    }
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billtracker_shared::{FULL_TEXT_FETCH_FAILED, FULL_TEXT_NOT_AVAILABLE};

    #[test]
    fn first_matching_rule_wins() {
        let categorizer = Categorizer::default();
        let text = "An act relative to school funding and the property tax rate";
        assert_eq!(categorizer.categorize(text), "Education");
    }

    #[test]
    fn table_order_decides_not_match_count() {
        let categorizer = Categorizer::from_rules(vec![
            CategoryRule::new("Economy", &["tax"]),
            CategoryRule::new("Education", &["school", "student", "teacher"]),
        ]);
        let text = "school student teacher tax";
        assert_eq!(categorizer.categorize(text), "Economy");
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let categorizer = Categorizer::default();
        assert_eq!(categorizer.categorize("HIGHWAY signage"), "Transportation");
        // "transport" inside "transportation"
        assert_eq!(categorizer.categorize("Department of Transportation"), "Transportation");
        assert_eq!(categorizer.categorize("Firearms"), "Public Safety");
    }

    #[test]
    fn unmatched_and_sentinel_text_fall_back() {
        let categorizer = Categorizer::default();
        assert_eq!(categorizer.categorize("relative to the state song"), FALLBACK_CATEGORY);
        assert_eq!(categorizer.categorize(""), FALLBACK_CATEGORY);
        assert_eq!(categorizer.categorize(FULL_TEXT_NOT_AVAILABLE), FALLBACK_CATEGORY);
        assert_eq!(categorizer.categorize(FULL_TEXT_FETCH_FAILED), FALLBACK_CATEGORY);
    }

    #[test]
    fn uppercase_keywords_are_normalized() {
        let categorizer = Categorizer::from_rules(vec![CategoryRule {
            label: "Fisheries".into(),
            keywords: vec!["TROUT".into(), String::new()],
        }]);
        assert_eq!(categorizer.categorize("trout stocking"), "Fisheries");
        assert_eq!(categorizer.categorize("anything else"), FALLBACK_CATEGORY);
    }
}
