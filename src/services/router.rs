use std::collections::HashMap;

use log::debug;

use crate::models::conversation::{AnalysisCategory, RoutingDecision};

/// Keyword phrase sets for one analysis category. "Strong" phrases are near
/// unambiguous; "weak" phrases are suggestive but ambiguous on their own.
/// Phrase sets are disjoint across categories by construction.
struct CategoryPatterns {
    category: AnalysisCategory,
    strong: &'static [&'static str],
    weak: &'static [&'static str],
}

/// Registration order doubles as the deterministic tie-break: the
/// first-registered category wins an (unexpected) confidence tie.
const PATTERNS: &[CategoryPatterns] = &[
    CategoryPatterns {
        category: AnalysisCategory::RowCount,
        strong: &[
            "row count",
            "how many rows",
            "how many records",
            "number of rows",
            "number of records",
            "total rows",
            "count rows",
        ],
        weak: &["count", "rows", "records", "dataset size"],
    },
    CategoryPatterns {
        category: AnalysisCategory::Trend,
        strong: &["over time", "time series", "trend analysis"],
        weak: &["trend", "trends", "trending", "growth", "by month", "by week", "by day"],
    },
    CategoryPatterns {
        category: AnalysisCategory::TopCategories,
        strong: &[
            "top categories",
            "most common",
            "most frequent",
            "top values",
            "breakdown by",
        ],
        weak: &["top", "frequent", "popular", "distribution", "breakdown"],
    },
    CategoryPatterns {
        category: AnalysisCategory::Outliers,
        strong: &["outlier", "outliers", "anomaly", "anomalies", "unusual values"],
        weak: &["unusual", "extreme", "abnormal", "spike", "spikes"],
    },
    CategoryPatterns {
        category: AnalysisCategory::DataQuality,
        strong: &[
            "data quality",
            "missing values",
            "null values",
            "duplicate rows",
            "duplicates",
            "completeness",
        ],
        weak: &["missing", "nulls", "quality", "incomplete"],
    },
];

/// Time-period phrases mapped onto the fixed vocabulary. More specific
/// phrases come first so "last 7 days" does not fall through to "last week".
const TIME_PERIOD_PHRASES: &[(&str, &str)] = &[
    ("last 7 days", "last_7_days"),
    ("past 7 days", "last_7_days"),
    ("last 30 days", "last_30_days"),
    ("past 30 days", "last_30_days"),
    ("last 90 days", "last_90_days"),
    ("past 90 days", "last_90_days"),
    ("this week", "this_week"),
    ("last week", "last_week"),
    ("past week", "last_7_days"),
    ("this month", "this_month"),
    ("last month", "last_month"),
    ("past month", "last_30_days"),
    ("this quarter", "this_quarter"),
    ("last quarter", "last_quarter"),
    ("this year", "this_year"),
    ("last year", "last_year"),
    ("all time", "all_time"),
    ("entire dataset", "all_time"),
    ("whole dataset", "all_time"),
];

/// Maps free text onto a candidate analysis category with a confidence score
/// plus independently extracted parameters. Pure and deterministic; no state,
/// no external calls.
#[derive(Debug, Clone, Default)]
pub struct IntentRouter;

impl IntentRouter {
    pub fn new() -> Self {
        Self
    }

    /// Route one message. Empty text yields category `None` with confidence
    /// 0.0; parameter extraction runs regardless of the category outcome.
    pub fn route(&self, text: &str) -> RoutingDecision {
        let normalized = text.trim().to_lowercase();

        let mut decision = RoutingDecision::none();
        if !normalized.is_empty() {
            for patterns in PATTERNS {
                let strong_matches = patterns
                    .strong
                    .iter()
                    .filter(|p| contains_phrase(&normalized, p))
                    .count();
                let weak_matches = patterns
                    .weak
                    .iter()
                    .filter(|p| contains_phrase(&normalized, p))
                    .count();

                let confidence = score(strong_matches, weak_matches);
                // Strictly-greater keeps the first-registered winner on ties.
                if confidence > decision.confidence {
                    decision.category = Some(patterns.category);
                    decision.confidence = confidence;
                }
            }
        }

        extract_params(&normalized, &mut decision.params);

        debug!(
            "Routed message to {:?} (confidence {:.2}, params {:?})",
            decision.category, decision.confidence, decision.params
        );
        decision
    }
}

fn score(strong_matches: usize, weak_matches: usize) -> f64 {
    if strong_matches >= 1 {
        let extra = (strong_matches - 1) as f64;
        let mut confidence = (0.9 + 0.05 * extra).min(1.0);
        if weak_matches > 0 {
            confidence = (confidence + 0.05).min(1.0);
        }
        confidence
    } else if weak_matches >= 1 {
        let extra = (weak_matches - 1) as f64;
        (0.6 + 0.1 * extra).min(0.79)
    } else {
        0.0
    }
}

/// Case-normalized phrase containment with word boundaries, so "count" does
/// not fire inside "country".
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(phrase) {
        let begin = start + pos;
        let end = begin + phrase.len();
        let boundary_before = begin == 0
            || !haystack[..begin]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let boundary_after = end == haystack.len()
            || !haystack[end..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric());
        if boundary_before && boundary_after {
            return true;
        }
        start = begin + 1;
    }
    false
}

fn extract_params(normalized: &str, params: &mut HashMap<String, String>) {
    if normalized.is_empty() {
        return;
    }

    for (phrase, value) in TIME_PERIOD_PHRASES {
        if contains_phrase(normalized, phrase) {
            params.insert("time_period".to_string(), (*value).to_string());
            break;
        }
    }

    if let Some(n) = extract_top_n(normalized) {
        params.insert("top_n".to_string(), n.to_string());
    }
}

/// Parses "top N" style requests ("top 5 products", "show the top 20").
fn extract_top_n(normalized: &str) -> Option<u32> {
    let mut start = 0;
    while let Some(pos) = normalized[start..].find("top ") {
        let after = &normalized[start + pos + 4..];
        let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            if let Ok(n) = digits.parse::<u32>() {
                if n > 0 {
                    return Some(n);
                }
            }
        }
        start += pos + 4;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_pattern_yields_high_confidence() {
        let router = IntentRouter::new();
        let decision = router.route("what is the row count?");
        assert_eq!(decision.category, Some(AnalysisCategory::RowCount));
        assert!(decision.confidence >= 0.9);
    }

    #[test]
    fn weak_only_match_stays_below_threshold() {
        let router = IntentRouter::new();
        let decision = router.route("show me trends");
        assert_eq!(decision.category, Some(AnalysisCategory::Trend));
        assert!(decision.confidence < 0.8);
        assert!(decision.confidence >= 0.6);
    }

    #[test]
    fn multiple_weak_matches_cap_below_strong_band() {
        let router = IntentRouter::new();
        let decision = router.route("trend growth by month by week by day");
        assert_eq!(decision.category, Some(AnalysisCategory::Trend));
        assert!(decision.confidence <= 0.79);
    }

    #[test]
    fn strong_plus_weak_gains_bonus() {
        let router = IntentRouter::new();
        let decision = router.route("trend analysis of growth");
        assert_eq!(decision.category, Some(AnalysisCategory::Trend));
        assert!((decision.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn no_match_is_none_with_zero_confidence() {
        let router = IntentRouter::new();
        let decision = router.route("hello there");
        assert_eq!(decision.category, None);
        assert_eq!(decision.confidence, 0.0);
        assert!(decision.params.is_empty());
    }

    #[test]
    fn empty_text_is_none() {
        let router = IntentRouter::new();
        let decision = router.route("   ");
        assert_eq!(decision.category, None);
        assert_eq!(decision.confidence, 0.0);
    }

    #[test]
    fn params_extracted_independently_of_category() {
        let router = IntentRouter::new();
        let decision = router.route("anything from the last 30 days please");
        assert_eq!(decision.category, None);
        assert_eq!(
            decision.params.get("time_period").map(|s| s.as_str()),
            Some("last_30_days")
        );
    }

    #[test]
    fn top_n_extraction() {
        let router = IntentRouter::new();
        let decision = router.route("top 5 most common categories");
        assert_eq!(decision.category, Some(AnalysisCategory::TopCategories));
        assert_eq!(decision.params.get("top_n").map(|s| s.as_str()), Some("5"));
    }

    #[test]
    fn specific_period_beats_generic_week() {
        let router = IntentRouter::new();
        let decision = router.route("volume over time for the last 7 days");
        assert_eq!(
            decision.params.get("time_period").map(|s| s.as_str()),
            Some("last_7_days")
        );
    }

    #[test]
    fn word_boundaries_respected() {
        // "count" must not fire inside "country"
        let router = IntentRouter::new();
        let decision = router.route("country breakdown");
        assert_ne!(decision.category, Some(AnalysisCategory::RowCount));
    }
}
