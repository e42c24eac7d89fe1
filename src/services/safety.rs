use log::warn;

use crate::config::{MAX_QUERIES_PER_TURN, ROW_LIMIT_CEILING};
use crate::models::conversation::QueryPlan;

/// Keywords that must never appear as a whole word in generated SQL.
const RESTRICTED_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE", "INSERT", "UPDATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE", "CALL", "PRAGMA", "ATTACH", "DETACH",
];

/// Tokens that count as an aggregation signal under Safe Mode.
const AGGREGATION_SIGNALS: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX", "STDDEV"];

/// Validates one SQL statement against the read-only, bounded, aggregated
/// policy. Returns the human-readable rejection reason on failure.
///
/// Rules are applied in order: non-empty, SELECT-only, no restricted keyword,
/// LIMIT present, LIMIT within ceiling, and (safe mode only) at least one
/// aggregation signal.
pub fn validate(sql: &str, safe_mode: bool) -> Result<(), String> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err("query is empty".to_string());
    }

    let upper = trimmed.to_uppercase();
    if !upper.starts_with("SELECT") {
        return Err("only SELECT statements are allowed".to_string());
    }

    for keyword in RESTRICTED_KEYWORDS {
        if contains_word(&upper, keyword) {
            warn!("Rejected SQL containing restricted keyword {}", keyword);
            return Err(format!("restricted keyword {} is not allowed", keyword));
        }
    }

    let Some(limit_value) = parse_limit(&upper) else {
        return Err("query must include a LIMIT clause".to_string());
    };
    if limit_value > ROW_LIMIT_CEILING {
        return Err(format!(
            "LIMIT {} exceeds the maximum of {}",
            limit_value, ROW_LIMIT_CEILING
        ));
    }

    if safe_mode && !has_aggregation(&upper) {
        return Err(
            "Safe Mode requires aggregated queries (COUNT, SUM, AVG, MIN, MAX, STDDEV or GROUP BY)"
                .to_string(),
        );
    }

    Ok(())
}

/// Validates a whole plan: per-statement rules plus the batch-size cap.
pub fn validate_plan(plan: &QueryPlan, safe_mode: bool) -> Result<(), String> {
    if plan.queries.len() > MAX_QUERIES_PER_TURN {
        return Err(format!(
            "plan contains {} queries, maximum is {}",
            plan.queries.len(),
            MAX_QUERIES_PER_TURN
        ));
    }
    for query in &plan.queries {
        validate(&query.sql, safe_mode)
            .map_err(|reason| format!("query '{}': {}", query.name, reason))?;
    }
    Ok(())
}

fn has_aggregation(upper: &str) -> bool {
    AGGREGATION_SIGNALS.iter().any(|s| contains_word(upper, s))
        || contains_word(upper, "GROUP BY")
}

/// Whole-word containment over uppercased SQL, so UPDATE does not fire
/// inside a column called LAST_UPDATED.
fn contains_word(upper: &str, word: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = upper[start..].find(word) {
        let begin = start + pos;
        let end = begin + word.len();
        let before_ok = begin == 0
            || !upper[..begin]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let after_ok = end == upper.len()
            || !upper[end..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if before_ok && after_ok {
            return true;
        }
        start = begin + 1;
    }
    false
}

/// Extracts the numeric argument of the last LIMIT clause, if any.
fn parse_limit(upper: &str) -> Option<u64> {
    let mut value = None;
    let mut start = 0;
    while let Some(pos) = upper[start..].find("LIMIT") {
        let begin = start + pos;
        let end = begin + "LIMIT".len();
        let before_ok = begin == 0
            || !upper[..begin]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if before_ok {
            let digits: String = upper[end..]
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(n) = digits.parse::<u64>() {
                value = Some(n);
            }
        }
        start = begin + 1;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::conversation::{AnalysisCategory, PlannedQuery};

    #[test]
    fn rejects_empty_sql() {
        assert!(validate("", false).is_err());
        assert!(validate("   ", true).is_err());
    }

    #[test]
    fn rejects_non_select() {
        assert!(validate("UPDATE data SET x = 1 LIMIT 10", false).is_err());
        assert!(validate("DELETE FROM data LIMIT 10", false).is_err());
    }

    #[test]
    fn rejects_restricted_keyword_anywhere() {
        let err = validate("SELECT COUNT(*) FROM data; DROP TABLE data LIMIT 10", false)
            .unwrap_err();
        assert!(err.contains("DROP"));
    }

    #[test]
    fn restricted_keyword_not_matched_inside_identifier() {
        let sql = "SELECT COUNT(last_updated) as c FROM data LIMIT 10";
        assert!(validate(sql, false).is_ok());
    }

    #[test]
    fn rejects_missing_limit_regardless_of_safe_mode() {
        let sql = "SELECT COUNT(*) FROM data";
        assert!(validate(sql, false).is_err());
        assert!(validate(sql, true).is_err());
    }

    #[test]
    fn rejects_limit_over_ceiling() {
        let err = validate("SELECT COUNT(*) FROM data LIMIT 20000", false).unwrap_err();
        assert!(err.contains("20000"));
    }

    #[test]
    fn safe_mode_requires_aggregation() {
        let sql = "SELECT * FROM data LIMIT 10";
        let err = validate(sql, true).unwrap_err();
        assert!(err.contains("Safe Mode"));
        assert!(validate(sql, false).is_ok());
    }

    #[test]
    fn group_by_counts_as_aggregation() {
        let sql = "SELECT region FROM data GROUP BY region LIMIT 100";
        assert!(validate(sql, true).is_ok());
    }

    #[test]
    fn plan_capped_at_three_queries() {
        let query = PlannedQuery {
            name: "q".to_string(),
            sql: "SELECT COUNT(*) as c FROM data LIMIT 10".to_string(),
        };
        let plan = QueryPlan {
            category: AnalysisCategory::DataQuality,
            queries: vec![query.clone(), query.clone(), query.clone(), query],
        };
        assert!(validate_plan(&plan, true).is_err());
    }
}
