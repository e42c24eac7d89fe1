use std::collections::HashMap;

use log::info;

use crate::config::ROW_LIMIT_CEILING;
use crate::error::{CoreError, Result};
use crate::models::catalog::DatasetCatalog;
use crate::models::conversation::{AnalysisCategory, PlannedQuery, QueryPlan};

/// All generated SQL targets the conventional analytical table name.
const TABLE: &str = "data";

const DEFAULT_TOP_N: u64 = 10;
const TREND_BUCKET_LIMIT: u64 = 1_000;
const OUTLIER_ROW_CAP: u64 = 100;

/// Builds the deterministic per-category query plan from resolved context.
///
/// Every emitted statement is SELECT-only, aggregation-bearing and
/// LIMIT-bounded so it passes the safety validator under either mode; the
/// orchestrator still runs the validator over the result before release.
pub fn build_plan(
    category: AnalysisCategory,
    context: &HashMap<String, String>,
    catalog: &DatasetCatalog,
    safe_mode: bool,
) -> Result<QueryPlan> {
    let queries = match category {
        AnalysisCategory::RowCount => row_count_queries(),
        AnalysisCategory::TopCategories => top_categories_queries(context, catalog)?,
        AnalysisCategory::Trend => trend_queries(context, catalog)?,
        AnalysisCategory::Outliers => outlier_queries(context, catalog, safe_mode)?,
        AnalysisCategory::DataQuality => data_quality_queries(catalog),
    };

    info!(
        "Built {} plan with {} quer(y/ies) for dataset {}",
        category.as_str(),
        queries.len(),
        catalog.dataset_id
    );

    Ok(QueryPlan { category, queries })
}

fn row_count_queries() -> Vec<PlannedQuery> {
    vec![PlannedQuery {
        name: "row_count".to_string(),
        sql: format!("SELECT COUNT(*) as row_count FROM {} LIMIT 1", TABLE),
    }]
}

fn top_categories_queries(
    context: &HashMap<String, String>,
    catalog: &DatasetCatalog,
) -> Result<Vec<PlannedQuery>> {
    let column = context
        .get("grouping")
        .map(|s| s.as_str())
        .or_else(|| catalog.first_categorical_column())
        .ok_or_else(|| {
            CoreError::ValidationFailure(
                "no categorical column available to group by".to_string(),
            )
        })?;

    let top_n = context
        .get("top_n")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TOP_N)
        .clamp(1, ROW_LIMIT_CEILING);

    Ok(vec![PlannedQuery {
        name: "top_categories".to_string(),
        sql: format!(
            "SELECT {col} as category, COUNT(*) as count FROM {table} \
             GROUP BY {col} ORDER BY count DESC LIMIT {top_n}",
            col = quote_ident(column),
            table = TABLE,
            top_n = top_n,
        ),
    }])
}

fn trend_queries(
    context: &HashMap<String, String>,
    catalog: &DatasetCatalog,
) -> Result<Vec<PlannedQuery>> {
    let date_column = context
        .get("dimension")
        .map(|s| s.as_str())
        .or_else(|| catalog.first_date_column())
        .ok_or_else(|| {
            CoreError::ValidationFailure(
                "no date column available for trend analysis".to_string(),
            )
        })?;

    let time_period = context.get("time_period").map(|s| s.as_str()).unwrap_or("all_time");
    let bucket = bucket_unit(time_period);
    let filter = time_filter(date_column, time_period);

    Ok(vec![PlannedQuery {
        name: "trend".to_string(),
        sql: format!(
            "SELECT DATE_TRUNC('{bucket}', {col}) as period, COUNT(*) as count \
             FROM {table}{filter} GROUP BY period ORDER BY period LIMIT {limit}",
            bucket = bucket,
            col = quote_ident(date_column),
            table = TABLE,
            filter = filter,
            limit = TREND_BUCKET_LIMIT,
        ),
    }])
}

fn outlier_queries(
    context: &HashMap<String, String>,
    catalog: &DatasetCatalog,
    safe_mode: bool,
) -> Result<Vec<PlannedQuery>> {
    let column = context
        .get("metric")
        .map(|s| s.as_str())
        .or_else(|| catalog.numeric_columns.first().map(|s| s.as_str()))
        .ok_or_else(|| {
            CoreError::ValidationFailure(
                "no numeric column available for outlier analysis".to_string(),
            )
        })?;

    let col = quote_ident(column);
    let stats = format!(
        "(SELECT AVG({col}) as mean_val, STDDEV({col}) as std_val FROM {table}) s",
        col = col,
        table = TABLE,
    );

    let sql = if safe_mode {
        // Aggregated shape: outlier count only, no raw rows.
        format!(
            "SELECT COUNT(*) as outlier_count FROM {table} t, {stats} \
             WHERE ABS(t.{col} - s.mean_val) > 2 * s.std_val LIMIT 1",
            table = TABLE,
            stats = stats,
            col = col,
        )
    } else {
        // Detailed shape: flagged rows with z-scores, capped.
        format!(
            "SELECT t.{col}, (t.{col} - s.mean_val) / NULLIF(s.std_val, 0) as z_score \
             FROM {table} t, {stats} \
             WHERE ABS(t.{col} - s.mean_val) > 2 * s.std_val \
             ORDER BY ABS(t.{col} - s.mean_val) DESC LIMIT {cap}",
            col = col,
            table = TABLE,
            stats = stats,
            cap = OUTLIER_ROW_CAP,
        )
    };

    Ok(vec![PlannedQuery {
        name: "outliers".to_string(),
        sql,
    }])
}

fn data_quality_queries(catalog: &DatasetCatalog) -> Vec<PlannedQuery> {
    let null_exprs: Vec<String> = catalog
        .columns
        .iter()
        .map(|c| {
            format!(
                "COUNT(*) - COUNT({col}) as {alias}",
                col = quote_ident(&c.name),
                alias = quote_ident(&format!("{}_nulls", c.name)),
            )
        })
        .collect();

    let null_sql = if null_exprs.is_empty() {
        format!("SELECT COUNT(*) as row_count FROM {} LIMIT 1", TABLE)
    } else {
        format!("SELECT {} FROM {} LIMIT 1", null_exprs.join(", "), TABLE)
    };

    vec![
        PlannedQuery {
            name: "null_counts".to_string(),
            sql: null_sql,
        },
        PlannedQuery {
            name: "duplicate_count".to_string(),
            sql: format!(
                "SELECT (COUNT(*) - (SELECT COUNT(*) FROM (SELECT DISTINCT * FROM {table}) d)) \
                 as duplicate_count FROM {table} LIMIT 1",
                table = TABLE,
            ),
        },
    ]
}

fn bucket_unit(time_period: &str) -> &'static str {
    match time_period {
        "last_7_days" | "this_week" | "last_week" | "this_month" | "last_month" => "day",
        "last_30_days" => "day",
        "last_90_days" | "this_quarter" | "last_quarter" => "week",
        "this_year" | "last_year" => "month",
        _ => "month",
    }
}

fn time_filter(date_column: &str, time_period: &str) -> String {
    let col = quote_ident(date_column);
    let clause = match time_period {
        "last_7_days" => format!("{} >= CURRENT_DATE - INTERVAL 7 DAY", col),
        "last_30_days" => format!("{} >= CURRENT_DATE - INTERVAL 30 DAY", col),
        "last_90_days" => format!("{} >= CURRENT_DATE - INTERVAL 90 DAY", col),
        "this_week" => format!(
            "DATE_TRUNC('week', {}) = DATE_TRUNC('week', CURRENT_DATE)",
            col
        ),
        "last_week" => format!(
            "DATE_TRUNC('week', {}) = DATE_TRUNC('week', CURRENT_DATE - INTERVAL 7 DAY)",
            col
        ),
        "this_month" => format!(
            "DATE_TRUNC('month', {}) = DATE_TRUNC('month', CURRENT_DATE)",
            col
        ),
        "last_month" => format!(
            "DATE_TRUNC('month', {}) = DATE_TRUNC('month', CURRENT_DATE - INTERVAL 1 MONTH)",
            col
        ),
        "this_quarter" => format!(
            "DATE_TRUNC('quarter', {}) = DATE_TRUNC('quarter', CURRENT_DATE)",
            col
        ),
        "last_quarter" => format!(
            "DATE_TRUNC('quarter', {}) = DATE_TRUNC('quarter', CURRENT_DATE - INTERVAL 3 MONTH)",
            col
        ),
        "this_year" => format!(
            "DATE_TRUNC('year', {}) = DATE_TRUNC('year', CURRENT_DATE)",
            col
        ),
        "last_year" => format!(
            "DATE_TRUNC('year', {}) = DATE_TRUNC('year', CURRENT_DATE - INTERVAL 1 YEAR)",
            col
        ),
        _ => return String::new(),
    };
    format!(" WHERE {}", clause)
}

/// Quotes catalog-derived identifiers; generated aliases stay bare.
fn quote_ident(name: &str) -> String {
    if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::{ColumnInfo, PiiColumn, PiiKind};
    use crate::services::safety;

    fn sample_catalog() -> DatasetCatalog {
        DatasetCatalog {
            dataset_id: "ds1".to_string(),
            row_count: 1748,
            columns: vec![
                ColumnInfo {
                    name: "created_at".to_string(),
                    data_type: "date".to_string(),
                    nullable: false,
                },
                ColumnInfo {
                    name: "region".to_string(),
                    data_type: "string".to_string(),
                    nullable: true,
                },
                ColumnInfo {
                    name: "amount".to_string(),
                    data_type: "float".to_string(),
                    nullable: false,
                },
                ColumnInfo {
                    name: "customer_email".to_string(),
                    data_type: "string".to_string(),
                    nullable: true,
                },
            ],
            date_columns: vec!["created_at".to_string()],
            numeric_columns: vec!["amount".to_string()],
            statistics: HashMap::new(),
            pii_columns: vec![PiiColumn {
                name: "customer_email".to_string(),
                kind: PiiKind::Email,
                confidence: 0.95,
            }],
        }
    }

    #[test]
    fn row_count_plan_is_single_bounded_count() {
        let plan = build_plan(
            AnalysisCategory::RowCount,
            &HashMap::new(),
            &sample_catalog(),
            true,
        )
        .unwrap();
        assert_eq!(plan.queries.len(), 1);
        assert_eq!(
            plan.queries[0].sql,
            "SELECT COUNT(*) as row_count FROM data LIMIT 1"
        );
    }

    #[test]
    fn trend_plan_buckets_and_orders() {
        let mut context = HashMap::new();
        context.insert("time_period".to_string(), "last_30_days".to_string());
        let plan = build_plan(
            AnalysisCategory::Trend,
            &context,
            &sample_catalog(),
            true,
        )
        .unwrap();
        let sql = &plan.queries[0].sql;
        assert!(sql.contains("DATE_TRUNC"));
        assert!(sql.contains("GROUP BY period"));
        assert!(sql.contains("ORDER BY period"));
        assert!(sql.contains("INTERVAL 30 DAY"));
    }

    #[test]
    fn trend_without_date_column_fails() {
        let mut catalog = sample_catalog();
        catalog.date_columns.clear();
        let result = build_plan(AnalysisCategory::Trend, &HashMap::new(), &catalog, true);
        assert!(matches!(result, Err(CoreError::ValidationFailure(_))));
    }

    #[test]
    fn top_categories_uses_first_categorical_and_top_n() {
        let mut context = HashMap::new();
        context.insert("top_n".to_string(), "5".to_string());
        let plan = build_plan(
            AnalysisCategory::TopCategories,
            &context,
            &sample_catalog(),
            true,
        )
        .unwrap();
        let sql = &plan.queries[0].sql;
        assert!(sql.contains("GROUP BY region"));
        assert!(sql.ends_with("LIMIT 5"));
    }

    #[test]
    fn outlier_plan_shape_depends_on_safe_mode() {
        let catalog = sample_catalog();
        let safe = build_plan(AnalysisCategory::Outliers, &HashMap::new(), &catalog, true)
            .unwrap();
        assert!(safe.queries[0].sql.contains("outlier_count"));

        let detailed =
            build_plan(AnalysisCategory::Outliers, &HashMap::new(), &catalog, false).unwrap();
        assert!(detailed.queries[0].sql.contains("z_score"));
    }

    #[test]
    fn data_quality_plan_has_null_and_duplicate_queries() {
        let plan = build_plan(
            AnalysisCategory::DataQuality,
            &HashMap::new(),
            &sample_catalog(),
            true,
        )
        .unwrap();
        assert_eq!(plan.queries.len(), 2);
        assert_eq!(plan.queries[0].name, "null_counts");
        assert_eq!(plan.queries[1].name, "duplicate_count");
    }

    #[test]
    fn every_plan_passes_the_validator_in_safe_mode() {
        let catalog = sample_catalog();
        for category in AnalysisCategory::ALL {
            let plan = build_plan(category, &HashMap::new(), &catalog, true).unwrap();
            safety::validate_plan(&plan, true).unwrap();
        }
    }
}
