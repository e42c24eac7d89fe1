use log::debug;
use serde_json::Value;

use crate::models::conversation::{AnalysisCategory, ExecutedResult};
use crate::models::response::{Summary, SummaryTable};

/// Fixed message for a summarization request with no tables attached.
pub const NO_RESULTS_MESSAGE: &str =
    "No query results were supplied, so there is nothing to summarize.";

/// Execution metadata echoed into the summary footer.
#[derive(Debug, Clone, Default)]
pub struct ExecutionAudit {
    pub query_names: Vec<String>,
    pub safe_mode: bool,
    pub privacy_mode: bool,
}

/// Renders executed result tables into markdown plus structured tables.
///
/// Dispatch is a compile-time match on the category enum with a generic
/// fallback; every category summarizer only references literal values present
/// in the supplied tables.
pub fn summarize(
    category: Option<AnalysisCategory>,
    tables: &[ExecutedResult],
    audit: &ExecutionAudit,
) -> Summary {
    if tables.is_empty() {
        return Summary {
            markdown: NO_RESULTS_MESSAGE.to_string(),
            tables: Vec::new(),
        };
    }

    debug!(
        "Summarizing {} table(s) for category {:?}",
        tables.len(),
        category
    );

    let mut markdown = match category {
        Some(AnalysisCategory::RowCount) => summarize_row_count(tables),
        Some(AnalysisCategory::Trend) => summarize_trend(tables),
        Some(AnalysisCategory::TopCategories) => summarize_top_categories(tables),
        Some(AnalysisCategory::Outliers) => summarize_outliers(tables),
        Some(AnalysisCategory::DataQuality) => summarize_data_quality(tables),
        None => summarize_generic(tables),
    };

    if !audit.query_names.is_empty() {
        let mode = match (audit.safe_mode, audit.privacy_mode) {
            (true, true) => " in Safe Mode with Privacy Mode on",
            (true, false) => " in Safe Mode",
            (false, true) => " with Privacy Mode on",
            (false, false) => "",
        };
        markdown.push_str(&format!(
            "\n\n_{} quer{} executed{}._",
            audit.query_names.len(),
            if audit.query_names.len() == 1 { "y" } else { "ies" },
            mode,
        ));
    }

    Summary {
        markdown,
        tables: tables
            .iter()
            .map(|t| SummaryTable {
                name: t.name.clone(),
                columns: t.columns.clone(),
                rows: t.rows.clone(),
            })
            .collect(),
    }
}

fn summarize_row_count(tables: &[ExecutedResult]) -> String {
    let table = &tables[0];
    let idx = column_index(table, "row_count").unwrap_or(0);
    match table.rows.first().and_then(|row| row.get(idx)) {
        Some(value) => match as_f64(value) {
            Some(n) => format!(
                "The dataset contains **{}** rows.",
                format_thousands(n.round() as i64)
            ),
            None => format!("The dataset row count is {}.", render_value(value)),
        },
        None => summarize_generic(tables),
    }
}

fn summarize_trend(tables: &[ExecutedResult]) -> String {
    let table = &tables[0];
    let period_idx = column_index(table, "period").unwrap_or(0);
    let value_idx = column_index(table, "count")
        .or_else(|| first_numeric_column(table, period_idx))
        .unwrap_or(1);

    let periods = table.rows.len();
    if periods == 0 {
        return "The trend query returned no periods.".to_string();
    }

    let last_row = &table.rows[periods - 1];
    let last_period = last_row
        .get(period_idx)
        .map(render_value)
        .unwrap_or_default();
    let last_value = last_row.get(value_idx).and_then(as_f64);

    let mut lines = vec![format!(
        "The trend covers **{}** period{}.",
        format_thousands(periods as i64),
        if periods == 1 { "" } else { "s" },
    )];

    if let Some(value) = last_value {
        lines.push(format!(
            "The most recent period ({}) has a value of **{}**.",
            last_period,
            format_number(value)
        ));
    }

    if periods >= 2 {
        let prev_value = table.rows[periods - 2].get(value_idx).and_then(as_f64);
        if let (Some(last), Some(prev)) = (last_value, prev_value) {
            if prev != 0.0 {
                let change = (last - prev) / prev * 100.0;
                let direction = if change >= 0.0 { "up" } else { "down" };
                lines.push(format!(
                    "That is {} **{:.1}%** from the previous period.",
                    direction,
                    change.abs()
                ));
            }
        }
    }

    lines.join(" ")
}

fn summarize_top_categories(tables: &[ExecutedResult]) -> String {
    let table = &tables[0];
    let label_idx = column_index(table, "category").unwrap_or(0);
    let count_idx = column_index(table, "count")
        .or_else(|| first_numeric_column(table, label_idx))
        .unwrap_or(1);

    let total: f64 = table
        .rows
        .iter()
        .filter_map(|row| row.get(count_idx).and_then(as_f64))
        .sum();
    if total == 0.0 {
        return "The top-categories query returned no counts.".to_string();
    }

    let mut lines = vec![format!(
        "Top {} categor{} by count:",
        table.rows.len(),
        if table.rows.len() == 1 { "y" } else { "ies" },
    )];
    for row in &table.rows {
        let label = row.get(label_idx).map(render_value).unwrap_or_default();
        if let Some(count) = row.get(count_idx).and_then(as_f64) {
            lines.push(format!(
                "- **{}**: {} ({:.1}%)",
                label,
                format_number(count),
                count / total * 100.0
            ));
        }
    }
    lines.join("\n")
}

fn summarize_outliers(tables: &[ExecutedResult]) -> String {
    let table = &tables[0];

    // Aggregated safe shape: a single outlier_count cell.
    if let Some(idx) = column_index(table, "outlier_count") {
        let count = table
            .rows
            .first()
            .and_then(|row| row.get(idx))
            .and_then(as_f64)
            .unwrap_or(0.0);
        return format!(
            "**{}** value{} beyond 2 standard deviations from the mean.",
            format_thousands(count.round() as i64),
            if count.round() as i64 == 1 { " lies" } else { "s lie" },
        );
    }

    // Detailed shape: individual flagged rows with z-scores.
    let flagged = table.rows.len();
    let z_idx = column_index(table, "z_score");
    let max_z = z_idx.and_then(|idx| {
        table
            .rows
            .iter()
            .filter_map(|row| row.get(idx).and_then(as_f64))
            .fold(None, |acc: Option<f64>, z| {
                Some(acc.map_or(z.abs(), |m| m.max(z.abs())))
            })
    });

    match max_z {
        Some(z) => format!(
            "**{}** row{} flagged as outliers; the largest |z-score| is **{:.2}**.",
            format_thousands(flagged as i64),
            if flagged == 1 { " was" } else { "s were" },
            z
        ),
        None => format!(
            "**{}** row{} flagged as outliers.",
            format_thousands(flagged as i64),
            if flagged == 1 { " was" } else { "s were" },
        ),
    }
}

fn summarize_data_quality(tables: &[ExecutedResult]) -> String {
    let mut lines = Vec::new();

    if let Some(nulls) = tables.iter().find(|t| t.name == "null_counts") {
        if let Some(row) = nulls.rows.first() {
            let mut affected: Vec<String> = Vec::new();
            for (i, column) in nulls.columns.iter().enumerate() {
                if let Some(count) = row.get(i).and_then(as_f64) {
                    if count > 0.0 {
                        let name = column.strip_suffix("_nulls").unwrap_or(column);
                        affected.push(format!(
                            "{} ({} nulls)",
                            name,
                            format_thousands(count.round() as i64)
                        ));
                    }
                }
            }
            if affected.is_empty() {
                lines.push("No null values were found in any column.".to_string());
            } else {
                lines.push(format!("Columns with null values: {}.", affected.join(", ")));
            }
        }
    }

    if let Some(dupes) = tables.iter().find(|t| t.name == "duplicate_count") {
        let count = dupes
            .rows
            .first()
            .and_then(|row| {
                let idx = column_index(dupes, "duplicate_count").unwrap_or(0);
                row.get(idx)
            })
            .and_then(as_f64)
            .unwrap_or(0.0);
        if count > 0.0 {
            lines.push(format!(
                "**{}** duplicate row{} detected.",
                format_thousands(count.round() as i64),
                if count.round() as i64 == 1 { "" } else { "s" },
            ));
        } else {
            lines.push("No duplicate rows were detected.".to_string());
        }
    }

    if lines.is_empty() {
        return summarize_generic(tables);
    }
    lines.join(" ")
}

/// Fallback for unknown categories: names, shapes and up to three numeric
/// highlights from the first row of each table. No canned interpretation.
fn summarize_generic(tables: &[ExecutedResult]) -> String {
    let mut lines = Vec::new();
    for table in tables {
        lines.push(format!(
            "**{}**: {} row{}, {} column{}.",
            table.name,
            format_thousands(table.row_count as i64),
            if table.row_count == 1 { "" } else { "s" },
            table.columns.len(),
            if table.columns.len() == 1 { "" } else { "s" },
        ));

        if let Some(row) = table.rows.first() {
            let highlights: Vec<String> = table
                .columns
                .iter()
                .zip(row.iter())
                .filter_map(|(name, value)| {
                    as_f64(value).map(|n| format!("{} = {}", name, format_number(n)))
                })
                .take(3)
                .collect();
            if !highlights.is_empty() {
                lines.push(format!("  First row: {}.", highlights.join(", ")));
            }
        }
    }
    lines.join("\n")
}

fn column_index(table: &ExecutedResult, name: &str) -> Option<usize> {
    table.columns.iter().position(|c| c == name)
}

fn first_numeric_column(table: &ExecutedResult, skip: usize) -> Option<usize> {
    let row = table.rows.first()?;
    row.iter()
        .enumerate()
        .find(|(i, value)| *i != skip && as_f64(value).is_some())
        .map(|(i, _)| i)
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `1748` -> `1,748`.
fn format_thousands(n: i64) -> String {
    let negative = n < 0;
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if negative {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Integral values get thousands separators; fractional values keep two
/// decimal places.
fn format_number(n: f64) -> String {
    if (n.fract()).abs() < f64::EPSILON {
        format_thousands(n as i64)
    } else {
        format!("{:.2}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> ExecutedResult {
        ExecutedResult {
            name: name.to_string(),
            columns: columns.iter().map(|s| s.to_string()).collect(),
            row_count: rows.len(),
            rows,
        }
    }

    #[test]
    fn empty_tables_return_fixed_message() {
        let summary = summarize(
            Some(AnalysisCategory::RowCount),
            &[],
            &ExecutionAudit::default(),
        );
        assert_eq!(summary.markdown, NO_RESULTS_MESSAGE);
        assert!(summary.tables.is_empty());
    }

    #[test]
    fn row_count_renders_thousands_separator() {
        let tables = vec![table("row_count", &["row_count"], vec![vec![json!(1748)]])];
        let summary = summarize(
            Some(AnalysisCategory::RowCount),
            &tables,
            &ExecutionAudit::default(),
        );
        assert!(summary.markdown.contains("1,748"));
    }

    #[test]
    fn row_count_falls_back_to_first_column() {
        let tables = vec![table("counts", &["n"], vec![vec![json!(42)]])];
        let summary = summarize(
            Some(AnalysisCategory::RowCount),
            &tables,
            &ExecutionAudit::default(),
        );
        assert!(summary.markdown.contains("42"));
    }

    #[test]
    fn trend_reports_periods_and_change() {
        let tables = vec![table(
            "trend",
            &["period", "count"],
            vec![
                vec![json!("2026-06-01"), json!(100)],
                vec![json!("2026-07-01"), json!(150)],
            ],
        )];
        let summary = summarize(
            Some(AnalysisCategory::Trend),
            &tables,
            &ExecutionAudit::default(),
        );
        assert!(summary.markdown.contains("**2** period"));
        assert!(summary.markdown.contains("150"));
        assert!(summary.markdown.contains("50.0%"));
    }

    #[test]
    fn top_categories_percentages_sum_against_supplied_counts() {
        let tables = vec![table(
            "top_categories",
            &["category", "count"],
            vec![
                vec![json!("north"), json!(75)],
                vec![json!("south"), json!(25)],
            ],
        )];
        let summary = summarize(
            Some(AnalysisCategory::TopCategories),
            &tables,
            &ExecutionAudit::default(),
        );
        assert!(summary.markdown.contains("75.0%"));
        assert!(summary.markdown.contains("25.0%"));
    }

    #[test]
    fn outliers_aggregated_and_detailed_shapes_differ() {
        let safe_tables = vec![table(
            "outliers",
            &["outlier_count"],
            vec![vec![json!(12)]],
        )];
        let safe = summarize(
            Some(AnalysisCategory::Outliers),
            &safe_tables,
            &ExecutionAudit::default(),
        );
        assert!(safe.markdown.contains("12"));
        assert!(safe.markdown.contains("standard deviation"));

        let detail_tables = vec![table(
            "outliers",
            &["amount", "z_score"],
            vec![
                vec![json!(900.0), json!(3.4)],
                vec![json!(-500.0), json!(-2.7)],
            ],
        )];
        let detail = summarize(
            Some(AnalysisCategory::Outliers),
            &detail_tables,
            &ExecutionAudit::default(),
        );
        assert!(detail.markdown.contains("3.40"));
    }

    #[test]
    fn data_quality_lists_affected_columns() {
        let tables = vec![
            table(
                "null_counts",
                &["email_nulls", "amount_nulls"],
                vec![vec![json!(3), json!(0)]],
            ),
            table("duplicate_count", &["duplicate_count"], vec![vec![json!(2)]]),
        ];
        let summary = summarize(
            Some(AnalysisCategory::DataQuality),
            &tables,
            &ExecutionAudit::default(),
        );
        assert!(summary.markdown.contains("email (3 nulls)"));
        assert!(!summary.markdown.contains("amount ("));
        assert!(summary.markdown.contains("**2** duplicate rows"));
    }

    #[test]
    fn generic_fallback_lists_shapes_and_highlights() {
        let tables = vec![table(
            "misc",
            &["a", "b", "c", "d"],
            vec![vec![json!(1), json!(2.5), json!("x"), json!(4)]],
        )];
        let summary = summarize(None, &tables, &ExecutionAudit::default());
        assert!(summary.markdown.contains("**misc**"));
        assert!(summary.markdown.contains("1 row"));
        assert!(summary.markdown.contains("4 columns"));
        assert!(summary.markdown.contains("a = 1"));
        // no canned interpretive language
        assert!(!summary.markdown.to_lowercase().contains("diverse"));
    }

    #[test]
    fn audit_footer_names_modes() {
        let tables = vec![table("row_count", &["row_count"], vec![vec![json!(5)]])];
        let audit = ExecutionAudit {
            query_names: vec!["row_count".to_string()],
            safe_mode: true,
            privacy_mode: true,
        };
        let summary = summarize(Some(AnalysisCategory::RowCount), &tables, &audit);
        assert!(summary.markdown.contains("1 query executed in Safe Mode"));
    }

    #[test]
    fn thousands_formatting() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1748), "1,748");
        assert_eq!(format_thousands(1234567), "1,234,567");
        assert_eq!(format_thousands(-4200), "-4,200");
        assert_eq!(format_thousands(i64::MIN), "-9,223,372,036,854,775,808");
    }

    #[test]
    fn extreme_negative_cell_does_not_panic() {
        // A saturating f64 -> i64 cast lands on i64::MIN.
        let tables = vec![table("row_count", &["row_count"], vec![vec![json!(-1e300)]])];
        let summary = summarize(
            Some(AnalysisCategory::RowCount),
            &tables,
            &ExecutionAudit::default(),
        );
        assert!(summary.markdown.contains("-9,223,372,036,854,775,808"));
    }
}
