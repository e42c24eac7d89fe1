use std::collections::HashMap;

use log::info;
use serde_json::Value;

use crate::models::catalog::{DatasetCatalog, PiiKind};

/// Schema-level redaction, applied before a catalog leaves the local boundary
/// toward an external completion service.
///
/// Each detected PII column name is replaced by a `PII_<KIND>_<n>` placeholder
/// (ordinal per kind, counted in catalog column order, starting at 1). The
/// redacted copy drops PII columns from statistics and from the date/numeric
/// lists and clears the PII list itself. Returns the placeholder -> original
/// map for reverse-mapping; that map never leaves the boundary.
///
/// With privacy mode off this is a no-op returning an empty map. The source
/// catalog is never mutated.
pub fn redact_catalog(
    catalog: &DatasetCatalog,
    privacy_mode: bool,
) -> (DatasetCatalog, HashMap<String, String>) {
    if !privacy_mode || catalog.pii_columns.is_empty() {
        return (catalog.clone(), HashMap::new());
    }

    let pii_kinds = catalog.pii_kind_map();
    let mut kind_counters: HashMap<PiiKind, usize> = HashMap::new();
    let mut placeholder_by_original: HashMap<String, String> = HashMap::new();
    let mut reverse_map: HashMap<String, String> = HashMap::new();

    let mut redacted = catalog.clone();

    // Ordinals follow catalog column order, not pii-list order.
    for column in &mut redacted.columns {
        if let Some(kind) = pii_kinds.get(&column.name) {
            let counter = kind_counters.entry(*kind).or_insert(0);
            *counter += 1;
            let placeholder = format!("PII_{}_{}", kind.placeholder_token(), counter);
            placeholder_by_original.insert(column.name.clone(), placeholder.clone());
            reverse_map.insert(placeholder.clone(), column.name.clone());
            column.name = placeholder;
        }
    }

    redacted
        .statistics
        .retain(|name, _| !placeholder_by_original.contains_key(name));
    redacted
        .date_columns
        .retain(|name| !placeholder_by_original.contains_key(name));
    redacted
        .numeric_columns
        .retain(|name| !placeholder_by_original.contains_key(name));
    redacted.pii_columns.clear();

    info!(
        "Redacted {} PII column(s) from catalog {}",
        reverse_map.len(),
        catalog.dataset_id
    );

    (redacted, reverse_map)
}

/// Value-level masking for row samples before they are exposed in a response.
///
/// With privacy mode off rows pass through unchanged.
pub fn mask_rows(
    rows: &[Vec<Value>],
    columns: &[String],
    pii_kinds: &HashMap<String, PiiKind>,
    privacy_mode: bool,
) -> Vec<Vec<Value>> {
    if !privacy_mode || pii_kinds.is_empty() {
        return rows.to_vec();
    }

    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, cell)| {
                    match columns.get(i).and_then(|name| pii_kinds.get(name)) {
                        Some(kind) => mask_value(cell, *kind),
                        None => cell.clone(),
                    }
                })
                .collect()
        })
        .collect()
}

/// Masks one cell according to the detected PII kind. Null and empty values
/// pass through unchanged.
pub fn mask_value(value: &Value, kind: PiiKind) -> Value {
    let Some(text) = value.as_str() else {
        // Non-string PII cells (e.g. numeric phone columns) are masked via
        // their string rendering, nulls stay null.
        if value.is_null() {
            return value.clone();
        }
        return Value::String(mask_text(&value.to_string(), kind));
    };
    if text.is_empty() {
        return value.clone();
    }
    Value::String(mask_text(text, kind))
}

fn mask_text(text: &str, kind: PiiKind) -> String {
    match kind {
        PiiKind::Email => mask_email(text),
        PiiKind::Phone => mask_phone(text),
        PiiKind::Name => mask_leading(text),
    }
}

/// Keeps the first local-part character and the domain: `j***@example.com`.
fn mask_email(text: &str) -> String {
    match text.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first = local.chars().next().unwrap_or('*');
            format!("{}***@{}", first, domain)
        }
        _ => mask_leading(text),
    }
}

/// Keeps only the last four digits: `****4567`.
fn mask_phone(text: &str) -> String {
    let digits: Vec<char> = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return "****".to_string();
    }
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("****{}", tail)
}

/// Fallback for names and unrecognized kinds: first character + `***`.
fn mask_leading(text: &str) -> String {
    let first = text.chars().next().unwrap_or('*');
    format!("{}***", first)
}
