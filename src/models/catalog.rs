use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of personally identifying value detected in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Email,
    Phone,
    Name,
}

impl PiiKind {
    /// Uppercase token used in redaction placeholders (`PII_EMAIL_1`).
    pub fn placeholder_token(&self) -> &'static str {
        match self {
            PiiKind::Email => "EMAIL",
            PiiKind::Phone => "PHONE",
            PiiKind::Name => "NAME",
        }
    }
}

/// A column flagged as containing PII by the ingestion-side detector.
///
/// Detection is best-effort pattern matching, not a compliance guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiColumn {
    pub name: String,
    pub kind: PiiKind,
    /// Detector confidence in [0, 1].
    pub confidence: f64,
}

/// Name, inferred type and nullability of a single catalog column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Basic per-column statistics computed by the ingestion component.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ColumnStatistics {
    pub min: Option<String>,
    pub max: Option<String>,
    pub mean: Option<f64>,
    pub null_percentage: Option<f64>,
    pub approx_distinct: Option<u64>,
}

/// Schema-level description of an ingested dataset.
///
/// Produced once by ingestion and read-only to this core. The invariant that
/// `pii_columns` names are a subset of `columns` names is the producer's
/// responsibility; the redactor tolerates violations by skipping unknown names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetCatalog {
    pub dataset_id: String,
    pub row_count: usize,
    /// Ordered as in the source data.
    pub columns: Vec<ColumnInfo>,
    pub date_columns: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub statistics: HashMap<String, ColumnStatistics>,
    pub pii_columns: Vec<PiiColumn>,
}

impl DatasetCatalog {
    /// Lookup of column name -> PII kind for the masking path.
    pub fn pii_kind_map(&self) -> HashMap<String, PiiKind> {
        self.pii_columns
            .iter()
            .map(|p| (p.name.clone(), p.kind))
            .collect()
    }

    /// First date-typed column, used as the default trend dimension.
    pub fn first_date_column(&self) -> Option<&str> {
        self.date_columns.first().map(|s| s.as_str())
    }

    /// First column that is neither numeric nor date-typed, used as the
    /// default grouping dimension.
    pub fn first_categorical_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .find(|name| {
                !self.numeric_columns.iter().any(|n| n == name)
                    && !self.date_columns.iter().any(|d| d == name)
            })
    }
}
