use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Fixed set of analysis shapes the planner knows how to build SQL for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisCategory {
    RowCount,
    Trend,
    TopCategories,
    Outliers,
    DataQuality,
}

impl AnalysisCategory {
    pub const ALL: [AnalysisCategory; 5] = [
        AnalysisCategory::RowCount,
        AnalysisCategory::Trend,
        AnalysisCategory::TopCategories,
        AnalysisCategory::Outliers,
        AnalysisCategory::DataQuality,
    ];

    /// Context-slot value for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisCategory::RowCount => "row_count",
            AnalysisCategory::Trend => "trend",
            AnalysisCategory::TopCategories => "top_categories",
            AnalysisCategory::Outliers => "outliers",
            AnalysisCategory::DataQuality => "data_quality",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == value)
    }

    /// Whole-table categories ignore any supplied time period and are forced
    /// to `all_time`.
    pub fn requires_time_period(&self) -> bool {
        !matches!(self, AnalysisCategory::RowCount | AnalysisCategory::DataQuality)
    }
}

/// Kinds of clarification question the orchestrator may ask. Each kind is
/// askable at most once per conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationKind {
    AnalysisType,
    TimePeriod,
    Rephrase,
}

impl ClarificationKind {
    /// Context slot answered by this clarification, if any.
    pub fn context_slot(&self) -> Option<&'static str> {
        match self {
            ClarificationKind::AnalysisType => Some("analysis_type"),
            ClarificationKind::TimePeriod => Some("time_period"),
            ClarificationKind::Rephrase => None,
        }
    }

    pub fn for_slot(slot: &str) -> Option<Self> {
        match slot {
            "analysis_type" => Some(ClarificationKind::AnalysisType),
            "time_period" => Some(ClarificationKind::TimePeriod),
            _ => None,
        }
    }
}

/// Accumulated per-conversation context.
///
/// The context map grows monotonically across turns; keys are only removed by
/// an explicit clear. Mutation for a given id is serialized by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: String,
    /// Free-form slots: `analysis_type`, `time_period`, `metric`,
    /// `dimension`, `grouping`, ...
    pub context: HashMap<String, String>,
    pub clarifications_asked: HashSet<ClarificationKind>,
    pub message_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            context: HashMap::new(),
            clarifications_asked: HashSet::new(),
            message_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn analysis_category(&self) -> Option<AnalysisCategory> {
        self.context
            .get("analysis_type")
            .and_then(|v| AnalysisCategory::parse(v))
    }

    pub fn time_period(&self) -> Option<&str> {
        self.context.get("time_period").map(|s| s.as_str())
    }
}

/// Outcome of routing one free-text message. Ephemeral, recomputed per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub category: Option<AnalysisCategory>,
    /// Certainty in [0, 1] that the keyword match identifies the category.
    pub confidence: f64,
    /// Independently extracted parameters (time period, top-N, ...).
    pub params: HashMap<String, String>,
}

impl RoutingDecision {
    pub fn none() -> Self {
        Self {
            category: None,
            confidence: 0.0,
            params: HashMap::new(),
        }
    }
}

/// One named SQL statement within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedQuery {
    pub name: String,
    pub sql: String,
}

/// An ordered batch of validated, read-only queries for one turn.
///
/// Every entry handed to the execution layer or the completion service has
/// already passed the safety validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    pub category: AnalysisCategory,
    pub queries: Vec<PlannedQuery>,
}

/// Result of executing one planned query, supplied back by the execution
/// component on a later turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedResult {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
}

/// Structured intents a caller can apply directly to conversation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredIntent {
    SetAnalysisType,
    SetTimePeriod,
    SetMetric,
    SetDimension,
    SetGrouping,
}

impl StructuredIntent {
    pub fn context_slot(&self) -> &'static str {
        match self {
            StructuredIntent::SetAnalysisType => "analysis_type",
            StructuredIntent::SetTimePeriod => "time_period",
            StructuredIntent::SetMetric => "metric",
            StructuredIntent::SetDimension => "dimension",
            StructuredIntent::SetGrouping => "grouping",
        }
    }
}

/// One inbound turn. Exactly one of `message` / `intent` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Caller-supplied id; generated when absent.
    pub conversation_id: Option<String>,
    pub dataset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<StructuredIntent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Results of a previously issued plan, when this turn closes the loop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_context: Option<Vec<ExecutedResult>>,
    pub privacy_mode: bool,
    pub safe_mode: bool,
    pub ai_assist_enabled: bool,
}

impl TurnRequest {
    pub fn free_text(dataset_id: &str, message: &str) -> Self {
        Self {
            conversation_id: None,
            dataset_id: dataset_id.to_string(),
            message: Some(message.to_string()),
            intent: None,
            value: None,
            results_context: None,
            privacy_mode: true,
            safe_mode: true,
            ai_assist_enabled: false,
        }
    }

    pub fn structured(dataset_id: &str, intent: StructuredIntent, value: &str) -> Self {
        Self {
            conversation_id: None,
            dataset_id: dataset_id.to_string(),
            message: None,
            intent: Some(intent),
            value: Some(value.to_string()),
            results_context: None,
            privacy_mode: true,
            safe_mode: true,
            ai_assist_enabled: false,
        }
    }

    pub fn with_conversation(mut self, id: &str) -> Self {
        self.conversation_id = Some(id.to_string());
        self
    }

    pub fn with_results(mut self, results: Vec<ExecutedResult>) -> Self {
        self.results_context = Some(results);
        self
    }

    /// Fill the per-turn policy flags from config defaults. Callers that
    /// carry explicit flags set them after this.
    pub fn with_config_defaults(mut self, config: &crate::config::Config) -> Self {
        self.privacy_mode = config.privacy_mode_default;
        self.safe_mode = config.safe_mode_default;
        self.ai_assist_enabled = config.ai_assist_default;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn config_defaults_fill_turn_flags() {
        let config = Config {
            open_ai_key: None,
            safe_mode_default: false,
            privacy_mode_default: true,
            ai_assist_default: true,
        };
        let request = TurnRequest::free_text("orders", "row count").with_config_defaults(&config);
        assert!(!request.safe_mode);
        assert!(request.privacy_mode);
        assert!(request.ai_assist_enabled);
    }

    #[test]
    fn whole_table_categories_skip_the_time_period() {
        assert!(!AnalysisCategory::RowCount.requires_time_period());
        assert!(!AnalysisCategory::DataQuality.requires_time_period());
        assert!(AnalysisCategory::Trend.requires_time_period());
    }
}
