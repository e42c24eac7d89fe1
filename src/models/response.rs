use serde::{Serialize, Deserialize};
use std::collections::HashMap;

use crate::models::conversation::{ClarificationKind, QueryPlan};

/// A table rendered alongside a summary, already masked where required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Human-readable summary plus the structured tables it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub markdown: String,
    pub tables: Vec<SummaryTable>,
}

/// Everything one turn can resolve to.
///
/// Serialized as a tagged union so transport layers can switch exhaustively
/// on `type` instead of probing optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnResponse {
    /// Required context is missing; ask the caller a question with choices.
    Clarification {
        conversation_id: String,
        kind: ClarificationKind,
        question: String,
        choices: Vec<String>,
    },
    /// Validated queries for the execution layer to run against table `data`.
    Queries {
        conversation_id: String,
        plan: QueryPlan,
    },
    /// Final answer. `terminal` marks loop-breaker and degraded answers that
    /// should not prompt a retry of the same message.
    Answer {
        conversation_id: String,
        markdown: String,
        tables: Vec<SummaryTable>,
        terminal: bool,
    },
    /// A structured intent was applied; echoes the updated state fragment.
    Acknowledgement {
        conversation_id: String,
        updated: HashMap<String, String>,
    },
}

impl TurnResponse {
    pub fn conversation_id(&self) -> &str {
        match self {
            TurnResponse::Clarification { conversation_id, .. }
            | TurnResponse::Queries { conversation_id, .. }
            | TurnResponse::Answer { conversation_id, .. }
            | TurnResponse::Acknowledgement { conversation_id, .. } => conversation_id,
        }
    }
}
