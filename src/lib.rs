//! Conversational intent-resolution and SQL-safety core for exploring a
//! tabular dataset through natural-language questions.
//!
//! The pipeline turns one inbound turn (a free-text message or a structured
//! intent) plus a dataset catalog into exactly one of: a clarification
//! request, a validated read-only query plan, or a final answer. Privacy and
//! safety gates sit at every hand-off: catalogs are redacted before they
//! reach an external completion service, sampled rows are masked before they
//! reach the caller, and every generated SQL statement passes the safety
//! validator.
//!
//! File ingestion, the HTTP transport, persistence, and the raw completion
//! network call live outside this crate behind the [`services::CatalogProvider`]
//! and [`services::CompletionService`] traits.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{CoreError, Result};
pub use models::catalog::{ColumnInfo, ColumnStatistics, DatasetCatalog, PiiColumn, PiiKind};
pub use models::conversation::{
    AnalysisCategory, ClarificationKind, ConversationState, ExecutedResult, PlannedQuery,
    QueryPlan, RoutingDecision, StructuredIntent, TurnRequest,
};
pub use models::response::{Summary, SummaryTable, TurnResponse};
pub use services::{
    CatalogProvider, CompletionService, ConversationStateStore, IntentRouter,
    MemoryCatalogProvider, OpenAiCompletionService, Orchestrator,
};
