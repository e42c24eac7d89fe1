use std::collections::HashMap;

use log::{error, info, warn};

use crate::config::CONFIDENCE_THRESHOLD;
use crate::error::{CoreError, Result};
use crate::models::catalog::DatasetCatalog;
use crate::models::conversation::{
    AnalysisCategory, ClarificationKind, ConversationState, ExecutedResult, TurnRequest,
};
use crate::models::response::TurnResponse;
use crate::services::ai::{build_intent_prompt, parse_intent_response, UNSPECIFIED};
use crate::services::router::IntentRouter;
use crate::services::state_store::ConversationStateStore;
use crate::services::summarizer::{self, ExecutionAudit};
use crate::services::{planner, privacy, safety, CatalogProvider, CompletionService};

const CATEGORY_QUESTION: &str = "What kind of analysis would you like?";
const TIME_PERIOD_QUESTION: &str = "What time period should the analysis cover?";
const TIME_PERIOD_CHOICES: [&str; 4] =
    ["last_7_days", "last_30_days", "last_90_days", "all_time"];

const UNSURE_MESSAGE: &str =
    "I'm still not sure what analysis you're looking for. Try rephrasing your question, \
     for example \"row count\" or \"top categories by region\".";
const UNSURE_PERIOD_MESSAGE: &str =
    "I'm still not sure which time period you mean. Try rephrasing with an explicit range, \
     for example \"last 30 days\" or \"all time\".";
const ASSIST_UNAVAILABLE_MESSAGE: &str =
    "I couldn't determine the analysis from your message, and external assistance is not \
     configured. Try rephrasing, or pick one of: row_count, trend, top_categories, outliers, \
     data_quality.";
const REPHRASE_QUESTION: &str =
    "I couldn't build a safe query for that request. Could you rephrase it?";

/// Resolves one inbound turn into one outbound response, advancing the
/// conversation state as a side effect.
///
/// The progression is implicit in context rather than stored: a conversation
/// needs a category, then (for most categories) a time period, then it is
/// ready to plan; once results come back it is answered. Each clarification
/// kind is asked at most once per conversation, after which the orchestrator
/// degrades to a terminal answer instead of looping.
pub struct Orchestrator<C, A>
where
    C: CatalogProvider,
    A: CompletionService,
{
    store: ConversationStateStore,
    router: IntentRouter,
    catalogs: C,
    completion: Option<A>,
}

impl<C, A> Orchestrator<C, A>
where
    C: CatalogProvider,
    A: CompletionService,
{
    pub fn new(catalogs: C, completion: Option<A>) -> Self {
        Self {
            store: ConversationStateStore::new(),
            router: IntentRouter::new(),
            catalogs,
            completion,
        }
    }

    pub fn state_store(&self) -> &ConversationStateStore {
        &self.store
    }

    /// Handle one turn. Exactly one of `message` / `intent` must be present.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResponse> {
        match (&request.message, &request.intent) {
            (Some(_), Some(_)) => {
                return Err(CoreError::PreconditionViolation(
                    "a turn must carry either a message or an intent, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(CoreError::PreconditionViolation(
                    "a turn must carry either a message or an intent".to_string(),
                ))
            }
            (None, Some(_)) if request.value.is_none() => {
                return Err(CoreError::PreconditionViolation(
                    "a structured intent requires a value".to_string(),
                ))
            }
            _ => {}
        }

        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.store.record_message(&conversation_id)?;

        if request.intent.is_some() {
            return self.handle_intent(&conversation_id, &request).await;
        }

        // Results attached: always bypass clarification and summarize. This
        // guards against re-asking a question after queries already ran.
        if let Some(results) = &request.results_context {
            return self.summarize_results(&conversation_id, &request, results).await;
        }

        self.handle_message(&conversation_id, &request).await
    }

    /// Structured-intent turns merge the value into the named slot, clear the
    /// matching asked-marker, then re-evaluate readiness.
    async fn handle_intent(
        &self,
        conversation_id: &str,
        request: &TurnRequest,
    ) -> Result<TurnResponse> {
        let (intent, value) = match (request.intent, request.value.clone()) {
            (Some(intent), Some(value)) => (intent, value),
            _ => {
                return Err(CoreError::PreconditionViolation(
                    "a structured intent requires a value".to_string(),
                ))
            }
        };
        let slot = intent.context_slot();

        info!(
            "Applying intent {:?} = {} to conversation {}",
            intent, value, conversation_id
        );

        let mut partial = HashMap::new();
        partial.insert(slot.to_string(), value.clone());

        // Setting row_count / data_quality pins the period to all_time even
        // when one was supplied earlier. See DESIGN.md for the UX caveat.
        if slot == "analysis_type" {
            if let Some(category) = AnalysisCategory::parse(&value) {
                if !category.requires_time_period() {
                    partial.insert("time_period".to_string(), "all_time".to_string());
                }
            } else {
                warn!("Unknown analysis_type value: {}", value);
            }
        }

        let state = self.store.merge(conversation_id, &partial)?;
        if let Some(kind) = ClarificationKind::for_slot(slot) {
            self.store.clear_clarification(conversation_id, kind)?;
        }

        if self.is_ready(&state) {
            let catalog = self.catalogs.load_catalog(&request.dataset_id).await?;
            return self.plan_or_degrade(conversation_id, &state, &catalog, request.safe_mode);
        }

        Ok(TurnResponse::Acknowledgement {
            conversation_id: conversation_id.to_string(),
            updated: partial,
        })
    }

    /// Free-text turns: route, clarify or delegate, then plan.
    async fn handle_message(
        &self,
        conversation_id: &str,
        request: &TurnRequest,
    ) -> Result<TurnResponse> {
        let message = request.message.as_deref().unwrap_or_default();
        let decision = self.router.route(message);

        // Extracted parameters merge regardless of category confidence.
        let mut state = if decision.params.is_empty() {
            self.store.get(conversation_id)?
        } else {
            self.store.merge(conversation_id, &decision.params)?
        };

        let confident = decision.confidence >= CONFIDENCE_THRESHOLD;
        if confident {
            if let Some(category) = decision.category {
                let mut partial = HashMap::new();
                partial.insert("analysis_type".to_string(), category.as_str().to_string());
                if !category.requires_time_period() {
                    partial.insert("time_period".to_string(), "all_time".to_string());
                }
                state = self.store.merge(conversation_id, &partial)?;
            }
        }

        if state.analysis_category().is_none() {
            if request.ai_assist_enabled {
                return self
                    .delegate_to_completion(conversation_id, request, message)
                    .await;
            }
            return self.clarify_or_give_up(
                conversation_id,
                ClarificationKind::AnalysisType,
                CATEGORY_QUESTION,
                AnalysisCategory::ALL
                    .iter()
                    .map(|c| c.as_str().to_string())
                    .collect(),
                UNSURE_MESSAGE,
            );
        }

        self.resolve_ready_state(conversation_id, &state, request).await
    }

    /// Category is known; clarify the time period if needed, else plan.
    async fn resolve_ready_state(
        &self,
        conversation_id: &str,
        state: &ConversationState,
        request: &TurnRequest,
    ) -> Result<TurnResponse> {
        let Some(category) = state.analysis_category() else {
            return Err(CoreError::InvalidArgument(
                "conversation has no analysis category".to_string(),
            ));
        };

        if category.requires_time_period() && state.time_period().is_none() {
            return self.clarify_or_give_up(
                conversation_id,
                ClarificationKind::TimePeriod,
                TIME_PERIOD_QUESTION,
                TIME_PERIOD_CHOICES.iter().map(|s| s.to_string()).collect(),
                UNSURE_PERIOD_MESSAGE,
            );
        }

        let state = if !category.requires_time_period() && state.time_period().is_none() {
            let mut partial = HashMap::new();
            partial.insert("time_period".to_string(), "all_time".to_string());
            self.store.merge(conversation_id, &partial)?
        } else {
            state.clone()
        };

        let catalog = self.catalogs.load_catalog(&request.dataset_id).await?;
        self.plan_or_degrade(conversation_id, &state, &catalog, request.safe_mode)
    }

    /// Ask a clarification at most once per conversation; after that, return
    /// a terminal answer instead of looping.
    fn clarify_or_give_up(
        &self,
        conversation_id: &str,
        kind: ClarificationKind,
        question: &str,
        choices: Vec<String>,
        give_up_message: &str,
    ) -> Result<TurnResponse> {
        if self.store.has_asked_clarification(conversation_id, kind)? {
            info!(
                "Clarification {:?} already asked for {}; returning terminal answer",
                kind, conversation_id
            );
            return Ok(TurnResponse::Answer {
                conversation_id: conversation_id.to_string(),
                markdown: give_up_message.to_string(),
                tables: Vec::new(),
                terminal: true,
            });
        }

        self.store.mark_clarification_asked(conversation_id, kind)?;
        Ok(TurnResponse::Clarification {
            conversation_id: conversation_id.to_string(),
            kind,
            question: question.to_string(),
            choices,
        })
    }

    /// Low confidence with assistance enabled: redact the catalog, ask the
    /// completion service for the four context fields, and merge what it
    /// found. The service is never allowed to ask a question back.
    async fn delegate_to_completion(
        &self,
        conversation_id: &str,
        request: &TurnRequest,
        message: &str,
    ) -> Result<TurnResponse> {
        let Some(completion) = &self.completion else {
            info!(
                "Assistance requested for {} but no completion service configured",
                conversation_id
            );
            return Ok(TurnResponse::Answer {
                conversation_id: conversation_id.to_string(),
                markdown: ASSIST_UNAVAILABLE_MESSAGE.to_string(),
                tables: Vec::new(),
                terminal: true,
            });
        };

        let catalog = self.catalogs.load_catalog(&request.dataset_id).await?;
        // Only the redacted schema may leave the boundary; the reverse map
        // stays local and is not needed for intent extraction.
        let (redacted, _reverse_map) = privacy::redact_catalog(&catalog, request.privacy_mode);

        let state = self.store.get(conversation_id)?;
        let (system_prompt, user_message) =
            build_intent_prompt(&redacted, &state.context, message);

        let raw = match completion.complete_chat(&system_prompt, &[user_message]).await {
            Ok(raw) => raw,
            Err(CoreError::ContractViolation(reason)) => {
                error!("Completion contract violation: {}", reason);
                return Err(CoreError::ContractViolation(reason));
            }
            Err(e) => {
                warn!("Completion service unavailable: {}", e);
                return Ok(TurnResponse::Answer {
                    conversation_id: conversation_id.to_string(),
                    markdown: format!(
                        "External assistance failed ({}). Try a more specific question, \
                         for example \"row count\" or \"top categories\".",
                        e
                    ),
                    tables: Vec::new(),
                    terminal: true,
                });
            }
        };

        let extracted = parse_intent_response(&raw)?;

        let mut partial = HashMap::new();
        for (slot, value) in [
            ("analysis_type", &extracted.analysis_type),
            ("time_period", &extracted.time_period),
            ("metric", &extracted.metric),
            ("grouping", &extracted.grouping),
        ] {
            if value != UNSPECIFIED {
                partial.insert(slot.to_string(), value.clone());
            }
        }

        let state = if partial.is_empty() {
            state
        } else {
            self.store.merge(conversation_id, &partial)?
        };

        if state.analysis_category().is_none() {
            return self.clarify_or_give_up(
                conversation_id,
                ClarificationKind::AnalysisType,
                CATEGORY_QUESTION,
                AnalysisCategory::ALL
                    .iter()
                    .map(|c| c.as_str().to_string())
                    .collect(),
                UNSURE_MESSAGE,
            );
        }

        self.resolve_ready_state(conversation_id, &state, request).await
    }

    /// Build and validate the deterministic plan; degrade to a rephrase
    /// clarification on validation failure rather than leaking SQL internals.
    fn plan_or_degrade(
        &self,
        conversation_id: &str,
        state: &ConversationState,
        catalog: &DatasetCatalog,
        safe_mode: bool,
    ) -> Result<TurnResponse> {
        let Some(category) = state.analysis_category() else {
            return Err(CoreError::InvalidArgument(
                "conversation has no analysis category".to_string(),
            ));
        };

        let plan = match planner::build_plan(category, &state.context, catalog, safe_mode) {
            Ok(plan) => plan,
            Err(CoreError::ValidationFailure(reason)) => {
                warn!("Plan construction failed for {}: {}", conversation_id, reason);
                return Ok(self.rephrase_clarification(conversation_id));
            }
            Err(e) => return Err(e),
        };

        if let Err(reason) = safety::validate_plan(&plan, safe_mode) {
            warn!(
                "Plan for {} rejected by safety validator: {}",
                conversation_id, reason
            );
            return Ok(self.rephrase_clarification(conversation_id));
        }

        Ok(TurnResponse::Queries {
            conversation_id: conversation_id.to_string(),
            plan,
        })
    }

    fn rephrase_clarification(&self, conversation_id: &str) -> TurnResponse {
        TurnResponse::Clarification {
            conversation_id: conversation_id.to_string(),
            kind: ClarificationKind::Rephrase,
            question: REPHRASE_QUESTION.to_string(),
            choices: Vec::new(),
        }
    }

    /// Results callback: mask sampled rows where privacy mode demands it,
    /// then delegate to the summarizer.
    async fn summarize_results(
        &self,
        conversation_id: &str,
        request: &TurnRequest,
        results: &[ExecutedResult],
    ) -> Result<TurnResponse> {
        if results.is_empty() {
            return Err(CoreError::PreconditionViolation(
                "a final answer was requested without any results attached".to_string(),
            ));
        }

        let catalog = self.catalogs.load_catalog(&request.dataset_id).await?;
        let pii_kinds = catalog.pii_kind_map();

        let masked: Vec<ExecutedResult> = results
            .iter()
            .map(|table| ExecutedResult {
                name: table.name.clone(),
                columns: table.columns.clone(),
                rows: privacy::mask_rows(
                    &table.rows,
                    &table.columns,
                    &pii_kinds,
                    request.privacy_mode,
                ),
                row_count: table.row_count,
            })
            .collect();

        let state = self.store.get(conversation_id)?;
        let audit = ExecutionAudit {
            query_names: masked.iter().map(|t| t.name.clone()).collect(),
            safe_mode: request.safe_mode,
            privacy_mode: request.privacy_mode,
        };
        let summary = summarizer::summarize(state.analysis_category(), &masked, &audit);

        Ok(TurnResponse::Answer {
            conversation_id: conversation_id.to_string(),
            markdown: summary.markdown,
            tables: summary.tables,
            terminal: false,
        })
    }

    /// A conversation is ready once it has a category and, where required, a
    /// time period.
    fn is_ready(&self, state: &ConversationState) -> bool {
        match state.analysis_category() {
            Some(category) => {
                !category.requires_time_period() || state.time_period().is_some()
            }
            None => false,
        }
    }
}
