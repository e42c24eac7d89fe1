use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::models::catalog::DatasetCatalog;
use crate::models::conversation::AnalysisCategory;
use crate::services::CompletionService;

/// Sentinel the completion service must use for fields it cannot determine.
pub const UNSPECIFIED: &str = "unspecified";

/// The four context fields the completion service extracts from a message.
/// Fields the model could not determine carry the literal `unspecified`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedIntent {
    pub analysis_type: String,
    pub time_period: String,
    pub metric: String,
    pub grouping: String,
}

impl ExtractedIntent {
    pub fn analysis_category(&self) -> Option<AnalysisCategory> {
        AnalysisCategory::parse(&self.analysis_type)
    }
}

/// System prompt for intent extraction. The service is never allowed to ask a
/// question back; a clarification-shaped response is a contract violation.
fn intent_system_prompt() -> String {
    let categories: Vec<&str> = AnalysisCategory::ALL.iter().map(|c| c.as_str()).collect();
    format!(
        "You are an intent extraction service for a tabular data analysis tool. \
         Given a dataset schema and a user message, extract exactly these fields: \
         analysis_type (one of: {}), time_period, metric, grouping. \
         Respond with a single JSON object containing exactly those four keys. \
         Use the string \"{}\" for any field you cannot determine. \
         Never ask the user a question and never add any other keys or prose.",
        categories.join(", "),
        UNSPECIFIED,
    )
}

/// Builds the (system, user) prompt pair for intent extraction.
///
/// The catalog handed in here must already be redacted; only placeholder
/// names for PII columns may appear in the prompt.
pub fn build_intent_prompt(
    redacted_catalog: &DatasetCatalog,
    context: &std::collections::HashMap<String, String>,
    message: &str,
) -> (String, String) {
    let schema: Vec<Value> = redacted_catalog
        .columns
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "type": c.data_type,
                "nullable": c.nullable,
            })
        })
        .collect();

    let user = json!({
        "dataset": {
            "row_count": redacted_catalog.row_count,
            "columns": schema,
            "date_columns": redacted_catalog.date_columns,
            "numeric_columns": redacted_catalog.numeric_columns,
        },
        "known_context": context,
        "message": message,
    });

    (intent_system_prompt(), user.to_string())
}

/// Parses the completion service's response into an [`ExtractedIntent`].
///
/// Incidental formatting (markdown code fences, leading prose before the
/// first brace) is cleaned up best-effort. A response that attempts to ask a
/// clarification question, or that stays unparseable after cleanup, is a
/// [`CoreError::ContractViolation`] — an internal error, never forwarded to
/// the user as their own mistake.
pub fn parse_intent_response(raw: &str) -> Result<ExtractedIntent> {
    let cleaned = strip_incidental_formatting(raw);

    let value: Value = serde_json::from_str(&cleaned).map_err(|e| {
        error!("Completion service returned unparseable content: {}", e);
        CoreError::ContractViolation(format!("completion response was not valid JSON: {}", e))
    })?;

    let Some(object) = value.as_object() else {
        return Err(CoreError::ContractViolation(
            "completion response was not a JSON object".to_string(),
        ));
    };

    // The service must never ask a question back.
    let clarification_shaped = object.contains_key("clarification")
        || object.contains_key("question")
        || object
            .get("type")
            .and_then(|v| v.as_str())
            .is_some_and(|t| t.eq_ignore_ascii_case("clarification"));
    if clarification_shaped {
        error!("Completion service attempted to ask a clarification question");
        return Err(CoreError::ContractViolation(
            "completion service attempted to ask a clarification question".to_string(),
        ));
    }

    let field = |name: &str| -> String {
        match object.get(name) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Null) | None => UNSPECIFIED.to_string(),
            Some(other) => other.to_string().trim_matches('"').to_string(),
        }
    };

    Ok(ExtractedIntent {
        analysis_type: field("analysis_type"),
        time_period: field("time_period"),
        metric: field("metric"),
        grouping: field("grouping"),
    })
}

/// Strips markdown code fences and any prose around the outermost JSON
/// object.
fn strip_incidental_formatting(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    let text = text.trim();

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => text[start..=end].to_string(),
        _ => text.to_string(),
    }
}

/// OpenAI-backed completion service, used when an API key is configured.
#[derive(Clone, Debug)]
pub struct OpenAiCompletionService {
    client: Client,
    api_key: String,
}

impl OpenAiCompletionService {
    /// Create the service from config; `None` when no API key is set, which
    /// the orchestrator reports as assistance being unavailable.
    pub fn from_config(config: &Config) -> Option<Self> {
        match &config.open_ai_key {
            Some(api_key) if !api_key.trim().is_empty() => {
                info!("Completion service initialized with OpenAI API key");
                Some(Self {
                    client: Client::new(),
                    api_key: api_key.clone(),
                })
            }
            _ => {
                info!("OpenAI API key not set, completion service not initialized");
                None
            }
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionService {
    async fn complete_chat(
        &self,
        system_prompt: &str,
        context_messages: &[String],
    ) -> Result<String> {
        let mut messages = vec![json!({
            "role": "system",
            "content": system_prompt,
        })];
        for message in context_messages {
            messages.push(json!({
                "role": "user",
                "content": message,
            }));
        }

        let request_body = json!({
            "model": "gpt-4o",
            "messages": messages,
            "response_format": { "type": "json_object" }
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| self.client.clone());

        info!("Sending request to OpenAI API");
        let response = match client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                error!("Failed to send request to OpenAI API: {}", e);
                let detail = if e.is_timeout() {
                    "request timed out after 30 seconds".to_string()
                } else {
                    e.to_string()
                };
                return Err(CoreError::ExternalServiceUnavailable(detail));
            }
        };

        let status = response.status();
        debug!("OpenAI API response status: {}", status);
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "could not read error response".to_string());
            error!("OpenAI API error: status {}, details: {}", status, error_text);
            return Err(CoreError::ExternalServiceUnavailable(format!(
                "completion service returned status {}",
                status
            )));
        }

        let response_json: Value = response.json().await.map_err(|e| {
            error!("Failed to parse OpenAI API response as JSON: {}", e);
            CoreError::ExternalServiceUnavailable(format!(
                "completion service response was not JSON: {}",
                e
            ))
        })?;

        match response_json["choices"][0]["message"]["content"].as_str() {
            Some(content) => Ok(content.to_string()),
            None => {
                error!("Could not extract content from OpenAI response");
                Err(CoreError::ContractViolation(
                    "completion response carried no message content".to_string(),
                ))
            }
        }
    }
}
