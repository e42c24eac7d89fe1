use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use chrono::Utc;
use log::info;

use crate::error::{CoreError, Result};
use crate::models::conversation::{ClarificationKind, ConversationState};

/// In-memory store for per-conversation state.
///
/// A single mutex serializes mutation across all ids; state objects are small
/// and mutations brief, so per-key locking is not needed. Turns for different
/// conversations may still run fully in parallel around the short critical
/// sections here.
#[derive(Debug, Clone, Default)]
pub struct ConversationStateStore {
    conversations: Arc<Mutex<HashMap<String, ConversationState>>>,
}

impl ConversationStateStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn check_id(id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(CoreError::InvalidArgument(
                "conversation id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn with_state<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut ConversationState) -> T,
    ) -> Result<T> {
        Self::check_id(id)?;
        let mut conversations = self
            .conversations
            .lock()
            .map_err(|_| anyhow!("conversation store lock poisoned"))?;
        let state = conversations
            .entry(id.to_string())
            .or_insert_with(|| {
                info!("Creating conversation state for {}", id);
                ConversationState::new(id.to_string())
            });
        Ok(f(state))
    }

    /// Get the state for `id`, creating a default state if absent.
    pub fn get(&self, id: &str) -> Result<ConversationState> {
        self.with_state(id, |state| state.clone())
    }

    /// Shallow-merge `partial` into the context map. Existing keys are
    /// overwritten by incoming values but never removed.
    pub fn merge(&self, id: &str, partial: &HashMap<String, String>) -> Result<ConversationState> {
        self.with_state(id, |state| {
            for (key, value) in partial {
                state.context.insert(key.clone(), value.clone());
            }
            state.updated_at = Utc::now();
            state.clone()
        })
    }

    /// Bump the per-conversation message counter.
    pub fn record_message(&self, id: &str) -> Result<u64> {
        self.with_state(id, |state| {
            state.message_count += 1;
            state.updated_at = Utc::now();
            state.message_count
        })
    }

    pub fn mark_clarification_asked(&self, id: &str, kind: ClarificationKind) -> Result<()> {
        self.with_state(id, |state| {
            state.clarifications_asked.insert(kind);
            state.updated_at = Utc::now();
        })
    }

    pub fn has_asked_clarification(&self, id: &str, kind: ClarificationKind) -> Result<bool> {
        self.with_state(id, |state| state.clarifications_asked.contains(&kind))
    }

    pub fn clear_clarification(&self, id: &str, kind: ClarificationKind) -> Result<()> {
        self.with_state(id, |state| {
            state.clarifications_asked.remove(&kind);
            state.updated_at = Utc::now();
        })
    }

    /// Drop all state for `id`. States are never deleted automatically.
    pub fn clear(&self, id: &str) -> Result<()> {
        Self::check_id(id)?;
        let mut conversations = self
            .conversations
            .lock()
            .map_err(|_| anyhow!("conversation store lock poisoned"))?;
        conversations.remove(id);
        Ok(())
    }
}
