pub mod ai;
pub mod orchestrator;
pub mod planner;
pub mod privacy;
pub mod router;
pub mod safety;
pub mod state_store;
pub mod summarizer;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use log::info;

use crate::error::{CoreError, Result};
use crate::models::catalog::DatasetCatalog;

/// Source of dataset catalogs, produced by the ingestion component.
#[async_trait]
pub trait CatalogProvider: Send + Sync + 'static {
    /// Fails with [`CoreError::NotFound`] when ingestion has not run for the
    /// dataset.
    async fn load_catalog(&self, dataset_id: &str) -> Result<DatasetCatalog>;
}

/// Opaque external completion service: prompt in, JSON text out.
///
/// The orchestrator treats a failing call as unavailable and recovers into a
/// terminal answer; it never retries on its own.
#[async_trait]
pub trait CompletionService: Send + Sync + 'static {
    async fn complete_chat(
        &self,
        system_prompt: &str,
        context_messages: &[String],
    ) -> Result<String>;
}

/// In-memory catalog provider for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalogProvider {
    catalogs: Arc<Mutex<HashMap<String, DatasetCatalog>>>,
}

impl MemoryCatalogProvider {
    pub fn new() -> Self {
        Self {
            catalogs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register(&self, catalog: DatasetCatalog) -> Result<()> {
        let mut catalogs = self
            .catalogs
            .lock()
            .map_err(|_| anyhow!("catalog store lock poisoned"))?;
        info!("Registered catalog for dataset {}", catalog.dataset_id);
        catalogs.insert(catalog.dataset_id.clone(), catalog);
        Ok(())
    }
}

#[async_trait]
impl CatalogProvider for MemoryCatalogProvider {
    async fn load_catalog(&self, dataset_id: &str) -> Result<DatasetCatalog> {
        let catalogs = self
            .catalogs
            .lock()
            .map_err(|_| anyhow!("catalog store lock poisoned"))?;
        catalogs
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("no catalog for dataset {}", dataset_id)))
    }
}

pub use ai::OpenAiCompletionService;
pub use orchestrator::Orchestrator;
pub use router::IntentRouter;
pub use state_store::ConversationStateStore;
