/// Hot-reload workflow registry using ArcSwap
///
/// Provides lock-free, atomic updates to the in-memory workflow registry.
/// Each update swaps the entire map pointer, so readers never block and a run
/// keeps the definition it started with.

use crate::workflow::{storage::WorkflowStorage, types::Workflow};
use anyhow::Result;
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

/// Lock-free workflow registry
///
/// The registry is the single source of truth for runnable workflows in
/// memory; storage is only read on startup and reload.
#[derive(Debug)]
pub struct WorkflowRegistry {
    /// Thread-safe atomic pointer to workflow map
    /// Key: workflow_id, Value: validated definition
    workflows: ArcSwap<HashMap<String, Arc<Workflow>>>,

    /// Reference to persistent storage for reload operations
    storage: WorkflowStorage,
}

impl WorkflowRegistry {
    pub fn new(storage: WorkflowStorage) -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Initialize registry by loading all workflows from storage
    ///
    /// Definitions that no longer validate are skipped with a warning rather
    /// than preventing startup.
    pub async fn init_from_storage(&self) -> Result<()> {
        let stored = self.storage.load_all_workflows().await?;
        let mut loaded = HashMap::new();
        for (id, workflow) in stored {
            match workflow.validate() {
                Ok(()) => {
                    loaded.insert(id, Arc::new(workflow));
                }
                Err(e) => tracing::warn!("⚠️ Skipping invalid stored workflow '{}': {}", id, e),
            }
        }

        self.workflows.store(Arc::new(loaded));
        tracing::info!("📊 Initialized workflow registry with {} workflows", self.workflows.load().len());
        Ok(())
    }

    /// Hot-reload a single workflow from storage
    pub async fn reload_workflow(&self, workflow_id: &str) -> Result<()> {
        let workflow = self.storage.get_workflow(workflow_id).await?
            .ok_or_else(|| anyhow::anyhow!("Workflow not found: {}", workflow_id))?;
        workflow.validate()?;

        let current = self.workflows.load();
        let mut new_registry = (**current).clone();
        new_registry.insert(workflow_id.to_string(), Arc::new(workflow));
        self.workflows.store(Arc::new(new_registry));

        tracing::info!("🔥 Hot-reloaded workflow: {}", workflow_id);
        Ok(())
    }

    /// Get a workflow by ID (lock-free read)
    pub fn get_workflow(&self, workflow_id: &str) -> Option<Arc<Workflow>> {
        self.workflows.load().get(workflow_id).cloned()
    }

    /// List all active workflow IDs, sorted
    pub fn list_workflow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workflows.load().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove a workflow from the registry
    pub fn remove_workflow(&self, workflow_id: &str) {
        let current = self.workflows.load();
        let mut new_registry = (**current).clone();

        if new_registry.remove(workflow_id).is_some() {
            self.workflows.store(Arc::new(new_registry));
            tracing::info!("🗑️ Removed workflow from registry: {}", workflow_id);
        }
    }
}
