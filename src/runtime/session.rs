/// Serialised run gate
///
/// Owns the process-wide Variable Store, the cycle registry and the output
/// caches, and lets exactly one run at a time work on them. A run works on a
/// copy of that state; the copy replaces the shared state only when the run
/// ends without error, so a failed run leaves nothing half-applied.

use crate::control::CycleRegistry;
use crate::eval::{Environment, EvalResult, Value};
use crate::memory::VariableStore;
use crate::runtime::engine::{ExecutionEngine, ExecutionResult, OutputCache};
use crate::runtime::executor::RunState;
use crate::workflow::types::Workflow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Why a run did not produce a report
#[derive(Debug, Error)]
pub enum RunError {
    /// Another run holds the session
    #[error("a workflow run is already in progress")]
    Busy,

    #[error("{0:#}")]
    Failed(anyhow::Error),
}

#[derive(Debug, Default)]
struct SharedState {
    variables: VariableStore,
    cycles: CycleRegistry,
    /// Output caches by workflow id
    caches: HashMap<String, OutputCache>,
}

#[derive(Debug)]
pub struct Session {
    engine: Arc<ExecutionEngine>,
    state: Mutex<SharedState>,
    /// Raised by `interrupt`, cleared when a run starts
    interrupt: Arc<AtomicBool>,
}

impl Session {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(SharedState::default()),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run a workflow once
    ///
    /// Fails with `RunError::Busy` instead of waiting when a run is in flight;
    /// runs of the same cycle must never overlap.
    pub async fn run(&self, workflow: Arc<Workflow>) -> Result<ExecutionResult, RunError> {
        let mut shared = self.state.try_lock().map_err(|_| RunError::Busy)?;
        self.interrupt.store(false, Ordering::SeqCst);

        let workflow_id = workflow.id.clone();
        let mut run_state = RunState::new(workflow_id.as_str(), shared.variables.clone(), shared.cycles.clone());
        let mut cache = shared.caches.get(&workflow_id).cloned().unwrap_or_default();
        let engine = Arc::clone(&self.engine);
        let interrupt = Arc::clone(&self.interrupt);

        let (result, run_state, cache) = tokio::task::spawn_blocking(move || {
            let result = engine.execute_workflow(&workflow, &mut run_state, &mut cache, &interrupt);
            (result, run_state, cache)
        })
        .await
        .map_err(|e| RunError::Failed(anyhow::anyhow!("Workflow run task failed: {}", e)))?;

        match result {
            Ok(report) => {
                shared.variables = run_state.variables;
                shared.cycles = run_state.cycles;
                shared.caches.insert(workflow_id, cache);
                Ok(report)
            }
            Err(e) => {
                tracing::error!("❌ Workflow '{}' failed: {:#}", workflow_id, e);
                Err(RunError::Failed(e))
            }
        }
    }

    /// Ask the in-flight run to stop; returns whether one was running
    pub fn interrupt(&self) -> bool {
        let running = self.state.try_lock().is_err();
        if running {
            tracing::warn!("⏸️ Interrupt requested");
            self.interrupt.store(true, Ordering::SeqCst);
        }
        running
    }

    /// Evaluate an expression against the Variable Store plus `extra`
    ///
    /// The outer error only reports a lost evaluation task.
    pub async fn evaluate(&self, expression: &str, extra: Environment) -> Result<EvalResult<Value>, RunError> {
        let mut env = self.state.lock().await.variables.snapshot();
        env.extend(extra);
        let evaluator = Arc::clone(self.engine.executor().evaluator());
        let expression = expression.to_string();

        tokio::task::spawn_blocking(move || evaluator.evaluate(&expression, &env))
            .await
            .map_err(|e| RunError::Failed(anyhow::anyhow!("Evaluation task failed: {}", e)))
    }

    /// Drop cycle state and cached outputs of a removed workflow
    pub async fn forget_workflow(&self, workflow_id: &str) {
        let mut shared = self.state.lock().await;
        shared.cycles.remove_workflow(workflow_id);
        shared.caches.remove(workflow_id);
    }

    pub async fn variable_names(&self) -> Vec<String> {
        self.state.lock().await.variables.keys()
    }

    /// All variables as JSON, by name
    pub async fn variables(&self) -> serde_json::Map<String, serde_json::Value> {
        let shared = self.state.lock().await;
        shared.variables
            .keys()
            .into_iter()
            .filter_map(|name| shared.variables.get(&name).map(|v| (name.clone(), v.to_json())))
            .collect()
    }

    pub async fn get_variable(&self, name: &str) -> Option<Value> {
        self.state.lock().await.variables.get(name).cloned()
    }

    pub async fn set_variable(&self, name: &str, value: Value) {
        self.state.lock().await.variables.set(name, value);
    }

    pub async fn clear_variable(&self, name: &str) -> Option<Value> {
        self.state.lock().await.variables.clear(name)
    }

    pub async fn clear_variables(&self) {
        self.state.lock().await.variables.clear_all();
    }
}
