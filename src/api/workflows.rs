/// Workflow management and execution REST API endpoints
///
/// Provides CRUD operations for workflow definitions with hot-reload support,
/// plus the run and interrupt triggers. All changes trigger immediate registry
/// updates.

use crate::{
    runtime::{graph::ExecutionGraph, ExecutionResult, RunError, Session},
    workflow::{registry::WorkflowRegistry, storage::WorkflowStorage, types::Workflow},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Workflow storage for persistence
    pub storage: WorkflowStorage,
    /// Hot-reload registry for in-memory workflows
    pub registry: Arc<WorkflowRegistry>,
    /// Run gate owning variables and cycle state
    pub session: Arc<Session>,
}

/// Error response: status plus `{ "error": message }`
pub type ApiError = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

fn storage_error(e: anyhow::Error) -> ApiError {
    tracing::error!("❌ Storage failure: {:#}", e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure")
}

/// Response for workflow creation/update operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
}

/// Request body for workflow creation
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub workflow: Workflow,
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow).get(list_workflows))
        .route("/api/workflows/{id}", get(get_workflow).put(update_workflow).delete(delete_workflow))
        .route("/api/workflows/{id}/run", post(run_workflow))
        .route("/api/interrupt", post(interrupt))
}

/// Reject definitions the engine could not run
fn check_runnable(workflow: &Workflow) -> Result<(), ApiError> {
    if workflow.id.is_empty() || workflow.name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "workflow id and name are required"));
    }
    ExecutionGraph::build(workflow)
        .map(|_| ())
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("{:#}", e)))
}

/// Create a new workflow
///
/// POST /api/workflows
/// Body: { "workflow": { "id": "...", "name": "...", "nodes": [...], "edges": [...] } }
async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let workflow = payload.workflow;
    check_runnable(&workflow)?;

    if state.storage.get_workflow(&workflow.id).await.map_err(storage_error)?.is_some() {
        return Err(api_error(StatusCode::CONFLICT, format!("workflow '{}' already exists", workflow.id)));
    }

    state.storage.save_workflow(&workflow).await.map_err(storage_error)?;
    state.registry.reload_workflow(&workflow.id).await.map_err(storage_error)?;

    tracing::info!("🔥 Created workflow: {} ({})", workflow.id, workflow.name);

    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' created successfully", workflow.name),
    }))
}

/// List all workflows
///
/// GET /api/workflows
/// Returns: { "workflows": [{ "id": "...", "name": "...", "created_at": "...", "updated_at": "..." }] }
async fn list_workflows(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let workflows = state.storage.list_workflows().await.map_err(storage_error)?;
    Ok(Json(json!({ "workflows": workflows })))
}

/// GET /api/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    match state.storage.get_workflow(&id).await.map_err(storage_error)? {
        Some(workflow) => Ok(Json(workflow)),
        None => Err(api_error(StatusCode::NOT_FOUND, format!("workflow '{}' not found", id))),
    }
}

/// Update an existing workflow
///
/// PUT /api/workflows/{id}
/// Cycle state of the workflow is kept; node ids that survive the edit keep
/// their cycles.
async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let mut workflow = payload.workflow;
    workflow.id = id.clone();
    check_runnable(&workflow)?;

    if state.storage.get_workflow(&id).await.map_err(storage_error)?.is_none() {
        return Err(api_error(StatusCode::NOT_FOUND, format!("workflow '{}' not found", id)));
    }

    state.storage.save_workflow(&workflow).await.map_err(storage_error)?;
    state.registry.reload_workflow(&workflow.id).await.map_err(storage_error)?;

    tracing::info!("🔥 Hot-reloaded workflow: {} ({})", workflow.id, workflow.name);

    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' updated successfully", workflow.name),
    }))
}

/// Delete a workflow along with its cycle state
///
/// DELETE /api/workflows/{id}
async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.registry.remove_workflow(&id);
    state.session.forget_workflow(&id).await;

    if state.storage.delete_workflow(&id).await.map_err(storage_error)? {
        tracing::info!("🗑️ Deleted workflow: {}", id);
        Ok(Json(json!({ "message": "Workflow deleted successfully" })))
    } else {
        Err(api_error(StatusCode::NOT_FOUND, format!("workflow '{}' not found", id)))
    }
}

/// Execute a workflow once
///
/// POST /api/workflows/{id}/run
/// Returns the run report; 409 while another run is in progress.
async fn run_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let workflow = state.registry.get_workflow(&id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("workflow '{}' not found", id)))?;

    match state.session.run(workflow).await {
        Ok(report) => Ok(Json(report)),
        Err(RunError::Busy) => Err(api_error(StatusCode::CONFLICT, RunError::Busy)),
        Err(e @ RunError::Failed(_)) => Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, e)),
    }
}

/// Request a halt of the in-flight run
///
/// POST /api/interrupt
async fn interrupt(State(state): State<AppState>) -> Json<Value> {
    let interrupted = state.session.interrupt();
    Json(json!({ "interrupted": interrupted }))
}
