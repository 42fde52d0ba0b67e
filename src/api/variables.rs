/// Variable store and expression REST API endpoints
///
/// Exposes the process-wide Variable Store and the restricted evaluator.
/// Values travel as JSON; tuples come back as arrays.

use crate::api::workflows::{api_error, ApiError, AppState};
use crate::eval::{Environment, Value};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};

/// Request body for expression evaluation
#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub expression: String,
    /// Extra names layered over the Variable Store
    #[serde(default)]
    pub variables: Map<String, JsonValue>,
}

/// Request body for setting a variable
#[derive(Debug, Deserialize)]
pub struct SetVariableRequest {
    pub value: JsonValue,
}

pub fn create_variable_routes() -> Router<AppState> {
    Router::new()
        .route("/api/variables", get(list_variables).delete(clear_variables))
        .route("/api/variables/{name}", get(get_variable).put(set_variable).delete(clear_variable))
        .route("/api/evaluate", post(evaluate))
}

/// GET /api/variables
/// Returns: { "variables": { "name": value, ... } }
async fn list_variables(State(state): State<AppState>) -> Json<JsonValue> {
    Json(json!({ "variables": state.session.variables().await }))
}

/// GET /api/variables/{name}
async fn get_variable(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    match state.session.get_variable(&name).await {
        Some(value) => Ok(Json(json!({ "name": name, "value": value.to_json() }))),
        None => Err(api_error(StatusCode::NOT_FOUND, format!("variable '{}' is not set", name))),
    }
}

/// PUT /api/variables/{name}
/// Body: { "value": ... }
async fn set_variable(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<SetVariableRequest>,
) -> Json<JsonValue> {
    state.session.set_variable(&name, Value::from(payload.value)).await;
    tracing::debug!("📝 Variable '{}' set via API", name);
    Json(json!({ "name": name, "message": "Variable stored" }))
}

/// DELETE /api/variables/{name}
async fn clear_variable(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    match state.session.clear_variable(&name).await {
        Some(_) => Ok(Json(json!({ "message": format!("Variable '{}' cleared", name) }))),
        None => Err(api_error(StatusCode::NOT_FOUND, format!("variable '{}' is not set", name))),
    }
}

/// DELETE /api/variables
async fn clear_variables(State(state): State<AppState>) -> Json<JsonValue> {
    state.session.clear_variables().await;
    tracing::info!("🧹 Variable store cleared via API");
    Json(json!({ "message": "All variables cleared" }))
}

/// Evaluate an expression
///
/// POST /api/evaluate
/// Body: { "expression": "a + 1", "variables": { "a": 1 } }
/// Returns: { "value": 2 } or 400 with the evaluator's error
async fn evaluate(
    State(state): State<AppState>,
    Json(payload): Json<EvaluateRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let extra: Environment = payload.variables
        .iter()
        .map(|(name, value)| (name.clone(), Value::from(value)))
        .collect();

    let evaluated = state.session.evaluate(&payload.expression, extra).await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    match evaluated {
        Ok(value) => Ok(Json(json!({ "value": value.to_json() }))),
        Err(e) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string(), "kind": e.kind() })),
        )),
    }
}
