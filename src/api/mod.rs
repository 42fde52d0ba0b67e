/// HTTP API Layer
///
/// This module provides the REST API endpoints. It handles:
/// - Workflow CRUD operations and run/interrupt triggers
/// - Variable store access
/// - Ad-hoc expression evaluation

// Workflow management and execution endpoints
pub mod workflows;

// Variable store and evaluate endpoints
pub mod variables;

// Re-export router builders
pub use variables::create_variable_routes;
pub use workflows::{create_workflow_routes, AppState};
