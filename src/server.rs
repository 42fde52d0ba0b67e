/// Server setup and initialization
///
/// Wires together all components: storage, registry, execution engine, the run
/// session and HTTP routes.

use crate::{
    api::{create_variable_routes, create_workflow_routes, AppState},
    config::Config,
    eval::Evaluator,
    runtime::{ExecutionEngine, NodeExecutor, Session},
    workflow::{registry::WorkflowRegistry, storage::WorkflowStorage},
};
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Create the main Axum application with all routes
///
/// Opens the workflow database, loads stored workflows and builds the engine
/// stack around one shared session.
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("📋 Opening workflow storage in {}", config.database.data_dir);
    let workflow_storage = WorkflowStorage::connect(&config.database.data_dir)
        .await
        .context("Failed to open workflow storage")?;

    tracing::info!("📊 Initializing workflow registry");
    let workflow_registry = Arc::new(WorkflowRegistry::new(workflow_storage.clone()));

    tracing::info!("📥 Loading existing workflows from storage");
    workflow_registry.init_from_storage().await
        .context("Failed to load workflows from storage")?;

    tracing::info!("⚙️ Initializing evaluator and node executor");
    let evaluator = Arc::new(Evaluator::new(config.engine.limits()));
    let node_executor = Arc::new(NodeExecutor::new(evaluator));

    tracing::info!("🚀 Initializing execution engine (max {} expansions per run)", config.engine.max_expansions);
    let execution_engine = Arc::new(ExecutionEngine::new(node_executor, config.engine.max_expansions));
    let session = Arc::new(Session::new(execution_engine));

    let app_state = AppState {
        storage: workflow_storage,
        registry: workflow_registry,
        session,
    };

    tracing::info!("✅ Application initialized successfully");
    Ok(router(app_state))
}

/// All HTTP routes over the given state
pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_variable_routes())
        .with_state(app_state)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("loopway=info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Loopway server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
