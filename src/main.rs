/// Loopway: iteration engine for node-graph workflows
///
/// Main entry point for the Loopway server. Loads configuration from the
/// environment and starts the HTTP server.

use loopway::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Workflow management and run API at /api/workflows/*
/// - Variable store and evaluator at /api/variables/* and /api/evaluate
/// - Health check at /healthz
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::default();
    start_server(config).await
}
