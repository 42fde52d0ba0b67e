/// Loopway: iteration engine for node-graph workflows
///
/// This library provides counted cycles that persist across runs, in-run loops
/// that unroll by cloning their body into the live graph, a restricted
/// expression evaluator and a process-wide variable store.

// Core configuration and setup
pub mod config;

// Restricted expression language used by formulas, conditions and loops
pub mod eval;

// Process-wide variable store
pub mod memory;

// Iteration control: counters, cycles, loop status and graph expansion
pub mod control;

// Workflow management layer - handles workflow definitions, storage, and registry
pub mod workflow;

// Runtime execution engine - demand-driven graph execution and node handlers
pub mod runtime;

// HTTP API layer - REST endpoints for workflows, runs and variables
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use eval::{Evaluator, Limits, Value};
pub use runtime::{ExecutionEngine, ExecutionResult, NodeExecutor, RunError, Session};
pub use server::start_server;
pub use workflow::{Edge, Node, NodeType, Workflow};
