/// Runtime Execution Engine
///
/// This module hosts the iteration core. It handles:
/// - Loading workflows into a petgraph arena
/// - Demand-driven execution with lazy inputs, blocking and expansions
/// - Per-node-type handlers
/// - Serialising runs over the process-wide state

// Petgraph arena that loop expansions are spliced into
pub mod graph;

// Demand-driven execution engine
pub mod engine;

// Individual node execution handlers
pub mod executor;

// One-run-at-a-time gate owning variables, cycles and caches
pub mod session;

// Re-export main types
pub use engine::{ExecutionEngine, ExecutionResult};
pub use executor::NodeExecutor;
pub use session::{RunError, Session};
