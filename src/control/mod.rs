/// Iteration core
///
/// Two ways of repeating part of a workflow:
/// - cross-run cycles, whose state survives between separate executions
/// - intra-run loops, unrolled inside one execution by cloning the loop body
///
/// Both share one signed completion test and one error type.

// Shared signed completion test
pub mod counter;

// Cross-run cycle state machine and its registry
pub mod cycle;

// Intra-run loop status and open/close decisions
pub mod loops;

// Loop body discovery, cloning and rewiring
pub mod expander;

pub use cycle::{CycleKey, CycleParams, CycleRegistry, CycleState};
pub use expander::{GraphFragment, Topology};
pub use loops::LoopStatus;

use crate::eval::{CoercionError, EvalError};
use thiserror::Error;

/// Fatal configuration or evaluation failure inside a cycle or loop
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    /// A cycle consumer ran before its paired Cycle node ever executed
    #[error("cycle state for '{0}' was never initialised; link the node to a Cycle node that runs first")]
    MissingCycleState(String),

    /// A loop close (or other consumer) received no status from a loop open
    #[error("node '{0}' received no loop status; link its status input to a LoopOpen node")]
    MissingLoopStatus(String),

    /// A loop close whose open marker cannot be reached or paired
    #[error("loop close '{close}' is not paired with open '{open}': {reason}")]
    UnpairedClose { open: String, close: String, reason: String },

    /// The host lacks a capability the node needs
    #[error("host does not support {0}")]
    UnsupportedCapability(&'static str),

    /// More loop iterations than the configured cap in one run
    #[error("expansion limit of {0} reached in a single run")]
    ExpansionLimit(usize),

    /// A loop or formula condition failed to evaluate
    #[error("condition of '{node}' failed: {source}")]
    Evaluation { node: String, source: EvalError },

    #[error(transparent)]
    Coercion(#[from] CoercionError),
}
