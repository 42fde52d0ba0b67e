/// Shared variable storage
///
/// Holds the process-wide Variable Store. Injected into the session and node
/// executor rather than reached through globals.

pub mod variables;

pub use variables::VariableStore;
