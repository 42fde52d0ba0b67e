/// Restricted expression evaluator
///
/// A Python-flavoured expression language evaluated over a closed AST with a fixed
/// builtin whitelist. Used for loop conditions, formula nodes and the
/// `/api/evaluate` endpoint.

pub mod ast;
pub mod builtins;
pub mod coerce;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod value;

pub use coerce::{cbool, cfloat, cint, CoercionError};
pub use error::{EvalError, EvalResult};
pub use interpreter::{Environment, Evaluator, Execution, Limits};
pub use value::{Dict, Value};
