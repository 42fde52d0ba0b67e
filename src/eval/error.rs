/// Evaluation error taxonomy
///
/// Every failure the restricted evaluator can produce. Variants mirror the error
/// classes users of the expression language expect (NameError, TypeError, ...), so
/// messages surfaced to the workflow author read naturally.

use thiserror::Error;

/// Error produced while parsing or evaluating an expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Malformed source, reported before any evaluation happens
    #[error("SyntaxError: {message} (at offset {offset})")]
    Syntax { message: String, offset: usize },

    /// Reference to a name that is neither local, in the environment, nor whitelisted
    #[error("NameError: name '{0}' is not defined")]
    Name(String),

    /// Operator or call applied to values of the wrong type
    #[error("TypeError: {0}")]
    Type(String),

    /// Attribute that does not exist on the produced value
    #[error("AttributeError: {0}")]
    Attribute(String),

    #[error("ValueError: {0}")]
    Value(String),

    #[error("IndexError: {0}")]
    Index(String),

    #[error("KeyError: {0}")]
    Key(String),

    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),

    #[error("OverflowError: {0}")]
    Overflow(String),

    /// Call depth exceeded the configured limit
    #[error("RecursionError: maximum evaluation depth of {0} exceeded")]
    Recursion(usize),

    /// A produced sequence or string would exceed the configured size limit
    #[error("LimitError: {0}")]
    Limit(String),
}

impl EvalError {
    pub fn syntax(message: impl Into<String>, offset: usize) -> Self {
        Self::Syntax { message: message.into(), offset }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::Value(message.into())
    }

    /// Short class name, e.g. "NameError"
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "SyntaxError",
            Self::Name(_) => "NameError",
            Self::Type(_) => "TypeError",
            Self::Attribute(_) => "AttributeError",
            Self::Value(_) => "ValueError",
            Self::Index(_) => "IndexError",
            Self::Key(_) => "KeyError",
            Self::ZeroDivision(_) => "ZeroDivisionError",
            Self::Overflow(_) => "OverflowError",
            Self::Recursion(_) => "RecursionError",
            Self::Limit(_) => "LimitError",
        }
    }
}

/// Result alias used throughout the evaluator
pub type EvalResult<T> = Result<T, EvalError>;
