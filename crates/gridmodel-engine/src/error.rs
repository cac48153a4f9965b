//! Error types for formula translation and evaluation.

use thiserror::Error;

use crate::engine::CellRef;

/// Errors raised while parsing or evaluating a single formula.
///
/// None of these escape a cell boundary: the formula engine logs them and
/// resolves the failing cell to zero.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Disallowed expression element: {0}")]
    DisallowedExpression(String),

    #[error("Syntax error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("Malformed reference: {0}")]
    MalformedReference(String),

    #[error("Circular reference through {0}")]
    CircularReference(String),

    /// Resolving this cell would nest deeper than the engine allows. The
    /// engine resolves the cell on its own and retries.
    #[error("Dependency chain too deep at {0}")]
    DepthExceeded(CellRef),

    #[error("Expression nested deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("Operator chain longer than {limit} terms")]
    ChainTooLong { limit: usize },

    #[error("Range of {cells} cells exceeds the limit of {limit}")]
    RangeTooLarge { cells: u64, limit: u64 },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("{name} expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },
}

pub type Result<T> = std::result::Result<T, EvalError>;
