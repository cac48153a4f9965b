//! gridmodel_engine - Spreadsheet formula translation and sandboxed evaluation.

pub mod builtins;
pub mod engine;
pub mod error;

pub use engine::{CellRef, ExpressionValue, FormulaEngine, Worksheet};
pub use error::{EvalError, Result};
