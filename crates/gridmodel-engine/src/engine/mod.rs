//! Spreadsheet engine API.
//!
//! This module provides the computation engine for formula-driven sheets:
//!
//! - [`Cell`], [`CellType`], [`Worksheet`] - Data structures for cell storage
//! - [`CellRef`] - Cell reference parsing (A1 notation ↔ column/row indices)
//! - [`ExpressionValue`] - Scalar/vector values with broadcasting arithmetic
//! - [`translate_formula`] - Rewrite spreadsheet formulas into the expression grammar
//! - [`parse_expression`], [`validate`], [`evaluate`] - The sandboxed evaluator
//! - [`FormulaEngine`] - Memoized cell resolution over one worksheet
//! - [`quantize`], [`format_number`] - Display rounding and number text

mod cell;
mod cell_ref;
mod eval;
mod format;
mod formula;
mod parser;
mod preprocess;
mod value;

pub use cell::{Cell, CellType, Grid, Worksheet, coerce_text};
pub use cell_ref::{CellRef, column_to_index, index_to_column, normalize_ref, parse_range};
pub use eval::{
    Binding, CellResolver, Environment, Value, evaluate, into_expression_value, validate,
};
pub use format::{DisplayValue, format_number, quantize};
pub use formula::{FormulaEngine, MAX_RESOLVE_DEPTH};
pub use parser::{
    BinaryOperator, BoolOperator, CompareOperator, Expr, Literal, MAX_CHAIN_LENGTH, MAX_NESTING_DEPTH,
    UnaryOperator, parse_expression,
};
pub use preprocess::{cell_ref_re, range_ref_re, translate_formula};
pub use value::ExpressionValue;
