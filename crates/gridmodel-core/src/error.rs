//! Error types for gridmodel core.

use thiserror::Error;

/// Errors that can abort a model run or a workbook load.
///
/// Formula failures never appear here: they are contained per cell by the
/// formula engine.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("No workbook supplied")]
    MissingWorkbookInput,

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Workbook contains no sheets")]
    EmptyWorkbook,

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
