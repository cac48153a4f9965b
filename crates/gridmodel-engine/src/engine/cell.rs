//! Cell data structures for the worksheet grid.
//!
//! This module provides the core data types for representing cells:
//! - [`CellType`] - The type of content in a cell (empty, number, text, or formula)
//! - [`Cell`] - A cell with content and an optional explicit indent level
//! - [`Worksheet`] - Thread-safe sparse storage for cells (backed by `DashMap`)

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::cell_ref::CellRef;
use super::format::format_number;

/// The type of content stored in a cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellType {
    Empty,
    Number(f64),
    Text(String),
    /// Formula source without the leading '='.
    Formula(String),
}

/// A cell in the worksheet grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub contents: CellType,
    /// Explicit indent from the workbook's cell alignment, when the reader
    /// exposes one. Parameter rows fall back to counting leading spaces.
    pub indent: Option<u32>,
}

impl Cell {
    pub fn new_empty() -> Cell {
        Cell {
            contents: CellType::Empty,
            indent: None,
        }
    }

    pub fn new_text(text: &str) -> Cell {
        Cell {
            contents: CellType::Text(text.to_string()),
            indent: None,
        }
    }

    pub fn new_number(n: f64) -> Cell {
        Cell {
            contents: CellType::Number(n),
            indent: None,
        }
    }

    /// Create a formula cell. A leading '=' is accepted and dropped.
    pub fn new_formula(formula: &str) -> Cell {
        let body = formula.strip_prefix('=').unwrap_or(formula);
        Cell {
            contents: CellType::Formula(body.to_string()),
            indent: None,
        }
    }

    pub fn with_indent(mut self, indent: u32) -> Cell {
        self.indent = Some(indent);
        self
    }

    /// Classify user input.
    /// - Empty string or whitespace -> Empty
    /// - Starts with '=' -> Formula (without the '=')
    /// - Valid number -> Number
    /// - Otherwise -> Text (kept verbatim so indentation survives)
    pub fn from_input(input: &str) -> Cell {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Cell::new_empty();
        }

        if let Some(formula) = trimmed.strip_prefix('=') {
            return Cell::new_formula(formula);
        }

        if let Ok(n) = trimmed.parse::<f64>() {
            return Cell::new_number(n);
        }

        Cell::new_text(input)
    }

    /// True for empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match &self.contents {
            CellType::Empty => true,
            CellType::Text(s) => s.trim().is_empty(),
            CellType::Number(_) | CellType::Formula(_) => false,
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self.contents, CellType::Formula(_))
    }

    /// True when the cell holds a number, a formula, or text that parses as
    /// a number.
    pub fn is_numberish(&self) -> bool {
        match &self.contents {
            CellType::Empty => false,
            CellType::Number(_) | CellType::Formula(_) => true,
            CellType::Text(s) => s.trim().parse::<f64>().is_ok(),
        }
    }

    /// Raw text of the cell as a reader would show it, trimmed.
    /// Formulas keep their leading '='.
    pub fn display_text(&self) -> String {
        match &self.contents {
            CellType::Empty => String::new(),
            CellType::Number(n) => format_number(*n),
            CellType::Text(s) => s.trim().to_string(),
            CellType::Formula(s) => format!("={}", s),
        }
    }

    /// Get the string that reproduces this cell through [`Cell::from_input`].
    pub fn to_input_string(&self) -> String {
        match &self.contents {
            CellType::Empty => String::new(),
            CellType::Text(s) => s.clone(),
            CellType::Number(n) => n.to_string(),
            CellType::Formula(s) => format!("={}", s),
        }
    }
}

/// Lenient numeric coercion: blanks and non-numeric text become 0.
pub fn coerce_text(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(0.0)
}

/// Sparse cell grid.
pub type Grid = DashMap<CellRef, Cell>;

/// A single worksheet: a sparse grid addressed by column letter and
/// 1-based row. Owned by one run; `Send + Sync` so independent runs can
/// proceed on separate threads with their own sheets.
#[derive(Clone, Debug, Default)]
pub struct Worksheet {
    pub name: String,
    cells: Grid,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Worksheet {
        Worksheet {
            name: name.into(),
            cells: Grid::new(),
        }
    }

    /// Clone of the cell at `cell_ref`, or an empty cell.
    pub fn cell(&self, cell_ref: &CellRef) -> Cell {
        self.cells
            .get(cell_ref)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(Cell::new_empty)
    }

    /// Cell at (column letters, row). Unknown column letters read as empty.
    pub fn cell_at(&self, column: &str, row: usize) -> Cell {
        match super::cell_ref::column_to_index(column) {
            Some(col) => self.cell(&CellRef::new(col, row)),
            None => Cell::new_empty(),
        }
    }

    pub fn set(&mut self, cell_ref: CellRef, cell: Cell) {
        if matches!(cell.contents, CellType::Empty) && cell.indent.is_none() {
            self.cells.remove(&cell_ref);
        } else {
            self.cells.insert(cell_ref, cell);
        }
    }

    /// Set a cell from user input at an A1 address. Returns false when the
    /// address is not a valid reference.
    pub fn set_input(&mut self, a1: &str, input: &str) -> bool {
        let Some(cell_ref) = CellRef::from_a1(a1) else {
            return false;
        };
        self.set(cell_ref, Cell::from_input(input));
        true
    }

    /// Last row holding a non-empty cell (0 for an empty sheet).
    pub fn max_row(&self) -> usize {
        self.cells
            .iter()
            .filter(|entry| !matches!(entry.value().contents, CellType::Empty))
            .map(|entry| entry.key().row)
            .max()
            .unwrap_or(0)
    }

    /// Last column holding a non-empty cell (0 for an empty sheet).
    pub fn max_col(&self) -> usize {
        self.cells
            .iter()
            .filter(|entry| !matches!(entry.value().contents, CellType::Empty))
            .map(|entry| entry.key().col)
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_input_classifies() {
        assert_eq!(Cell::from_input("  ").contents, CellType::Empty);
        assert_eq!(Cell::from_input("=A1+1").contents, CellType::Formula("A1+1".into()));
        assert_eq!(Cell::from_input(" 2.5 ").contents, CellType::Number(2.5));
        assert_eq!(Cell::from_input("  Cost").contents, CellType::Text("  Cost".into()));
    }

    #[test]
    fn test_max_row_ignores_empty_cells() {
        let mut ws = Worksheet::new("Sheet1");
        ws.set_input("A3", "x");
        ws.set(CellRef::new(1, 9), Cell::new_empty().with_indent(1));
        assert_eq!(ws.max_row(), 3);
    }

    #[test]
    fn test_numberish() {
        assert!(Cell::new_number(0.0).is_numberish());
        assert!(Cell::new_formula("=B2").is_numberish());
        assert!(Cell::new_text(" 12 ").is_numberish());
        assert!(!Cell::new_text("Total").is_numberish());
        assert!(!Cell::new_empty().is_numberish());
    }

    #[test]
    fn test_display_text_drops_integral_fraction() {
        assert_eq!(Cell::new_number(12.0).display_text(), "12");
        assert_eq!(Cell::new_number(0.25).display_text(), "0.25");
        assert_eq!(Cell::new_formula("B2*2").display_text(), "=B2*2");
    }
}
