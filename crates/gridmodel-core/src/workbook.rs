//! Loading workbooks into worksheets.
//!
//! Spreadsheet containers (`.xlsx`, `.xlsm`, `.xls`, `.xlsb`, `.ods`) are
//! read through calamine. `.grd` text sheets are read by
//! [`crate::storage::grd`].

use calamine::{Data, Reader, open_workbook_auto};
use gridmodel_engine::engine::{Cell, CellRef, Worksheet};
use std::path::Path;
use tracing::debug;

use crate::error::{ModelError, Result};
use crate::storage::grd;

/// The sheets of one workbook, in workbook order.
#[derive(Clone, Debug, Default)]
pub struct Workbook {
    sheets: Vec<Worksheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Worksheet>) -> Workbook {
        Workbook { sheets }
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// The named sheet, or the first sheet when no name is given.
    pub fn sheet(&self, name: Option<&str>) -> Result<&Worksheet> {
        match name {
            Some(name) => self
                .sheets
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| ModelError::SheetNotFound(name.to_string())),
            None => self.sheets.first().ok_or(ModelError::EmptyWorkbook),
        }
    }

    /// Like [`Workbook::sheet`], taking ownership of the sheet.
    pub fn into_sheet(self, name: Option<&str>) -> Result<Worksheet> {
        let index = match name {
            Some(name) => self
                .sheets
                .iter()
                .position(|s| s.name == name)
                .ok_or_else(|| ModelError::SheetNotFound(name.to_string()))?,
            None if self.sheets.is_empty() => return Err(ModelError::EmptyWorkbook),
            None => 0,
        };
        Ok(self.sheets.into_iter().nth(index).unwrap_or_default())
    }
}

/// Load every sheet of the workbook at `path`.
pub fn load_workbook(path: &Path) -> Result<Workbook> {
    let is_grd = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("grd"));
    if is_grd {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Sheet1");
        return Ok(Workbook::new(vec![grd::parse_grd(path, name)?]));
    }
    load_spreadsheet(path)
}

fn load_spreadsheet(path: &Path) -> Result<Workbook> {
    let mut workbook = open_workbook_auto(path)?;
    let names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());

    for name in names {
        let mut sheet = Worksheet::new(name.as_str());

        let range = workbook.worksheet_range(&name)?;
        let (start_row, start_col) = range.start().unwrap_or_default();
        for (row, col, value) in range.used_cells() {
            let cell_ref = CellRef::new(start_col as usize + col + 1, start_row as usize + row + 1);
            sheet.set(cell_ref, data_to_cell(value));
        }

        // Formula text replaces the cached value of the same cell.
        if let Ok(formulas) = workbook.worksheet_formula(&name) {
            let (start_row, start_col) = formulas.start().unwrap_or_default();
            for (row, col, formula) in formulas.used_cells() {
                if formula.trim().is_empty() {
                    continue;
                }
                let cell_ref = CellRef::new(start_col as usize + col + 1, start_row as usize + row + 1);
                sheet.set(cell_ref, Cell::new_formula(formula));
            }
        }

        debug!(sheet = %sheet.name, cells = sheet.len(), "loaded sheet");
        sheets.push(sheet);
    }

    Ok(Workbook::new(sheets))
}

fn data_to_cell(value: &Data) -> Cell {
    match value {
        Data::Int(i) => Cell::new_number(*i as f64),
        Data::Float(f) => Cell::new_number(*f),
        Data::Bool(b) => Cell::new_number(if *b { 1.0 } else { 0.0 }),
        // Formula text stored as a plain string still evaluates.
        Data::String(s) if s.trim_start().starts_with('=') => Cell::from_input(s),
        Data::String(s) => Cell::new_text(s),
        Data::DateTime(dt) => Cell::new_number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::new_text(s),
        Data::Error(_) | Data::Empty => Cell::new_empty(),
    }
}
