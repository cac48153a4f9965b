//! Parser for .grd text sheets.
//!
//! One cell per line, `<address>: <entry>`:
//!
//! ```text
//! # parameter band
//! F3: "Price"
//! G3: 12
//! F4: "  Volume"
//! G4: =G3*10
//! ```
//!
//! Text is quoted (so leading spaces survive), formulas start with `=`,
//! anything else must be a number. Blank lines and `#` comments are
//! skipped.

use gridmodel_engine::engine::{Cell, CellRef, Worksheet};
use std::fs;
use std::path::Path;

use crate::error::{ModelError, Result};

/// Parse a .grd file into a worksheet called `name`.
pub fn parse_grd(path: &Path, name: &str) -> Result<Worksheet> {
    let content = fs::read_to_string(path)?;
    parse_grd_content(&content, name)
}

/// Parse .grd content from a string.
pub fn parse_grd_content(content: &str, name: &str) -> Result<Worksheet> {
    let mut sheet = Worksheet::new(name);

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((cell_ref_str, value_str)) = line.split_once(':') else {
            return Err(ModelError::Parse {
                line: line_num + 1,
                message: "a model line needs an address and an entry, e.g. `G3: 12`".to_string(),
            });
        };

        let cell_ref_str = cell_ref_str.trim();
        let cell_ref = CellRef::from_a1(cell_ref_str).ok_or_else(|| ModelError::Parse {
            line: line_num + 1,
            message: format!("'{}' is not a sheet address such as B4", cell_ref_str),
        })?;

        let cell = parse_cell_value(value_str, line_num + 1)?;
        sheet.set(cell_ref, cell);
    }

    Ok(sheet)
}

fn parse_cell_value(value: &str, line_num: usize) -> Result<Cell> {
    let value = value.trim();

    if value.is_empty() {
        return Ok(Cell::new_empty());
    }

    if value.starts_with('=') {
        return Ok(Cell::new_formula(value));
    }

    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        return Ok(Cell::new_text(&unescape_text(&value[1..value.len() - 1])));
    }

    if let Ok(n) = value.parse::<f64>() {
        return Ok(Cell::new_number(n));
    }

    Err(ModelError::Parse {
        line: line_num,
        message: format!(
            "'{}' is not a number, a =formula or a \"quoted label\"",
            value
        ),
    })
}

fn unescape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}
