//! Cell reference parsing and formatting.
//!
//! Provides bidirectional conversion between spreadsheet-style cell references
//! (e.g., "A1", "$B$2", "AA100") and one-based column/row coordinates.
//!
//! # Examples
//!
//! ```
//! use gridmodel_engine::engine::CellRef;
//!
//! let cell = CellRef::from_a1("$B3").unwrap();
//! assert_eq!(cell.col, 2); // 1-based: A = 1
//! assert_eq!(cell.row, 3);
//! assert_eq!(cell.to_string(), "B3");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::error::EvalError;

/// A reference to a cell by column and row (both 1-based, A1 = (1, 1)).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

fn a1_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?<letters>[A-Za-z]+)(?<numbers>[0-9]+)$")
            .expect("A1 reference regex must compile")
    })
}

impl CellRef {
    pub fn new(col: usize, row: usize) -> CellRef {
        CellRef { row, col }
    }

    /// Parse a reference such as "B3", "$B$3" or "b3".
    /// Dollar anchors are stripped. Returns None for anything that is not
    /// letters followed by a positive row number.
    pub fn from_a1(name: &str) -> Option<CellRef> {
        let normalized = normalize_ref(name.trim());
        let caps = a1_re().captures(&normalized)?;
        let col = column_to_index(&caps["letters"])?;
        let row = caps["numbers"].parse::<usize>().ok()?;
        if row == 0 {
            return None;
        }
        Some(CellRef::new(col, row))
    }

    /// Column letters of this reference ("A", "AB", ...).
    pub fn column(&self) -> String {
        index_to_column(self.col)
    }

    /// The reference `offset` rows below this one.
    pub fn down(&self, offset: usize) -> CellRef {
        CellRef::new(self.col, self.row + offset)
    }
}

impl std::str::FromStr for CellRef {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellRef::from_a1(s).ok_or_else(|| EvalError::MalformedReference(s.to_string()))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", index_to_column(self.col), self.row)
    }
}

/// Strip `$` anchors from a reference.
pub fn normalize_ref(reference: &str) -> String {
    reference.replace('$', "")
}

/// Convert column letters to a 1-based index (A = 1, Z = 26, AA = 27).
/// Returns None for empty input, non-letters, or overflow.
pub fn column_to_index(letters: &str) -> Option<usize> {
    let letters = letters.trim();
    if letters.is_empty() {
        return None;
    }
    let mut acc = 0usize;
    for c in letters.to_ascii_uppercase().bytes() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        let digit = (c - b'A') as usize + 1;
        acc = acc.checked_mul(26)?.checked_add(digit)?;
    }
    Some(acc)
}

/// Convert a 1-based column index to letters (1 -> A, 26 -> Z, 27 -> AA).
/// Index 0 has no column and yields an empty string.
pub fn index_to_column(index: usize) -> String {
    let mut result = String::new();
    let mut n = index as u128;
    while n > 0 {
        n -= 1;
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    result
}

/// Parse a range like "A1:B5" (anchors allowed) into
/// (start_col, start_row, end_col, end_row), all 1-based.
pub fn parse_range(range: &str) -> Option<(usize, usize, usize, usize)> {
    let (start, end) = range.split_once(':')?;
    let start = CellRef::from_a1(start)?;
    let end = CellRef::from_a1(end)?;
    Some((start.col, start.row, end.col, end.row))
}
