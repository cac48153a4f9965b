//! Worksheet layout conventions.
//!
//! A model sheet keeps its output tables in the columns left of a boundary
//! column and a (name, value) parameter band starting at a fixed row. Every
//! position is configurable; the defaults match the conventional layout:
//!
//! ```text
//!      A          B..E            F            G
//!  1
//!  2   Outcome    Base  High      Parameters
//!  3   Revenue    =..   =..       Price        10
//!  4   ...                          Volume     100
//! ```

use gridmodel_engine::engine::{column_to_index, index_to_column};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;

/// A worksheet column, stored as a 1-based index and written as letters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Column(usize);

impl Column {
    pub const A: Column = Column(1);

    /// Column at a 1-based index. Index 0 is clamped to column A.
    pub const fn at(index: usize) -> Column {
        if index == 0 { Column(1) } else { Column(index) }
    }

    pub fn parse(letters: &str) -> Option<Column> {
        column_to_index(letters.trim()).map(Column)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn letters(self) -> String {
        index_to_column(self.0)
    }

    pub fn next(self) -> Column {
        Column(self.0 + 1)
    }

    /// Columns from `self` up to but excluding `end`.
    pub fn until(self, end: Column) -> impl Iterator<Item = Column> {
        (self.0..end.0).map(Column)
    }
}

impl TryFrom<String> for Column {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Column::parse(&value).ok_or_else(|| format!("invalid column letters '{}'", value))
    }
}

impl From<Column> for String {
    fn from(value: Column) -> Self {
        value.letters()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letters())
    }
}

/// Positions of the labelled table, the scenario band and the parameter band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Column holding row labels.
    pub label_column: Column,
    /// First scenario column; scenarios run up to `boundary_column`.
    pub first_scenario_column: Column,
    /// First column that is not part of the output table.
    pub boundary_column: Column,
    pub parameter_name_column: Column,
    pub parameter_value_column: Column,
    pub parameter_start_row: usize,
    /// First row searched for the outcome header.
    pub header_search_start_row: usize,
    /// Consecutive blank rows that end an outcome table.
    pub blank_row_streak: usize,
    /// Rows covered by the generic table scan.
    pub scan_max_rows: usize,
    /// Last column covered by the generic table scan.
    pub scan_max_column: Column,
    /// Whether parameter values may replace formulas in the value column.
    pub overwrite_formulas: bool,
    pub description: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            label_column: Column::A,
            first_scenario_column: Column::at(2),
            boundary_column: Column::at(6),
            parameter_name_column: Column::at(6),
            parameter_value_column: Column::at(7),
            parameter_start_row: 3,
            header_search_start_row: 2,
            blank_row_streak: 3,
            scan_max_rows: 250,
            scan_max_column: Column::at(5),
            overwrite_formulas: true,
            description: "Excel-driven model".to_string(),
        }
    }
}

impl LayoutConfig {
    /// The scenario band, left to right.
    pub fn scenario_columns(&self) -> Vec<Column> {
        self.first_scenario_column.until(self.boundary_column).collect()
    }
}

/// Contents of a gridmodel config file.
///
/// ```toml
/// [layout]
/// parameter_start_row = 4
///
/// [labels]
/// B = "Low case"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub layout: LayoutConfig,
    /// Default column header overrides keyed by column letter.
    pub labels: BTreeMap<String, String>,
}

impl ConfigFile {
    pub fn from_toml_str(content: &str) -> Result<ConfigFile> {
        Ok(toml::from_str(content)?)
    }
}
