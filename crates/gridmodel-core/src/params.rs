//! Caller-supplied parameter values.

use gridmodel_engine::engine::{Cell, format_number};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::tree::ParameterTree;

/// A parameter value as supplied by a caller or read from a sheet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn is_blank(&self) -> bool {
        match self {
            ParamValue::Number(_) => false,
            ParamValue::Text(s) => s.trim().is_empty(),
        }
    }

    /// The cell this value becomes when written into a sheet. Text starting
    /// with '=' becomes a formula.
    pub fn to_cell(&self) -> Cell {
        match self {
            ParamValue::Number(n) => Cell::new_number(*n),
            ParamValue::Text(s) => Cell::from_input(s),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{}", format_number(*n)),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Parameter name to value. Keys may carry leading tabs marking their
/// nesting depth; matching ignores them.
pub type ParameterMap = BTreeMap<String, ParamValue>;

/// Strip indentation markers from a parameter name.
pub fn normalize_name(name: &str) -> String {
    name.replace('\t', "").trim().to_string()
}

/// Read a TOML parameter file. Nested tables are sections: they are
/// flattened into tab-prefixed keys and only leaf values are kept.
pub fn parameters_from_toml(content: &str) -> Result<ParameterMap> {
    let table: toml::Table = toml::from_str(content)?;
    let tree = ParameterTree::from_toml(&table);
    Ok(tree
        .flatten()
        .into_iter()
        .filter_map(|row| {
            let key = row.flat_key();
            row.value.map(|value| (key, value))
        })
        .collect())
}
