//! Nested parameter defaults read from the parameter band.
//!
//! Rows of the band carry an indent level. A row without a value opens a
//! section whose children are the following rows indented one level deeper:
//!
//! ```text
//! F               G
//! Costs
//!   Fixed         100
//!   Staff
//!     Headcount   4
//! Price           12
//! ```
//!
//! [`ParameterTree::reconstruct`] turns such rows into a tree and
//! [`ParameterTree::flatten`] turns the tree back into rows whose keys are
//! prefixed with one tab per level.

use gridmodel_engine::engine::{CellRef, CellType, FormulaEngine, Worksheet, format_number};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::layout::LayoutConfig;
use crate::params::{ParamValue, ParameterMap};

/// One row of the parameter band. `value` is `None` for section rows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParameterRow {
    pub level: usize,
    pub name: String,
    pub value: Option<ParamValue>,
}

impl ParameterRow {
    pub fn new(level: usize, name: impl Into<String>, value: Option<ParamValue>) -> ParameterRow {
        ParameterRow {
            level,
            name: name.into(),
            value,
        }
    }

    /// Name prefixed with one tab per level.
    pub fn flat_key(&self) -> String {
        format!("{}{}", "\t".repeat(self.level), self.name)
    }

    /// Inverse of [`ParameterRow::flat_key`].
    pub fn from_flat_key(key: &str, value: Option<ParamValue>) -> ParameterRow {
        let name = key.trim_start_matches('\t');
        let level = key.len() - name.len();
        ParameterRow::new(level, name, value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParameterNode {
    Value(ParamValue),
    Section(ParameterTree),
}

/// Ordered name → node mapping. Re-inserting a name replaces its node in
/// place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterTree {
    entries: Vec<(String, ParameterNode)>,
}

impl ParameterTree {
    pub fn new() -> ParameterTree {
        ParameterTree::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, node: ParameterNode) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = node,
            None => self.entries.push((name, node)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterNode> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, node)| node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterNode)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuild the nesting of indented rows.
    ///
    /// A row attaches to the innermost open section whose children sit at or
    /// above the row's level, so a row indented deeper than expected still
    /// lands in the current section.
    pub fn reconstruct(rows: &[ParameterRow]) -> ParameterTree {
        let mut root = ParameterTree::new();
        let mut pos = 0;
        fill(&mut root, rows, &mut pos, 0);
        root
    }

    /// Depth-first rows: sections first with no value, then their children.
    pub fn flatten(&self) -> Vec<ParameterRow> {
        let mut rows = Vec::new();
        self.flatten_into(0, &mut rows);
        rows
    }

    fn flatten_into(&self, level: usize, rows: &mut Vec<ParameterRow>) {
        for (name, node) in &self.entries {
            match node {
                ParameterNode::Value(v) => rows.push(ParameterRow::new(level, name, Some(v.clone()))),
                ParameterNode::Section(child) => {
                    rows.push(ParameterRow::new(level, name, None));
                    child.flatten_into(level + 1, rows);
                }
            }
        }
    }

    /// Tables become sections; booleans become 1/0; arrays and dates keep
    /// their TOML text.
    pub fn from_toml(table: &toml::Table) -> ParameterTree {
        let mut tree = ParameterTree::new();
        for (key, value) in table {
            let node = match value {
                toml::Value::Table(t) => ParameterNode::Section(ParameterTree::from_toml(t)),
                toml::Value::Integer(i) => ParameterNode::Value(ParamValue::Number(*i as f64)),
                toml::Value::Float(f) => ParameterNode::Value(ParamValue::Number(*f)),
                toml::Value::Boolean(b) => {
                    ParameterNode::Value(ParamValue::Number(if *b { 1.0 } else { 0.0 }))
                }
                toml::Value::String(s) => ParameterNode::Value(ParamValue::Text(s.clone())),
                other => ParameterNode::Value(ParamValue::Text(other.to_string())),
            };
            tree.insert(key.clone(), node);
        }
        tree
    }
}

fn fill(tree: &mut ParameterTree, rows: &[ParameterRow], pos: &mut usize, child_level: usize) {
    while let Some(row) = rows.get(*pos) {
        if row.level < child_level {
            return;
        }
        *pos += 1;
        match &row.value {
            Some(value) => tree.insert(row.name.clone(), ParameterNode::Value(value.clone())),
            None => {
                let mut section = ParameterTree::new();
                fill(&mut section, rows, pos, row.level + 1);
                tree.insert(row.name.clone(), ParameterNode::Section(section));
            }
        }
    }
}

impl Serialize for ParameterTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, node) in &self.entries {
            match node {
                ParameterNode::Value(v) => map.serialize_entry(name, v)?,
                ParameterNode::Section(child) => map.serialize_entry(name, child)?,
            }
        }
        map.end()
    }
}

/// Indent level of a parameter name: the cell's explicit indent, else one
/// level per two leading spaces.
fn indent_level(indent: Option<u32>, raw_name: &str) -> usize {
    match indent {
        Some(level) => level as usize,
        None => (raw_name.len() - raw_name.trim_start_matches(' ').len()) / 2,
    }
}

/// Read the parameter band. Formula values are evaluated through `engine`.
pub fn build_rows(engine: &FormulaEngine, layout: &LayoutConfig) -> Vec<ParameterRow> {
    let sheet = engine.sheet();
    let name_col = layout.parameter_name_column.index();
    let value_col = layout.parameter_value_column.index();
    let mut rows = Vec::new();

    for r in layout.parameter_start_row..=sheet.max_row() {
        let name_cell = sheet.cell(&CellRef::new(name_col, r));
        if name_cell.is_blank() {
            continue;
        }
        let raw_name = match &name_cell.contents {
            CellType::Text(s) => s.clone(),
            _ => name_cell.display_text(),
        };
        let level = indent_level(name_cell.indent, &raw_name);
        let name = raw_name.trim();

        let value_ref = CellRef::new(value_col, r);
        let value_cell = sheet.cell(&value_ref);
        let value = if value_cell.is_blank() {
            None
        } else {
            match value_cell.contents {
                CellType::Formula(_) => Some(ParamValue::Number(engine.value_at(&value_ref))),
                CellType::Number(n) => Some(ParamValue::Number(n)),
                CellType::Text(s) => Some(ParamValue::Text(s)),
                CellType::Empty => None,
            }
        };
        rows.push(ParameterRow::new(level, name, value));
    }
    rows
}

/// Editable parameter defaults of a sheet, in band order, with computed
/// values for formula parameters.
pub fn load_parameter_defaults(sheet: &Worksheet, layout: &LayoutConfig) -> Vec<ParameterRow> {
    let engine = FormulaEngine::new(sheet);
    ParameterTree::reconstruct(&build_rows(&engine, layout)).flatten()
}

/// Leaf rows as a flat-key map, ready to feed back into the overlay.
pub fn rows_to_map(rows: &[ParameterRow]) -> ParameterMap {
    rows.iter()
        .filter_map(|row| row.value.clone().map(|v| (row.flat_key(), v)))
        .collect()
}

/// Human-readable text of a row's value (empty for sections).
pub fn value_text(row: &ParameterRow) -> String {
    match &row.value {
        Some(ParamValue::Number(n)) => format_number(*n),
        Some(ParamValue::Text(s)) => s.clone(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmodel_engine::engine::Cell;
    use pretty_assertions::assert_eq;

    fn num(n: f64) -> Option<ParamValue> {
        Some(ParamValue::Number(n))
    }

    fn sample_rows() -> Vec<ParameterRow> {
        vec![
            ParameterRow::new(0, "Costs", None),
            ParameterRow::new(1, "Fixed", num(100.0)),
            ParameterRow::new(1, "Staff", None),
            ParameterRow::new(2, "Headcount", num(4.0)),
            ParameterRow::new(2, "Salary", num(30.0)),
            ParameterRow::new(1, "Rent", num(12.0)),
            ParameterRow::new(0, "Price", num(9.5)),
        ]
    }

    #[test]
    fn test_reconstruct_nests_sections() {
        let tree = ParameterTree::reconstruct(&sample_rows());
        assert_eq!(tree.len(), 2);
        let Some(ParameterNode::Section(costs)) = tree.get("Costs") else {
            panic!("Costs should be a section");
        };
        assert_eq!(costs.len(), 3);
        let Some(ParameterNode::Section(staff)) = costs.get("Staff") else {
            panic!("Staff should be a section");
        };
        assert_eq!(staff.get("Salary"), Some(&ParameterNode::Value(ParamValue::Number(30.0))));
        assert_eq!(tree.get("Price"), Some(&ParameterNode::Value(ParamValue::Number(9.5))));
    }

    #[test]
    fn test_flatten_inverts_reconstruct() {
        let rows = sample_rows();
        assert_eq!(ParameterTree::reconstruct(&rows).flatten(), rows);
    }

    #[test]
    fn test_flat_keys_round_trip() {
        let row = ParameterRow::new(2, "Headcount", num(4.0));
        assert_eq!(row.flat_key(), "\t\tHeadcount");
        assert_eq!(ParameterRow::from_flat_key("\t\tHeadcount", num(4.0)), row);
    }

    #[test]
    fn test_deeper_row_attaches_to_open_section() {
        let rows = vec![
            ParameterRow::new(0, "Costs", None),
            ParameterRow::new(3, "Deep", num(1.0)),
            ParameterRow::new(0, "Top", num(2.0)),
        ];
        let tree = ParameterTree::reconstruct(&rows);
        let Some(ParameterNode::Section(costs)) = tree.get("Costs") else {
            panic!("Costs should be a section");
        };
        assert!(costs.get("Deep").is_some());
        assert!(tree.get("Top").is_some());
    }

    #[test]
    fn test_duplicate_name_replaces_in_place() {
        let rows = vec![
            ParameterRow::new(0, "A", num(1.0)),
            ParameterRow::new(0, "B", num(2.0)),
            ParameterRow::new(0, "A", num(3.0)),
        ];
        let flat = ParameterTree::reconstruct(&rows).flatten();
        assert_eq!(
            flat,
            vec![ParameterRow::new(0, "A", num(3.0)), ParameterRow::new(0, "B", num(2.0))]
        );
    }

    #[test]
    fn test_build_rows_reads_band() {
        let mut ws = Worksheet::new("Model");
        ws.set_input("F3", "Costs");
        ws.set_input("F4", "  Fixed");
        ws.set_input("G4", "100");
        ws.set_input("F5", "  Doubled");
        ws.set_input("G5", "=G4*2");
        ws.set_input("F6", "Mode");
        ws.set_input("G6", "monthly");
        ws.set(CellRef::new(6, 7), Cell::new_text("Indented").with_indent(1));
        ws.set_input("G7", "1");
        ws.set_input("G8", "orphan value");

        let layout = LayoutConfig::default();
        let rows = load_parameter_defaults(&ws, &layout);
        assert_eq!(
            rows,
            vec![
                ParameterRow::new(0, "Costs", None),
                ParameterRow::new(1, "Fixed", num(100.0)),
                ParameterRow::new(1, "Doubled", num(200.0)),
                ParameterRow::new(0, "Mode", Some(ParamValue::Text("monthly".into()))),
                // No open section to join, so it lands back at the top level.
                ParameterRow::new(0, "Indented", num(1.0)),
            ]
        );
    }

    #[test]
    fn test_tree_serializes_as_nested_map() {
        let tree = ParameterTree::reconstruct(&sample_rows()[..2]);
        let json = serde_json::to_string(&tree).unwrap();
        assert_eq!(json, r#"{"Costs":{"Fixed":100.0}}"#);
    }

    #[test]
    fn test_rows_to_map_keeps_leaves() {
        let map = rows_to_map(&sample_rows());
        assert_eq!(map.len(), 5);
        assert_eq!(map.get("\t\tSalary"), Some(&ParamValue::Number(30.0)));
    }
}
