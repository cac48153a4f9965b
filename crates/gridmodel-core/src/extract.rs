//! Output table extraction.
//!
//! Two strategies, tried in order:
//!
//! 1. Outcome-anchored: the first labelled row at or after
//!    `header_search_start_row` is a header over the scenario band. Rows
//!    below it are records, rows with a label but no scenario data are
//!    section banners, and a streak of blank rows ends the table.
//! 2. Generic scan: only when no header row exists. The top-left window of
//!    the sheet is searched for labelled blocks with numeric columns and the
//!    largest block becomes a single `Outputs` section.

use gridmodel_engine::engine::{CellRef, DisplayValue, FormulaEngine, Worksheet};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::debug;

use crate::layout::{Column, LayoutConfig};

/// Column header overrides keyed by column letter.
pub type LabelOverrides = BTreeMap<String, String>;

/// One table row: ordered column header → display value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, DisplayValue)>,
}

impl Record {
    pub fn new() -> Record {
        Record::default()
    }

    /// Set a field. An existing header keeps its position and takes the new
    /// value.
    pub fn insert(&mut self, header: impl Into<String>, value: DisplayValue) {
        let header = header.into();
        match self.fields.iter_mut().find(|(h, _)| *h == header) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((header, value)),
        }
    }

    pub fn with(mut self, header: impl Into<String>, value: DisplayValue) -> Record {
        self.insert(header, value);
        self
    }

    pub fn get(&self, header: &str) -> Option<&DisplayValue> {
        self.fields.iter().find(|(h, _)| h == header).map(|(_, v)| v)
    }

    pub fn remove(&mut self, header: &str) {
        self.fields.retain(|(h, _)| h != header);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DisplayValue)> {
        self.fields.iter().map(|(h, v)| (h.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (header, value) in &self.fields {
            map.serialize_entry(header, value)?;
        }
        map.end()
    }
}

/// A titled table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Section {
    pub title: String,
    pub records: Vec<Record>,
}

impl Section {
    pub fn new(title: impl Into<String>, records: Vec<Record>) -> Section {
        Section {
            title: title.into(),
            records,
        }
    }

    /// Column headers across all records, in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        columns_of(&self.records)
    }
}

fn columns_of(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for (header, _) in record.iter() {
            if !columns.iter().any(|c| c == header) {
                columns.push(header.to_string());
            }
        }
    }
    columns
}

fn cell_text(sheet: &Worksheet, col: Column, row: usize) -> String {
    sheet.cell(&CellRef::new(col.index(), row)).display_text()
}

fn is_blank_at(sheet: &Worksheet, col: Column, row: usize) -> bool {
    sheet.cell(&CellRef::new(col.index(), row)).is_blank()
}

/// First row at or after `header_search_start_row` with a label.
pub fn find_outcome_header_row(sheet: &Worksheet, layout: &LayoutConfig) -> Option<usize> {
    (layout.header_search_start_row..=sheet.max_row())
        .find(|&r| !is_blank_at(sheet, layout.label_column, r))
}

/// Rows below the header holding a label or scenario data, up to the first
/// streak of blank rows.
fn outcome_rows(sheet: &Worksheet, layout: &LayoutConfig, header_row: usize, band: &[Column]) -> Vec<usize> {
    let mut rows = Vec::new();
    let mut blank_streak = 0;
    for r in header_row + 1..=sheet.max_row() {
        let has_any = !is_blank_at(sheet, layout.label_column, r)
            || band.iter().any(|&col| !is_blank_at(sheet, col, r));
        if has_any {
            blank_streak = 0;
            rows.push(r);
        } else {
            blank_streak += 1;
            if blank_streak >= layout.blank_row_streak {
                break;
            }
        }
    }
    rows
}

/// Scenario columns with a header or any body data.
fn active_columns(sheet: &Worksheet, header_row: usize, band: &[Column], rows: &[usize]) -> Vec<Column> {
    band.iter()
        .copied()
        .filter(|&col| {
            !is_blank_at(sheet, col, header_row) || rows.iter().any(|&r| !is_blank_at(sheet, col, r))
        })
        .collect()
}

/// Outcome-anchored extraction below `header_row`.
pub fn sections_from_outcomes(
    engine: &FormulaEngine,
    layout: &LayoutConfig,
    header_row: usize,
    overrides: &LabelOverrides,
) -> Vec<Section> {
    let sheet = engine.sheet();
    let band = layout.scenario_columns();
    let rows = outcome_rows(sheet, layout, header_row, &band);
    let columns = active_columns(sheet, header_row, &band, &rows);

    let first_title = match cell_text(sheet, layout.label_column, header_row) {
        t if t.is_empty() => "Outcome".to_string(),
        t => t,
    };
    let titles: Vec<String> = columns
        .iter()
        .map(|&col| {
            let letters = col.letters();
            if let Some(label) = overrides.get(&letters).map(|s| s.trim()).filter(|s| !s.is_empty()) {
                return label.to_string();
            }
            match cell_text(sheet, col, header_row) {
                t if t.is_empty() => letters,
                t => t,
            }
        })
        .collect();

    let mut sections = Vec::new();
    let mut current_title: Option<String> = None;
    let mut current: Vec<Record> = Vec::new();

    for r in rows {
        let label = cell_text(sheet, layout.label_column, r);
        if label.is_empty() {
            continue;
        }

        if columns.iter().all(|&col| is_blank_at(sheet, col, r)) {
            if let Some(title) = current_title.take()
                && !current.is_empty()
            {
                sections.push(Section::new(title, std::mem::take(&mut current)));
            }
            current_title = Some(label);
            continue;
        }

        let mut record = Record::new().with(first_title.clone(), DisplayValue::text(label));
        for (&col, title) in columns.iter().zip(&titles) {
            let value = engine.value_at(&CellRef::new(col.index(), r));
            record.insert(title.clone(), DisplayValue::from_number(value));
        }
        current.push(record);
    }

    if let Some(title) = current_title
        && !current.is_empty()
    {
        sections.push(Section::new(title, std::mem::take(&mut current)));
    }

    if sections.is_empty() && !current.is_empty() {
        sections.push(Section::new("Results", current));
    }
    sections
}

/// A candidate table found by the generic scan, 1-based and inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Block {
    pub fn area(&self) -> usize {
        (self.bottom - self.top + 1) * (self.right - self.left + 1)
    }
}

fn numberish_at(sheet: &Worksheet, col: usize, row: usize) -> bool {
    sheet.cell(&CellRef::new(col, row)).is_numberish()
}

/// All qualifying blocks, largest area first. Equal areas keep scan order.
pub fn find_blocks(sheet: &Worksheet, layout: &LayoutConfig) -> Vec<Block> {
    let max_rows = sheet.max_row().min(layout.scan_max_rows);
    let max_col = layout.scan_max_column.index();
    let blank = |col: usize, row: usize| sheet.cell(&CellRef::new(col, row)).is_blank();
    let mut blocks = Vec::new();

    for top in 1..=max_rows {
        // A label needs at least two columns to its right.
        for left in 1..max_col.saturating_sub(1) {
            if blank(left, top) {
                continue;
            }
            let numeric = (left + 1..=max_col).filter(|&c| numberish_at(sheet, c, top)).count();
            if numeric < 2 {
                continue;
            }

            let mut bottom = top;
            while bottom < max_rows {
                let next = bottom + 1;
                if blank(left, next) || !(left + 1..=max_col).any(|c| numberish_at(sheet, c, next)) {
                    break;
                }
                bottom = next;
            }

            let right = (left + 1..=max_col)
                .filter(|&c| (top..=bottom).any(|r| !blank(c, r)))
                .max()
                .unwrap_or(left);

            if bottom > top && right > left {
                blocks.push(Block {
                    top,
                    left,
                    bottom,
                    right,
                });
            }
        }
    }

    blocks.sort_by_key(|b| Reverse(b.area()));
    blocks
}

fn cell_display(engine: &FormulaEngine, cell: &CellRef) -> DisplayValue {
    let raw = engine.sheet().cell(cell);
    if raw.is_numberish() {
        DisplayValue::from_number(engine.value_at(cell))
    } else {
        DisplayValue::text(raw.display_text())
    }
}

fn no_table_section(layout: &LayoutConfig) -> Section {
    let message = format!(
        "No Outcome found and no output table detected in {}–{}.",
        layout.label_column, layout.scan_max_column
    );
    Section::new(
        "Outputs",
        vec![Record::new().with("Error", DisplayValue::text(message))],
    )
}

/// Generic-scan extraction: the largest block becomes one `Outputs`
/// section, minus columns that are blank or zero throughout.
pub fn sections_from_generic_scan(engine: &FormulaEngine, layout: &LayoutConfig) -> Vec<Section> {
    let sheet = engine.sheet();
    let Some(block) = find_blocks(sheet, layout).into_iter().next() else {
        return vec![no_table_section(layout)];
    };
    debug!(?block, "generic scan picked block");

    let headers: Vec<String> = (block.left..=block.right)
        .map(|c| {
            let text = sheet.cell(&CellRef::new(c, block.top)).display_text();
            if text.is_empty() { Column::at(c).letters() } else { text }
        })
        .collect();

    let mut records: Vec<Record> = (block.top + 1..=block.bottom)
        .map(|r| {
            let mut record = Record::new();
            for (c, header) in (block.left..=block.right).zip(&headers) {
                record.insert(header.clone(), cell_display(engine, &CellRef::new(c, r)));
            }
            record
        })
        .collect();

    let empty_columns: Vec<String> = columns_of(&records)
        .into_iter()
        .filter(|header| {
            records
                .iter()
                .all(|rec| rec.get(header).is_none_or(DisplayValue::is_effectively_empty))
        })
        .collect();
    for header in &empty_columns {
        for record in &mut records {
            record.remove(header);
        }
    }

    vec![Section::new("Outputs", records)]
}

/// Run the outcome-anchored strategy, falling back to the generic scan.
pub fn extract_sections(engine: &FormulaEngine, layout: &LayoutConfig, overrides: &LabelOverrides) -> Vec<Section> {
    match find_outcome_header_row(engine.sheet(), layout) {
        Some(header_row) => {
            debug!(header_row, "outcome-anchored extraction");
            sections_from_outcomes(engine, layout, header_row, overrides)
        }
        None => {
            debug!("no outcome header; scanning for tables");
            sections_from_generic_scan(engine, layout)
        }
    }
}

/// Header text of each scenario column on the outcome header row (row 1
/// when there is none). Blank headers are skipped.
pub fn scenario_headers(sheet: &Worksheet, layout: &LayoutConfig) -> BTreeMap<String, String> {
    let header_row = find_outcome_header_row(sheet, layout).unwrap_or(1);
    layout
        .scenario_columns()
        .into_iter()
        .filter_map(|col| {
            let text = cell_text(sheet, col, header_row);
            (!text.is_empty()).then(|| (col.letters(), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sheet(cells: &[(&str, &str)]) -> Worksheet {
        let mut ws = Worksheet::new("Model");
        for (a1, input) in cells {
            ws.set_input(a1, input);
        }
        ws
    }

    fn num(x: f64) -> DisplayValue {
        DisplayValue::from_number(x)
    }

    #[test]
    fn test_header_row_search_starts_at_row_two() {
        let ws = sheet(&[("A1", "Title"), ("A4", "Outcome")]);
        assert_eq!(find_outcome_header_row(&ws, &LayoutConfig::default()), Some(4));
        let ws = sheet(&[("A1", "Title"), ("B3", "1")]);
        assert_eq!(find_outcome_header_row(&ws, &LayoutConfig::default()), None);
    }

    #[test]
    fn test_outcome_rows_stop_after_blank_streak() {
        let ws = sheet(&[
            ("A2", "Outcome"),
            ("A3", "a"),
            ("B3", "1"),
            ("A5", "b"),
            ("B5", "2"),
            ("A9", "far"),
            ("B9", "3"),
        ]);
        let layout = LayoutConfig::default();
        let rows = outcome_rows(&ws, &layout, 2, &layout.scenario_columns());
        assert_eq!(rows, vec![3, 5]);
    }

    #[test]
    fn test_three_blank_rows_end_the_table() {
        let mut cells = vec![("A2".to_string(), "Outcome".to_string()), ("B2".into(), "Base".into())];
        for r in 3..=10 {
            cells.push((format!("A{}", r), format!("row {}", r)));
            cells.push((format!("B{}", r), r.to_string()));
        }
        cells.push(("A14".into(), "stray".into()));
        cells.push(("B14".into(), "99".into()));
        let cells: Vec<(&str, &str)> = cells.iter().map(|(a, v)| (a.as_str(), v.as_str())).collect();
        let ws = sheet(&cells);

        let layout = LayoutConfig::default();
        let rows = outcome_rows(&ws, &layout, 2, &layout.scenario_columns());
        assert_eq!(rows, (3..=10).collect::<Vec<_>>());

        let engine = FormulaEngine::new(&ws);
        let sections = extract_sections(&engine, &layout, &LabelOverrides::new());
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].records.len(), 8);
        assert_eq!(sections[0].records[7].get("Base"), Some(&DisplayValue::Integer(10)));
        assert!(
            sections[0]
                .records
                .iter()
                .all(|r| r.get("Outcome") != Some(&DisplayValue::text("stray")))
        );
    }

    #[test]
    fn test_banners_split_sections() {
        let ws = sheet(&[
            ("A2", "Outcome"),
            ("B2", "Base"),
            ("C2", "High"),
            ("A3", "Revenue"),
            ("A4", "Sales"),
            ("B4", "100"),
            ("C4", "=B4*1.5"),
            ("A5", "Margin"),
            ("B5", "0.256"),
            ("C5", "0.3"),
            ("A6", "Costs"),
            ("A7", "Fixed"),
            ("B7", "12.5"),
            ("C7", "13.5"),
        ]);
        let engine = FormulaEngine::new(&ws);
        let sections = extract_sections(&engine, &LayoutConfig::default(), &LabelOverrides::new());
        assert_eq!(
            sections,
            vec![
                Section::new(
                    "Revenue",
                    vec![
                        Record::new()
                            .with("Outcome", DisplayValue::text("Sales"))
                            .with("Base", num(100.0))
                            .with("High", num(150.0)),
                        Record::new()
                            .with("Outcome", DisplayValue::text("Margin"))
                            .with("Base", num(0.26))
                            .with("High", num(0.3)),
                    ]
                ),
                Section::new(
                    "Costs",
                    vec![Record::new()
                        .with("Outcome", DisplayValue::text("Fixed"))
                        .with("Base", DisplayValue::Integer(12))
                        .with("High", DisplayValue::Integer(14))],
                ),
            ]
        );
    }

    #[test]
    fn test_records_without_banner_form_results() {
        let ws = sheet(&[
            ("A5", "Outcome"),
            ("B5", "Scenario"),
            ("A6", "x"),
            ("B6", "1"),
            ("A7", "y"),
            ("B7", "2"),
            ("A8", "z"),
            ("B8", "=B6+B7"),
        ]);
        let engine = FormulaEngine::new(&ws);
        let sections = extract_sections(&engine, &LayoutConfig::default(), &LabelOverrides::new());
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Results");
        assert_eq!(sections[0].records.len(), 3);
        assert_eq!(sections[0].records[2].get("Scenario"), Some(&num(3.0)));
    }

    #[test]
    fn test_leading_records_join_first_section() {
        let ws = sheet(&[
            ("A2", "Outcome"),
            ("B2", "Base"),
            ("A3", "early"),
            ("B3", "1"),
            ("A4", "Group"),
            ("A5", "late"),
            ("B5", "2"),
            ("A6", "Empty group"),
        ]);
        let engine = FormulaEngine::new(&ws);
        let sections = extract_sections(&engine, &LayoutConfig::default(), &LabelOverrides::new());
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Group");
        assert_eq!(sections[0].records.len(), 2);
    }

    #[test]
    fn test_inactive_columns_and_overrides() {
        let ws = sheet(&[
            ("A2", "Outcome"),
            ("B2", "Base"),
            ("A3", "x"),
            ("B3", "1"),
            ("D3", "4"),
        ]);
        let engine = FormulaEngine::new(&ws);
        let overrides = LabelOverrides::from([("B".to_string(), " Low case ".to_string())]);
        let sections = extract_sections(&engine, &LayoutConfig::default(), &overrides);
        assert_eq!(sections[0].columns(), vec!["Outcome", "Low case", "D"]);
    }

    #[test]
    fn test_generic_scan_picks_largest_block() {
        let ws = sheet(&[
            ("B1", "Small"),
            ("C1", "1"),
            ("D1", "2"),
            ("B2", "s"),
            ("C2", "3"),
            ("B6", "Year"),
            ("C6", "2024"),
            ("D6", "2025"),
            ("E6", "2026"),
            ("B7", "Revenue"),
            ("C7", "10"),
            ("D7", "=C7*2"),
            ("E7", "0"),
            ("B8", "Cost"),
            ("C8", "4"),
            ("D8", "5"),
            ("E8", "0"),
        ]);
        let engine = FormulaEngine::new(&ws);
        let sections = extract_sections(&engine, &LayoutConfig::default(), &LabelOverrides::new());
        assert_eq!(
            sections,
            vec![Section::new(
                "Outputs",
                vec![
                    Record::new()
                        .with("Year", DisplayValue::text("Revenue"))
                        .with("2024", num(10.0))
                        .with("2025", num(20.0)),
                    Record::new()
                        .with("Year", DisplayValue::text("Cost"))
                        .with("2024", num(4.0))
                        .with("2025", num(5.0)),
                ]
            )]
        );
    }

    #[test]
    fn test_generic_scan_without_table_reports_error() {
        let ws = sheet(&[("A1", "Just a note")]);
        let engine = FormulaEngine::new(&ws);
        let sections = extract_sections(&engine, &LayoutConfig::default(), &LabelOverrides::new());
        assert_eq!(
            sections,
            vec![Section::new(
                "Outputs",
                vec![Record::new().with(
                    "Error",
                    DisplayValue::text("No Outcome found and no output table detected in A–E.")
                )]
            )]
        );
    }

    #[test]
    fn test_block_area_ordering_is_stable() {
        let ws = sheet(&[
            ("A1", "a"),
            ("B1", "1"),
            ("C1", "2"),
            ("A2", "b"),
            ("B2", "3"),
        ]);
        let blocks = find_blocks(&ws, &LayoutConfig::default());
        assert_eq!(
            blocks[0],
            Block {
                top: 1,
                left: 1,
                bottom: 2,
                right: 3
            }
        );
        assert_eq!(blocks[0].area(), 6);
    }

    #[test]
    fn test_scenario_headers() {
        let ws = sheet(&[("A3", "Outcome"), ("B3", " Base "), ("D3", "Stress"), ("B1", "ignored")]);
        let headers = scenario_headers(&ws, &LayoutConfig::default());
        assert_eq!(
            headers,
            BTreeMap::from([("B".to_string(), "Base".to_string()), ("D".to_string(), "Stress".to_string())])
        );
        let ws = sheet(&[("B1", "Top")]);
        assert_eq!(scenario_headers(&ws, &LayoutConfig::default()).get("B").map(String::as_str), Some("Top"));
    }
}
