//! Writing caller parameters into the parameter band.

use gridmodel_engine::engine::{CellRef, Worksheet};
use std::collections::HashMap;
use tracing::debug;

use crate::layout::LayoutConfig;
use crate::params::{ParamValue, ParameterMap, normalize_name};

/// Overwrite value cells of the parameter band whose name matches a
/// parameter. Names match exactly after trimming and dropping tabs.
/// Blank parameter values leave the cell alone, and formula cells are only
/// replaced when the layout allows it. Returns the number of cells written.
pub fn apply_parameters(sheet: &mut Worksheet, params: &ParameterMap, layout: &LayoutConfig) -> usize {
    let lookup: HashMap<String, &ParamValue> = params
        .iter()
        .map(|(key, value)| (normalize_name(key), value))
        .collect();

    let name_col = layout.parameter_name_column.index();
    let value_col = layout.parameter_value_column.index();
    let mut written = 0;

    for r in layout.parameter_start_row..=sheet.max_row() {
        let name_cell = sheet.cell(&CellRef::new(name_col, r));
        if name_cell.is_blank() {
            continue;
        }
        let name = name_cell.display_text();

        let value_ref = CellRef::new(value_col, r);
        if !layout.overwrite_formulas && sheet.cell(&value_ref).is_formula() {
            continue;
        }

        let Some(value) = lookup.get(name.as_str()) else {
            continue;
        };
        if value.is_blank() {
            continue;
        }
        debug!(parameter = %name, cell = %value_ref, value = %value, "overlay");
        sheet.set(value_ref, value.to_cell());
        written += 1;
    }
    written
}
