//! gridmodel-core - Parameter overlay, table extraction and model runs over
//! formula-driven worksheets.

pub mod error;
pub mod extract;
pub mod layout;
pub mod overlay;
pub mod params;
pub mod runner;
pub mod storage;
pub mod tree;
pub mod workbook;

pub use error::{ModelError, Result};
pub use extract::{LabelOverrides, Record, Section, extract_sections, scenario_headers};
pub use layout::{Column, ConfigFile, LayoutConfig};
pub use overlay::apply_parameters;
pub use params::{ParamValue, ParameterMap, parameters_from_toml};
pub use runner::{ModelOutput, ModelRunner};
pub use tree::{ParameterRow, ParameterTree, load_parameter_defaults};
pub use workbook::{Workbook, load_workbook};

pub use gridmodel_engine::engine::{CellRef, DisplayValue, Worksheet};
