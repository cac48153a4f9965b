//! End-to-end model runs.

use gridmodel_engine::engine::{FormulaEngine, Worksheet};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info_span};

use crate::error::{ModelError, Result};
use crate::extract::{LabelOverrides, Section, extract_sections};
use crate::layout::LayoutConfig;
use crate::overlay::apply_parameters;
use crate::params::ParameterMap;
use crate::workbook::load_workbook;

/// Result of one run, ready for rendering.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelOutput {
    pub title: String,
    pub description: String,
    pub sections: Vec<Section>,
}

/// Runs worksheet models under one layout.
#[derive(Clone, Debug, Default)]
pub struct ModelRunner {
    layout: LayoutConfig,
}

impl ModelRunner {
    pub fn new(layout: LayoutConfig) -> ModelRunner {
        ModelRunner { layout }
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Overlay `params`, evaluate, and extract the output tables.
    ///
    /// The sheet is consumed: the overlay mutates it and a run never shares
    /// state with another.
    pub fn run(
        &self,
        sheet: Option<Worksheet>,
        filename: &str,
        params: &ParameterMap,
        overrides: &LabelOverrides,
    ) -> Result<ModelOutput> {
        let mut sheet = sheet.ok_or(ModelError::MissingWorkbookInput)?;
        let title = model_title(filename);
        let _span = info_span!("model_run", title = %title).entered();

        let written = apply_parameters(&mut sheet, params, &self.layout);
        debug!(written, "parameters applied");

        let engine = FormulaEngine::new(&sheet);
        let sections = extract_sections(&engine, &self.layout, overrides);
        debug!(
            sections = sections.len(),
            evaluations = engine.evaluation_count(),
            "run complete"
        );

        Ok(ModelOutput {
            title,
            description: self.layout.description.clone(),
            sections,
        })
    }

    /// Load `path`, pick a sheet and run it.
    pub fn run_file(
        &self,
        path: &Path,
        sheet_name: Option<&str>,
        params: &ParameterMap,
        overrides: &LabelOverrides,
    ) -> Result<ModelOutput> {
        let sheet = load_workbook(path)?.into_sheet(sheet_name)?;
        self.run(Some(sheet), &path.to_string_lossy(), params, overrides)
    }
}

/// File name without directory or extension.
pub fn model_title(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
