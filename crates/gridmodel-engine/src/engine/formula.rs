//! Memoized cell resolution over a single worksheet.

use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

use super::cell::{CellType, Worksheet, coerce_text};
use super::cell_ref::CellRef;
use super::eval::{CellResolver, Environment, evaluate, into_expression_value};
use super::preprocess::translate_formula;
use super::value::ExpressionValue;
use crate::error::{EvalError, Result};

/// Cells resolved inside one another before resolution is deferred.
pub const MAX_RESOLVE_DEPTH: usize = 64;

/// Evaluates cells of one worksheet on demand.
///
/// Each engine owns its cache: a value is final once computed, so an engine
/// must not outlive the run it was built for.
///
/// Dependency chains of any length are resolved with bounded stack: when a
/// chain nests past [`MAX_RESOLVE_DEPTH`], the cell at the limit is resolved
/// on its own first and the outer cell is retried against the cache.
pub struct FormulaEngine<'a> {
    sheet: &'a Worksheet,
    env: Environment,
    cache: DashMap<CellRef, f64>,
    in_progress: DashSet<CellRef>,
    depth: AtomicUsize,
    evaluations: AtomicUsize,
}

impl<'a> FormulaEngine<'a> {
    pub fn new(sheet: &'a Worksheet) -> FormulaEngine<'a> {
        FormulaEngine::with_environment(sheet, Environment::standard())
    }

    pub fn with_environment(sheet: &'a Worksheet, env: Environment) -> FormulaEngine<'a> {
        FormulaEngine {
            sheet,
            env,
            cache: DashMap::new(),
            in_progress: DashSet::new(),
            depth: AtomicUsize::new(0),
            evaluations: AtomicUsize::new(0),
        }
    }

    pub fn sheet(&self) -> &Worksheet {
        self.sheet
    }

    /// Value of the cell at an A1 reference (`$` anchors allowed).
    /// Unparseable references resolve to 0.
    pub fn cell_value(&self, reference: &str) -> f64 {
        match CellRef::from_a1(reference) {
            Some(cell) => self.value_at(&cell),
            None => {
                warn!(reference, "not a cell reference");
                0.0
            }
        }
    }

    /// Value of a cell: empty is 0, numbers are themselves, text is coerced,
    /// formulas are evaluated with vector results summed. A failing formula
    /// is logged and yields 0.
    pub fn value_at(&self, cell: &CellRef) -> f64 {
        let mut pending = vec![*cell];
        while let Some(&next) = pending.last() {
            match self.compute(&next) {
                Ok(_) => {
                    pending.pop();
                }
                Err(EvalError::DepthExceeded(deep)) if pending.contains(&deep) => {
                    // The deferred cells loop back on themselves.
                    warn!(cell = %deep, "circular reference; using 0");
                    self.cache.insert(deep, 0.0);
                }
                Err(EvalError::DepthExceeded(deep)) => {
                    debug!(cell = %next, deferred = %deep, "dependency chain deferred");
                    pending.push(deep);
                }
                Err(error) => {
                    warn!(cell = %next, error = %error, "cell failed; using 0");
                    self.cache.insert(next, 0.0);
                    pending.pop();
                }
            }
        }
        self.cache.get(cell).map(|v| *v).unwrap_or(0.0)
    }

    /// Resolve one cell into the cache. Formula failures are contained
    /// here, except [`EvalError::DepthExceeded`], which leaves every cell on
    /// the chain uncached so it can be retried.
    fn compute(&self, cell: &CellRef) -> Result<f64> {
        if let Some(v) = self.cache.get(cell) {
            return Ok(*v);
        }

        let formula = match self.sheet.cell(cell).contents {
            CellType::Empty => return Ok(self.store(cell, 0.0)),
            CellType::Number(n) => return Ok(self.store(cell, n)),
            CellType::Text(s) => return Ok(self.store(cell, coerce_text(&s))),
            CellType::Formula(formula) => formula,
        };

        self.in_progress.insert(*cell);
        self.depth.fetch_add(1, Ordering::Relaxed);
        let result = self.evaluate_formula(&formula);
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.in_progress.remove(cell);

        let value = match result {
            Ok(v) => v.sum(),
            Err(error @ EvalError::DepthExceeded(_)) => return Err(error),
            Err(error) => {
                warn!(cell = %cell, formula = %formula, error = %error, "formula failed; using 0");
                0.0
            }
        };
        Ok(self.store(cell, value))
    }

    fn store(&self, cell: &CellRef, value: f64) -> f64 {
        self.cache.insert(*cell, value);
        value
    }

    /// Translate and evaluate formula text against this engine's sheet.
    pub fn evaluate_formula(&self, formula: &str) -> Result<ExpressionValue> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let translated = translate_formula(formula);
        debug!(formula, translated = %translated, "evaluating");
        let value = evaluate(&translated, &self.env, self)?;
        Ok(into_expression_value(value))
    }

    /// Number of formulas evaluated so far.
    pub fn evaluation_count(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

impl CellResolver for FormulaEngine<'_> {
    fn resolve(&self, cell: &CellRef) -> Result<f64> {
        if self.in_progress.contains(cell) {
            return Err(EvalError::CircularReference(cell.to_string()));
        }
        if let Some(v) = self.cache.get(cell) {
            return Ok(*v);
        }
        match self.depth.load(Ordering::Relaxed) {
            // A formula evaluated directly rather than through a cell.
            0 => Ok(self.value_at(cell)),
            depth if depth >= MAX_RESOLVE_DEPTH => Err(EvalError::DepthExceeded(*cell)),
            _ => self.compute(cell),
        }
    }
}
