//! Built-in spreadsheet functions and their metadata.
//!
//! Conventions:
//! - Formula-facing built-in names are ALL CAPS (e.g. `SUM`, `VAL`).
//! - `VAL`, `RANGE` and `EV` are emitted by the translator; the rest mirror
//!   the spreadsheet functions of the same name.
//! - If you add a new built-in, add a row to `BUILTINS` and a match arm in
//!   `call_builtin`. Nothing else can be called from a formula.

use regex::Regex;
use std::sync::OnceLock;

use crate::engine::{CellRef, CellResolver, ExpressionValue, Value, format_number};
use crate::error::{EvalError, Result};

/// Most cells RANGE or INDIRECT will produce: one full spreadsheet column
/// (1,048,576 rows).
pub const MAX_RANGE_CELLS: u64 = 1_048_576;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    Val,
    Range,
    Ev,
    Sum,
    Min,
    Max,
    SumProduct,
    If,
    Indirect,
    Row,
    Str,
}

pub struct BuiltinSpec {
    pub name: &'static str,
    pub builtin: Builtin,
    pub description: &'static str,
}

pub const BUILTINS: &[BuiltinSpec] = &[
    BuiltinSpec {
        name: "VAL",
        builtin: Builtin::Val,
        description: "Resolve a single cell reference to its number",
    },
    BuiltinSpec {
        name: "RANGE",
        builtin: Builtin::Range,
        description: "Resolve a rectangular range to a row-major vector",
    },
    BuiltinSpec {
        name: "EV",
        builtin: Builtin::Ev,
        description: "Pass-through wrapper around a whole formula",
    },
    BuiltinSpec {
        name: "SUM",
        builtin: Builtin::Sum,
        description: "Sum of all numbers across arguments",
    },
    BuiltinSpec {
        name: "MIN",
        builtin: Builtin::Min,
        description: "Minimum of all numbers across arguments (0 when empty)",
    },
    BuiltinSpec {
        name: "MAX",
        builtin: Builtin::Max,
        description: "Maximum of all numbers across arguments (0 when empty)",
    },
    BuiltinSpec {
        name: "SUMPRODUCT",
        builtin: Builtin::SumProduct,
        description: "Sum of elementwise products, broadcasting length-1 arguments",
    },
    BuiltinSpec {
        name: "IF",
        builtin: Builtin::If,
        description: "Eager conditional: IF(cond, then, else)",
    },
    BuiltinSpec {
        name: "INDIRECT",
        builtin: Builtin::Indirect,
        description: "Integer vector from a \"start:end\" pair embedded in text",
    },
    BuiltinSpec {
        name: "ROW",
        builtin: Builtin::Row,
        description: "Truncate values to integers, always as a vector",
    },
    BuiltinSpec {
        name: "STR",
        builtin: Builtin::Str,
        description: "Format a number as text, integral values without a fraction",
    },
];

impl Builtin {
    pub fn name(self) -> &'static str {
        BUILTINS
            .iter()
            .find(|spec| spec.builtin == self)
            .map(|spec| spec.name)
            .unwrap_or("?")
    }
}

/// Look up a built-in by its formula name.
pub fn lookup(name: &str) -> Option<Builtin> {
    BUILTINS
        .iter()
        .find(|spec| spec.name == name)
        .map(|spec| spec.builtin)
}

fn indirect_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9]+)\s*:\s*([0-9]+(\.[0-9]+)?)").expect("INDIRECT span regex must compile")
    })
}

fn expect_args(builtin: Builtin, args: &[Value], count: usize) -> Result<()> {
    if args.len() == count {
        Ok(())
    } else {
        Err(EvalError::Arity {
            name: builtin.name().to_string(),
            expected: count.to_string(),
            got: args.len(),
        })
    }
}

fn expect_text(builtin: Builtin, value: &Value) -> Result<String> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        other => Err(EvalError::TypeMismatch(format!(
            "{} expects a reference string, got {:?}",
            builtin.name(),
            other
        ))),
    }
}

fn parse_ref(text: &str) -> Result<CellRef> {
    CellRef::from_a1(text).ok_or_else(|| EvalError::MalformedReference(text.to_string()))
}

fn flatten(args: &[Value]) -> Vec<f64> {
    args.iter().flat_map(Value::flatten_numbers).collect()
}

/// Dispatch a validated call.
pub fn call_builtin(builtin: Builtin, args: Vec<Value>, resolver: &dyn CellResolver) -> Result<Value> {
    match builtin {
        Builtin::Val => {
            expect_args(builtin, &args, 1)?;
            let cell = parse_ref(&expect_text(builtin, &args[0])?)?;
            Ok(Value::scalar(resolver.resolve(&cell)?))
        }
        Builtin::Range => {
            expect_args(builtin, &args, 2)?;
            let start = parse_ref(&expect_text(builtin, &args[0])?)?;
            let end = parse_ref(&expect_text(builtin, &args[1])?)?;
            range(&start, &end, resolver)
        }
        Builtin::Ev => {
            expect_args(builtin, &args, 1)?;
            Ok(args.into_iter().next().unwrap_or(Value::Null))
        }
        Builtin::Sum => Ok(Value::scalar(flatten(&args).iter().sum())),
        Builtin::Min => {
            let vals = flatten(&args);
            Ok(Value::scalar(
                vals.iter().copied().reduce(f64::min).unwrap_or(0.0),
            ))
        }
        Builtin::Max => {
            let vals = flatten(&args);
            Ok(Value::scalar(
                vals.iter().copied().reduce(f64::max).unwrap_or(0.0),
            ))
        }
        Builtin::SumProduct => sum_product(&args),
        Builtin::If => {
            expect_args(builtin, &args, 3)?;
            let mut it = args.into_iter();
            let (Some(cond), Some(then), Some(otherwise)) = (it.next(), it.next(), it.next())
            else {
                return Ok(Value::Null);
            };
            Ok(if cond.is_truthy() { then } else { otherwise })
        }
        Builtin::Indirect => {
            expect_args(builtin, &args, 1)?;
            indirect(&args[0])
        }
        Builtin::Row => {
            expect_args(builtin, &args, 1)?;
            Ok(row(&args[0]))
        }
        Builtin::Str => {
            expect_args(builtin, &args, 1)?;
            Ok(Value::Text(format_number(args[0].to_number())))
        }
    }
}

/// Resolve every cell of the rectangle spanned by two corners, row-major.
fn range(start: &CellRef, end: &CellRef, resolver: &dyn CellResolver) -> Result<Value> {
    let (min_row, max_row) = (start.row.min(end.row), start.row.max(end.row));
    let (min_col, max_col) = (start.col.min(end.col), start.col.max(end.col));
    let cells = ((max_row - min_row + 1) as u64).saturating_mul((max_col - min_col + 1) as u64);
    check_range_size(cells)?;
    let mut values = Vec::with_capacity(cells as usize);
    for row in min_row..=max_row {
        for col in min_col..=max_col {
            values.push(resolver.resolve(&CellRef::new(col, row))?);
        }
    }
    Ok(Value::vector(values))
}

fn sum_product(args: &[Value]) -> Result<Value> {
    if args.is_empty() {
        return Ok(Value::scalar(0.0));
    }
    let lists: Vec<Vec<f64>> = args.iter().map(Value::flatten_numbers).collect();
    if lists.len() == 1 {
        return Ok(Value::scalar(lists[0].iter().sum()));
    }

    let max_len = lists.iter().map(Vec::len).max().unwrap_or(0);
    if let Some(bad) = lists.iter().find(|l| l.len() != 1 && l.len() != max_len) {
        return Err(EvalError::TypeMismatch(format!(
            "SUMPRODUCT arguments have different lengths ({} and {})",
            bad.len(),
            max_len
        )));
    }

    let total = (0..max_len)
        .map(|i| {
            lists
                .iter()
                .map(|l| if l.len() == 1 { l[0] } else { l[i] })
                .product::<f64>()
        })
        .sum();
    Ok(Value::scalar(total))
}

/// A narrow INDIRECT: pulls "start:end" integers out of text and returns
/// the inclusive integer span. Numbers and text without a span yield an
/// empty vector.
fn indirect(arg: &Value) -> Result<Value> {
    let text = match arg {
        Value::Text(s) => s.trim(),
        _ => return Ok(Value::vector(Vec::new())),
    };
    let Some(caps) = indirect_span_re().captures(text) else {
        return Ok(Value::vector(Vec::new()));
    };
    let parse = |s: &str| s.parse::<f64>().map(|f| f.trunc() as i64).ok();
    let (Some(mut start), Some(mut end)) = (parse(&caps[1]), parse(&caps[2])) else {
        return Ok(Value::vector(Vec::new()));
    };
    if end < start {
        std::mem::swap(&mut start, &mut end);
    }
    check_range_size(end.abs_diff(start).saturating_add(1))?;
    Ok(Value::vector((start..=end).map(|n| n as f64).collect()))
}

fn check_range_size(cells: u64) -> Result<()> {
    if cells > MAX_RANGE_CELLS {
        return Err(EvalError::RangeTooLarge {
            cells,
            limit: MAX_RANGE_CELLS,
        });
    }
    Ok(())
}

fn row(arg: &Value) -> Value {
    match arg {
        Value::Number(ExpressionValue::Vector(v)) => Value::vector(v.iter().map(|x| x.trunc()).collect()),
        Value::Number(ExpressionValue::Scalar(x)) => Value::vector(vec![x.trunc()]),
        Value::Bool(_) => Value::vector(vec![arg.to_number()]),
        Value::Sequence(items) => {
            Value::vector(items.iter().map(|item| item.to_number().trunc()).collect())
        }
        Value::Text(s) => match s.trim().parse::<f64>() {
            Ok(x) => Value::vector(vec![x.trunc()]),
            Err(_) => Value::vector(Vec::new()),
        },
        Value::Null => Value::vector(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Cells(HashMap<CellRef, f64>);

    impl CellResolver for Cells {
        fn resolve(&self, cell: &CellRef) -> Result<f64> {
            Ok(self.0.get(cell).copied().unwrap_or(0.0))
        }
    }

    fn column_b() -> Cells {
        Cells(HashMap::from([
            (CellRef::new(2, 2), 1.0),
            (CellRef::new(2, 3), 2.0),
            (CellRef::new(2, 4), 3.0),
        ]))
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_range_and_sum() {
        let cells = column_b();
        let r = call_builtin(Builtin::Range, vec![text("B2"), text("B4")], &cells).unwrap();
        assert_eq!(r, Value::vector(vec![1.0, 2.0, 3.0]));
        let s = call_builtin(Builtin::Sum, vec![r], &cells).unwrap();
        assert_eq!(s, Value::scalar(6.0));
    }

    #[test]
    fn test_range_two_dimensional_is_row_major() {
        let cells = Cells(HashMap::from([
            (CellRef::new(1, 1), 1.0),
            (CellRef::new(2, 1), 2.0),
            (CellRef::new(1, 2), 3.0),
            (CellRef::new(2, 2), 4.0),
        ]));
        let r = call_builtin(Builtin::Range, vec![text("A1"), text("B2")], &cells).unwrap();
        assert_eq!(r, Value::vector(vec![1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_val_malformed_reference() {
        let err = call_builtin(Builtin::Val, vec![text("B")], &column_b()).unwrap_err();
        assert_eq!(err, EvalError::MalformedReference("B".into()));
    }

    #[test]
    fn test_min_max_empty_is_zero() {
        let cells = column_b();
        assert_eq!(call_builtin(Builtin::Min, vec![], &cells).unwrap(), Value::scalar(0.0));
        assert_eq!(
            call_builtin(Builtin::Max, vec![Value::vector(vec![4.0, -1.0]), Value::scalar(2.0)], &cells)
                .unwrap(),
            Value::scalar(4.0)
        );
    }

    #[test]
    fn test_sumproduct_broadcasts_single_values() {
        let cells = column_b();
        let v = call_builtin(
            Builtin::SumProduct,
            vec![Value::vector(vec![1.0, 2.0, 3.0]), Value::scalar(2.0)],
            &cells,
        )
        .unwrap();
        assert_eq!(v, Value::scalar(12.0));
        let v = call_builtin(
            Builtin::SumProduct,
            vec![Value::vector(vec![1.0, 2.0]), Value::vector(vec![3.0, 4.0])],
            &cells,
        )
        .unwrap();
        assert_eq!(v, Value::scalar(11.0));
    }

    #[test]
    fn test_sumproduct_length_mismatch() {
        let err = call_builtin(
            Builtin::SumProduct,
            vec![Value::vector(vec![1.0, 2.0]), Value::vector(vec![1.0, 2.0, 3.0])],
            &column_b(),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch(_)));
    }

    #[test]
    fn test_if_is_eager_and_picks_branch() {
        let cells = column_b();
        let v = call_builtin(
            Builtin::If,
            vec![Value::Bool(false), Value::scalar(1.0), Value::scalar(2.0)],
            &cells,
        )
        .unwrap();
        assert_eq!(v, Value::scalar(2.0));
        assert!(matches!(
            call_builtin(Builtin::If, vec![Value::Bool(true)], &cells),
            Err(EvalError::Arity { .. })
        ));
    }

    #[test]
    fn test_indirect_span() {
        let cells = column_b();
        assert_eq!(
            call_builtin(Builtin::Indirect, vec![text("A5 : 3")], &cells).unwrap(),
            Value::vector(vec![3.0, 4.0, 5.0])
        );
        assert_eq!(
            call_builtin(Builtin::Indirect, vec![Value::scalar(3.0)], &cells).unwrap(),
            Value::vector(vec![])
        );
        assert_eq!(
            call_builtin(Builtin::Indirect, vec![text("nothing")], &cells).unwrap(),
            Value::vector(vec![])
        );
    }

    #[test]
    fn test_range_larger_than_a_column_is_refused() {
        let cells = column_b();
        let err = call_builtin(Builtin::Range, vec![text("A1"), text("XFD1048576")], &cells).unwrap_err();
        assert_eq!(
            err,
            EvalError::RangeTooLarge {
                cells: 16_384 * 1_048_576,
                limit: MAX_RANGE_CELLS,
            }
        );
        let column = call_builtin(Builtin::Range, vec![text("C1"), text("C1048576")], &cells).unwrap();
        assert_eq!(column.flatten_numbers().len(), 1_048_576);
    }

    #[test]
    fn test_indirect_span_is_capped() {
        let cells = column_b();
        assert!(matches!(
            call_builtin(Builtin::Indirect, vec![text("1:99999999999")], &cells),
            Err(EvalError::RangeTooLarge { limit: MAX_RANGE_CELLS, .. })
        ));
        assert!(matches!(
            call_builtin(Builtin::Indirect, vec![text(&format!("0:{}", "9".repeat(400)))], &cells),
            Err(EvalError::RangeTooLarge { .. })
        ));
        assert_eq!(
            call_builtin(Builtin::Indirect, vec![text("1:1048576")], &cells)
                .unwrap()
                .flatten_numbers()
                .len(),
            1_048_576
        );
    }

    #[test]
    fn test_row_coerces_to_integers() {
        let cells = column_b();
        assert_eq!(
            call_builtin(Builtin::Row, vec![Value::vector(vec![1.9, 2.2])], &cells).unwrap(),
            Value::vector(vec![1.0, 2.0])
        );
        assert_eq!(
            call_builtin(Builtin::Row, vec![text("7.5")], &cells).unwrap(),
            Value::vector(vec![7.0])
        );
        assert_eq!(
            call_builtin(Builtin::Row, vec![text("x")], &cells).unwrap(),
            Value::vector(vec![])
        );
    }

    #[test]
    fn test_str_formats_integral_values() {
        let cells = column_b();
        assert_eq!(
            call_builtin(Builtin::Str, vec![Value::scalar(3.0)], &cells).unwrap(),
            text("3")
        );
        assert_eq!(
            call_builtin(Builtin::Str, vec![Value::scalar(0.5)], &cells).unwrap(),
            text("0.5")
        );
    }

    #[test]
    fn test_lookup_covers_table() {
        for spec in BUILTINS {
            assert_eq!(lookup(spec.name), Some(spec.builtin));
            assert_eq!(spec.builtin.name(), spec.name);
        }
        assert_eq!(lookup("EXEC"), None);
    }
}
