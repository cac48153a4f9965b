//! Sandboxed evaluation of translated formula expressions.
//!
//! Evaluation is two-phase. [`validate`] walks the whole tree first and
//! rejects any call or name that is not bound in the [`Environment`]; only a
//! tree that passes is handed to the evaluator. Together with the closed
//! grammar of [`super::parser`] this guarantees formula text can only ever
//! reach the whitelisted builtins.

use std::collections::HashMap;

use super::cell_ref::CellRef;
use super::format::format_number;
use super::parser::{BinaryOperator, BoolOperator, CompareOperator, Expr, Literal, UnaryOperator};
use super::parser::parse_expression;
use super::value::ExpressionValue;
use crate::builtins::{BUILTINS, Builtin, call_builtin};
use crate::error::{EvalError, Result};

/// Resolves single cells to numbers on behalf of `VAL` and `RANGE`.
pub trait CellResolver {
    fn resolve(&self, cell: &CellRef) -> Result<f64>;
}

/// A runtime value produced while evaluating an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(ExpressionValue),
    Text(String),
    Bool(bool),
    Null,
    Sequence(Vec<Value>),
}

impl Value {
    pub fn scalar(n: f64) -> Value {
        Value::Number(ExpressionValue::Scalar(n))
    }

    pub fn vector(v: Vec<f64>) -> Value {
        Value::Number(ExpressionValue::Vector(v))
    }

    /// Total numeric coercion: vectors and sequences sum, booleans are 1/0,
    /// text parses or becomes 0, null is 0.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => n.sum(),
            Value::Text(s) => super::cell::coerce_text(s),
            Value::Bool(b) => bool_to_f64(*b),
            Value::Null => 0.0,
            Value::Sequence(items) => items.iter().map(Value::to_number).sum(),
        }
    }

    /// Numbers in this value, one level deep: a sequence contributes one
    /// number per item.
    pub fn flatten_numbers(&self) -> Vec<f64> {
        match self {
            Value::Number(n) => n.values().to_vec(),
            Value::Sequence(items) => items.iter().map(Value::to_number).collect(),
            other => vec![other.to_number()],
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(ExpressionValue::Scalar(n)) => *n != 0.0,
            Value::Number(ExpressionValue::Vector(v)) => !v.is_empty(),
            Value::Text(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Sequence(items) => !items.is_empty(),
        }
    }

    /// Numeric view used by arithmetic. Text and null have none.
    fn as_numeric(&self) -> Option<ExpressionValue> {
        match self {
            Value::Number(n) => Some(n.clone()),
            Value::Bool(b) => Some(ExpressionValue::Scalar(bool_to_f64(*b))),
            Value::Sequence(items) => Some(ExpressionValue::Vector(
                items.iter().map(Value::to_number).collect(),
            )),
            Value::Text(_) | Value::Null => None,
        }
    }

    /// Numeric view used by arithmetic: like [`Value::as_numeric`], but text
    /// coerces (non-numeric text is 0) and null is 0, so arithmetic never
    /// fails on operand type.
    fn to_operand(&self) -> ExpressionValue {
        match self.as_numeric() {
            Some(n) => n,
            None => ExpressionValue::Scalar(self.to_number()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Number(ExpressionValue::Scalar(_)) => "number",
            Value::Number(ExpressionValue::Vector(_)) => "vector",
            Value::Text(_) => "text",
            Value::Bool(_) => "boolean",
            Value::Null => "null",
            Value::Sequence(_) => "sequence",
        }
    }

    /// Render as text the way `STR` does.
    pub fn to_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            other => format_number(other.to_number()),
        }
    }
}

fn bool_to_f64(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// A name bound in the evaluation environment.
#[derive(Clone, Debug, PartialEq)]
pub enum Binding {
    Function(Builtin),
    Constant(Value),
}

/// The whitelist: every name a formula may call or reference.
#[derive(Clone, Debug)]
pub struct Environment {
    bindings: HashMap<String, Binding>,
}

impl Environment {
    /// An environment with no bindings at all.
    pub fn empty() -> Environment {
        Environment {
            bindings: HashMap::new(),
        }
    }

    /// The standard spreadsheet environment: every builtin plus the
    /// `TRUE`/`FALSE` constants.
    pub fn standard() -> Environment {
        let mut env = Environment::empty();
        for spec in BUILTINS {
            env.bind(spec.name, Binding::Function(spec.builtin));
        }
        env.bind("TRUE", Binding::Constant(Value::Bool(true)));
        env.bind("FALSE", Binding::Constant(Value::Bool(false)));
        env
    }

    pub fn bind(&mut self, name: &str, binding: Binding) {
        self.bindings.insert(name.to_string(), binding);
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::standard()
    }
}

/// Check the whole tree against the environment before anything runs.
pub fn validate(expr: &Expr, env: &Environment) -> Result<()> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::NameRef(name) => match env.get(name) {
            Some(_) => Ok(()),
            None => Err(EvalError::DisallowedExpression(format!(
                "unknown name '{}'",
                name
            ))),
        },
        Expr::Call { name, args } => {
            match env.get(name) {
                Some(Binding::Function(_)) => {}
                Some(Binding::Constant(_)) => {
                    return Err(EvalError::DisallowedExpression(format!(
                        "'{}' is not callable",
                        name
                    )));
                }
                None => {
                    return Err(EvalError::DisallowedExpression(format!(
                        "call to non-whitelisted function '{}'",
                        name
                    )));
                }
            }
            args.iter().try_for_each(|arg| validate(arg, env))
        }
        Expr::BinaryOp { .. } => {
            let (leftmost, links) = left_spine(expr);
            validate(leftmost, env)?;
            links.iter().try_for_each(|(_, rhs)| validate(rhs, env))
        }
        Expr::UnaryOp { operand, .. } => validate(operand, env),
        Expr::Compare { first, rest } => {
            validate(first, env)?;
            rest.iter().try_for_each(|(_, e)| validate(e, env))
        }
        Expr::BoolOp { operands, .. } | Expr::Sequence(operands) => {
            operands.iter().try_for_each(|e| validate(e, env))
        }
    }
}

/// Split a left-deep operator chain into its leftmost operand and the
/// `(op, rhs)` links applied to it, in evaluation order.
fn left_spine(expr: &Expr) -> (&Expr, Vec<(BinaryOperator, &Expr)>) {
    let mut links = Vec::new();
    let mut node = expr;
    while let Expr::BinaryOp { op, lhs, rhs } = node {
        links.push((*op, rhs.as_ref()));
        node = lhs;
    }
    links.reverse();
    (node, links)
}

/// Parse, validate, then evaluate translated expression text.
pub fn evaluate(src: &str, env: &Environment, resolver: &dyn CellResolver) -> Result<Value> {
    let expr = parse_expression(src)?;
    validate(&expr, env)?;
    Evaluator { env, resolver }.eval(&expr)
}

struct Evaluator<'a> {
    env: &'a Environment,
    resolver: &'a dyn CellResolver,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Number(n) => Value::scalar(*n),
                Literal::Text(s) => Value::Text(s.clone()),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
            }),
            Expr::NameRef(name) => match self.env.get(name) {
                Some(Binding::Constant(v)) => Ok(v.clone()),
                Some(Binding::Function(_)) => Err(EvalError::TypeMismatch(format!(
                    "function '{}' used as a value",
                    name
                ))),
                None => Err(EvalError::DisallowedExpression(format!(
                    "unknown name '{}'",
                    name
                ))),
            },
            Expr::Call { name, args } => {
                let Some(Binding::Function(builtin)) = self.env.get(name) else {
                    return Err(EvalError::DisallowedExpression(format!(
                        "call to non-whitelisted function '{}'",
                        name
                    )));
                };
                // Arguments are evaluated eagerly, so IF never short-circuits.
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                call_builtin(*builtin, values, self.resolver)
            }
            Expr::BinaryOp { .. } => {
                let (leftmost, links) = left_spine(expr);
                let mut acc = self.eval(leftmost)?;
                for (op, rhs) in links {
                    let r = self.eval(rhs)?;
                    acc = binary(op, &acc, &r)?;
                }
                Ok(acc)
            }
            Expr::UnaryOp { op, operand } => {
                let n = self.eval(operand)?.to_operand();
                Ok(Value::Number(match op {
                    UnaryOperator::Plus => n,
                    UnaryOperator::Minus => -&n,
                }))
            }
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first)?;
                let mut result = Value::Bool(true);
                for (op, right_expr) in rest {
                    let right = self.eval(right_expr)?;
                    result = compare(*op, &left, &right)?;
                    if !result.is_truthy() {
                        return Ok(result);
                    }
                    left = right;
                }
                Ok(result)
            }
            Expr::BoolOp { op, operands } => {
                let mut last = Value::Null;
                for operand in operands {
                    last = self.eval(operand)?;
                    let decided = match op {
                        BoolOperator::And => !last.is_truthy(),
                        BoolOperator::Or => last.is_truthy(),
                    };
                    if decided {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Sequence(items) => Ok(Value::Sequence(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>>>()?,
            )),
        }
    }
}

fn binary(op: BinaryOperator, l: &Value, r: &Value) -> Result<Value> {
    if let (BinaryOperator::Add, Value::Text(a), Value::Text(b)) = (op, l, r) {
        return Ok(Value::Text(format!("{}{}", a, b)));
    }
    let (a, b) = (l.to_operand(), r.to_operand());
    Ok(Value::Number(match op {
        BinaryOperator::Add => &a + &b,
        BinaryOperator::Sub => &a - &b,
        BinaryOperator::Mul => &a * &b,
        BinaryOperator::Div => &a / &b,
        BinaryOperator::FloorDiv => a.floor_div(&b),
        BinaryOperator::Mod => a.rem(&b),
        BinaryOperator::Pow => a.pow(&b),
    }))
}

fn compare(op: CompareOperator, l: &Value, r: &Value) -> Result<Value> {
    let test = |ord: std::cmp::Ordering| match op {
        CompareOperator::Eq => ord.is_eq(),
        CompareOperator::NotEq => ord.is_ne(),
        CompareOperator::Lt => ord.is_lt(),
        CompareOperator::LtE => ord.is_le(),
        CompareOperator::Gt => ord.is_gt(),
        CompareOperator::GtE => ord.is_ge(),
    };

    if let (Value::Text(a), Value::Text(b)) = (l, r) {
        return Ok(Value::Bool(test(a.cmp(b))));
    }

    match (l.as_numeric(), r.as_numeric()) {
        (Some(ExpressionValue::Scalar(a)), Some(ExpressionValue::Scalar(b))) => {
            Ok(Value::Bool(match a.partial_cmp(&b) {
                Some(ord) => test(ord),
                None => op == CompareOperator::NotEq,
            }))
        }
        (Some(a), Some(b)) => Ok(Value::Number(a.broadcast(&b, |x, y| {
            let hit = match x.partial_cmp(&y) {
                Some(ord) => test(ord),
                None => op == CompareOperator::NotEq,
            };
            bool_to_f64(hit)
        }))),
        // Mixed kinds are never equal and cannot be ordered.
        _ => match op {
            CompareOperator::Eq => Ok(Value::Bool(false)),
            CompareOperator::NotEq => Ok(Value::Bool(true)),
            _ => Err(EvalError::TypeMismatch(format!(
                "cannot order {} and {}",
                l.kind(),
                r.kind()
            ))),
        },
    }
}

/// Reduce a final formula result to the scalar/vector form a cell can hold.
pub fn into_expression_value(value: Value) -> ExpressionValue {
    match value {
        Value::Number(n) => n,
        Value::Sequence(items) => {
            ExpressionValue::Vector(items.iter().map(Value::to_number).collect())
        }
        other => ExpressionValue::Scalar(other.to_number()),
    }
}
