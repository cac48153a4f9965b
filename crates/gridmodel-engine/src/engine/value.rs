//! Scalar/vector values with array-formula style broadcasting.
//!
//! Every arithmetic operator in a formula works on [`ExpressionValue`]:
//!
//! - scalar ∘ scalar → scalar
//! - scalar ∘ vector → vector (scalar applied to each element)
//! - vector ∘ vector → vector, paired by position up to the shorter length
//!
//! Division, floor division and modulo by zero produce 0 instead of an
//! error so that a single bad parameter cannot abort an evaluation.

use std::ops::{Add, Div, Mul, Neg, Sub};

#[derive(Clone, Debug, PartialEq)]
pub enum ExpressionValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl ExpressionValue {
    /// Apply `op` elementwise with broadcasting.
    pub fn broadcast(&self, other: &ExpressionValue, op: impl Fn(f64, f64) -> f64) -> Self {
        use ExpressionValue::{Scalar, Vector};
        match (self, other) {
            (Scalar(a), Scalar(b)) => Scalar(op(*a, *b)),
            (Vector(a), Scalar(b)) => Vector(a.iter().map(|x| op(*x, *b)).collect()),
            (Scalar(a), Vector(b)) => Vector(b.iter().map(|y| op(*a, *y)).collect()),
            (Vector(a), Vector(b)) => Vector(a.iter().zip(b).map(|(x, y)| op(*x, *y)).collect()),
        }
    }

    pub fn map(&self, op: impl Fn(f64) -> f64) -> Self {
        match self {
            ExpressionValue::Scalar(a) => ExpressionValue::Scalar(op(*a)),
            ExpressionValue::Vector(v) => ExpressionValue::Vector(v.iter().map(|x| op(*x)).collect()),
        }
    }

    pub fn pow(&self, other: &ExpressionValue) -> Self {
        self.broadcast(other, f64::powf)
    }

    pub fn floor_div(&self, other: &ExpressionValue) -> Self {
        self.broadcast(other, |a, b| if b == 0.0 { 0.0 } else { (a / b).floor() })
    }

    /// Modulo with the sign of the divisor.
    pub fn rem(&self, other: &ExpressionValue) -> Self {
        self.broadcast(other, |a, b| {
            if b == 0.0 {
                0.0
            } else {
                a - b * (a / b).floor()
            }
        })
    }

    /// All numbers in order (a scalar yields one element).
    pub fn values(&self) -> &[f64] {
        match self {
            ExpressionValue::Scalar(a) => std::slice::from_ref(a),
            ExpressionValue::Vector(v) => v,
        }
    }

    /// Collapse to a scalar: vectors are summed.
    pub fn sum(&self) -> f64 {
        self.values().iter().sum()
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, ExpressionValue::Vector(_))
    }
}

impl From<f64> for ExpressionValue {
    fn from(value: f64) -> Self {
        ExpressionValue::Scalar(value)
    }
}

impl From<Vec<f64>> for ExpressionValue {
    fn from(value: Vec<f64>) -> Self {
        ExpressionValue::Vector(value)
    }
}

impl Add for &ExpressionValue {
    type Output = ExpressionValue;

    fn add(self, rhs: &ExpressionValue) -> ExpressionValue {
        self.broadcast(rhs, |a, b| a + b)
    }
}

impl Sub for &ExpressionValue {
    type Output = ExpressionValue;

    fn sub(self, rhs: &ExpressionValue) -> ExpressionValue {
        self.broadcast(rhs, |a, b| a - b)
    }
}

impl Mul for &ExpressionValue {
    type Output = ExpressionValue;

    fn mul(self, rhs: &ExpressionValue) -> ExpressionValue {
        self.broadcast(rhs, |a, b| a * b)
    }
}

impl Div for &ExpressionValue {
    type Output = ExpressionValue;

    fn div(self, rhs: &ExpressionValue) -> ExpressionValue {
        self.broadcast(rhs, |a, b| if b == 0.0 { 0.0 } else { a / b })
    }
}

impl Neg for &ExpressionValue {
    type Output = ExpressionValue;

    fn neg(self) -> ExpressionValue {
        self.map(|a| -a)
    }
}
