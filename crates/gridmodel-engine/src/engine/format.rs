//! Number formatting and display quantization.

use serde::{Serialize, Serializer};
use std::fmt;

/// Values within this distance of an integer print without a fraction.
const INTEGRAL_TOLERANCE: f64 = 1e-12;

/// Format a number as text: integral values (within 1e-12) print with no
/// fractional part, everything else prints as a plain decimal.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let rounded = n.round();
    if (n - rounded).abs() < INTEGRAL_TOLERANCE && rounded.abs() < 1e15 {
        // `-0` would otherwise print with a sign.
        if rounded == 0.0 {
            return "0".to_string();
        }
        return format!("{:.0}", rounded);
    }
    n.to_string()
}

/// Magnitude-dependent display rounding.
///
/// |x| > 10 rounds to the nearest integer, anything else to two decimal
/// places. Both roundings resolve exact ties to even.
pub fn quantize(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    if x.abs() > 10.0 {
        x.round_ties_even()
    } else {
        round_2dp(x)
    }
}

/// Round to 2 decimal places using the exact decimal expansion of `x`.
/// Rust's float formatting rounds half to even on the exact binary value,
/// so `2.675` (stored as 2.67499..) becomes 2.67 and `0.125` becomes 0.12.
fn round_2dp(x: f64) -> f64 {
    let text = format!("{:.2}", x);
    text.parse::<f64>().unwrap_or(x)
}

/// A value prepared for display in an extracted table.
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
    Blank,
}

impl DisplayValue {
    /// Quantize a computed number for display.
    pub fn from_number(x: f64) -> DisplayValue {
        let q = quantize(x);
        if x.abs() > 10.0 && q.is_finite() && q.abs() < i64::MAX as f64 {
            DisplayValue::Integer(q as i64)
        } else {
            DisplayValue::Decimal(q)
        }
    }

    pub fn text(s: impl Into<String>) -> DisplayValue {
        let s = s.into();
        if s.is_empty() {
            DisplayValue::Blank
        } else {
            DisplayValue::Text(s)
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DisplayValue::Integer(i) => Some(*i as f64),
            DisplayValue::Decimal(d) => Some(*d),
            DisplayValue::Text(s) => s.trim().parse::<f64>().ok(),
            DisplayValue::Blank => None,
        }
    }

    /// Blank text, or a number within 1e-12 of zero.
    pub fn is_effectively_empty(&self) -> bool {
        match self {
            DisplayValue::Blank => true,
            DisplayValue::Text(s) if s.trim().is_empty() => true,
            DisplayValue::Text(s) => match s.trim().parse::<f64>() {
                Ok(n) => n.abs() <= INTEGRAL_TOLERANCE,
                Err(_) => false,
            },
            DisplayValue::Integer(i) => *i == 0,
            DisplayValue::Decimal(d) => d.abs() <= INTEGRAL_TOLERANCE,
        }
    }
}

impl fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayValue::Integer(i) => write!(f, "{}", i),
            DisplayValue::Decimal(d) => write!(f, "{}", d),
            DisplayValue::Text(s) => write!(f, "{}", s),
            DisplayValue::Blank => Ok(()),
        }
    }
}

impl Serialize for DisplayValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DisplayValue::Integer(i) => serializer.serialize_i64(*i),
            DisplayValue::Decimal(d) => serializer.serialize_f64(*d),
            DisplayValue::Text(s) => serializer.serialize_str(s),
            DisplayValue::Blank => serializer.serialize_str(""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_magnitude_rule() {
        assert_eq!(quantize(12.345), 12.0);
        assert_eq!(quantize(3.456), 3.46);
        assert_eq!(quantize(10.0), 10.0);
        assert_eq!(quantize(10.004), 10.0);
        assert_eq!(quantize(-3.456), -3.46);
    }

    #[test]
    fn test_quantize_ties_to_even() {
        assert_eq!(quantize(-15.5), -16.0);
        assert_eq!(quantize(12.5), 12.0);
        assert_eq!(quantize(13.5), 14.0);
        assert_eq!(quantize(0.125), 0.12);
        assert_eq!(quantize(0.375), 0.38);
    }

    #[test]
    fn test_display_value_from_number() {
        assert_eq!(DisplayValue::from_number(12.345), DisplayValue::Integer(12));
        assert_eq!(DisplayValue::from_number(3.456), DisplayValue::Decimal(3.46));
        assert_eq!(DisplayValue::from_number(-15.5), DisplayValue::Integer(-16));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.0000000000001), "2");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[test]
    fn test_effectively_empty() {
        assert!(DisplayValue::Blank.is_effectively_empty());
        assert!(DisplayValue::Decimal(0.0).is_effectively_empty());
        assert!(DisplayValue::Text("0".into()).is_effectively_empty());
        assert!(!DisplayValue::Text("n/a".into()).is_effectively_empty());
        assert!(!DisplayValue::Integer(3).is_effectively_empty());
    }
}
