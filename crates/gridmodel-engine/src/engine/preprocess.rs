//! Formula translation into the restricted expression grammar.
//!
//! Spreadsheet formulas are rewritten textually before parsing:
//!
//! - `&` concatenation becomes `+`
//! - `A1:B5` becomes `RANGE("A1","B5")`
//! - `$A$1` becomes `VAL("A1")`
//! - `<>` becomes `!=` and a bare `=` becomes `==`
//! - `"text" + VAL("A1")` becomes `"text" + STR(VAL("A1"))`
//! - `^` becomes `**`
//! - the result is wrapped in `EV(...)`
//!
//! Every rewrite except the string coercion skips text inside string
//! literals.

use regex::{Captures, Regex};
use std::sync::OnceLock;

use super::cell_ref::normalize_ref;

/// Regex matching `<ref>:<ref>` with optional `$` anchors.
///
/// Captures:
/// - group 1: start reference
/// - group 2: end reference
pub fn range_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\$?\b[A-Z]{1,3}\$?[0-9]+\b)\s*:\s*(\$?\b[A-Z]{1,3}\$?[0-9]+\b)")
            .expect("range reference regex must compile")
    })
}

/// Regex matching a single cell reference with optional `$` anchors.
pub fn cell_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$?\b[A-Z]{1,3}\$?[0-9]+\b").expect("cell reference regex must compile")
    })
}

fn string_then_cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(".*?")\s*\+\s*(VAL\("[A-Z]+[0-9]+"\))"#)
            .expect("string coercion regex must compile")
    })
}

/// Translate spreadsheet formula text (with or without the leading `=`)
/// into the evaluator's expression syntax.
pub fn translate_formula(formula: &str) -> String {
    let body = formula.trim();
    let body = body.strip_prefix('=').unwrap_or(body);

    let expr = map_outside_strings(body, |seg| seg.replace('&', "+"));
    let expr = map_outside_strings(&expr, rewrite_ranges);
    let expr = map_outside_strings(&expr, rewrite_cells);
    let expr = map_outside_strings(&expr, normalize_comparisons);
    let expr = coerce_concatenated_cells(&expr);
    let expr = map_outside_strings(&expr, |seg| seg.replace('^', "**"));

    format!("EV({})", expr)
}

fn rewrite_ranges(seg: &str) -> String {
    range_ref_re()
        .replace_all(seg, |caps: &Captures| {
            format!(
                "RANGE(\"{}\",\"{}\")",
                normalize_ref(&caps[1]),
                normalize_ref(&caps[2])
            )
        })
        .to_string()
}

fn rewrite_cells(seg: &str) -> String {
    cell_ref_re()
        .replace_all(seg, |caps: &Captures| format!("VAL(\"{}\")", normalize_ref(&caps[0])))
        .to_string()
}

/// `<>` to `!=`, then any `=` not part of `<=`, `>=`, `==`, `!=` to `==`.
fn normalize_comparisons(seg: &str) -> String {
    let seg = seg.replace("<>", "!=");
    let chars: Vec<char> = seg.chars().collect();
    let mut out = String::with_capacity(seg.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c != '=' {
            out.push(c);
            continue;
        }
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(i + 1).copied();
        let joined_before = matches!(prev, Some('<' | '>' | '=' | '!'));
        let joined_after = matches!(next, Some('<' | '>' | '='));
        if joined_before || joined_after {
            out.push('=');
        } else {
            out.push_str("==");
        }
    }
    out
}

/// A quoted literal followed by `+ VAL("..")` concatenates text, so the
/// cell term is formatted as text. Only this literal-then-cell adjacency is
/// recognized; other concatenation shapes are left as numeric addition.
fn coerce_concatenated_cells(expr: &str) -> String {
    string_then_cell_re()
        .replace_all(expr, "${1} + STR(${2})")
        .to_string()
}

/// Apply `f` to every segment of `script` that lies outside a double-quoted
/// string literal. Quotes preceded by an odd number of backslashes do not
/// terminate a literal.
fn map_outside_strings(script: &str, f: impl Fn(&str) -> String) -> String {
    let bytes = script.as_bytes();
    let mut out = String::with_capacity(script.len());
    let mut seg_start = 0;
    let mut in_string = false;
    let mut backslashes = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if b == b'\\' {
                backslashes += 1;
                i += 1;
                continue;
            }
            if b == b'"' && backslashes.is_multiple_of(2) {
                out.push_str(&script[seg_start..=i]);
                in_string = false;
                seg_start = i + 1;
            }
            backslashes = 0;
            i += 1;
            continue;
        }

        if b == b'"' {
            out.push_str(&f(&script[seg_start..i]));
            in_string = true;
            seg_start = i;
            backslashes = 0;
        }
        i += 1;
    }

    if seg_start < script.len() {
        if in_string {
            out.push_str(&script[seg_start..]);
        } else {
            out.push_str(&f(&script[seg_start..]));
        }
    }

    out
}
