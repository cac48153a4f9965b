//! Markdown rendering of model output.

use crate::extract::Section;
use crate::runner::ModelOutput;
use crate::tree::{ParameterRow, value_text};
use std::fmt::Write;

/// Render a run as markdown: a title, the description, then one table per
/// section with columns padded to a common width.
pub fn render_markdown(output: &ModelOutput) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", escape_markdown(&output.title));
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", escape_markdown(&output.description));

    for section in &output.sections {
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}", escape_markdown(&section.title));
        let _ = writeln!(out);
        render_section(&mut out, section);
    }
    out
}

fn render_section(out: &mut String, section: &Section) {
    let headers = section.columns();
    if section.records.is_empty() || headers.is_empty() {
        let _ = writeln!(out, "*No rows*");
        return;
    }

    let rows: Vec<Vec<String>> = section
        .records
        .iter()
        .map(|record| {
            headers
                .iter()
                .map(|h| record.get(h).map(|v| escape_markdown(&v.to_string())).unwrap_or_default())
                .collect()
        })
        .collect();
    let headers: Vec<String> = headers.iter().map(|h| escape_markdown(h)).collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
                .max(3)
        })
        .collect();

    write_row(out, &headers, &widths);
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(out, &separator, &widths);
    for row in &rows {
        write_row(out, row, &widths);
    }
}

fn write_row(out: &mut String, cells: &[String], widths: &[usize]) {
    out.push('|');
    for (cell, width) in cells.iter().zip(widths) {
        let pad = width.saturating_sub(cell.chars().count());
        let _ = write!(out, " {}{} |", cell, " ".repeat(pad));
    }
    out.push('\n');
}

/// Parameter defaults as an indented two-column listing.
pub fn render_parameters(rows: &[ParameterRow]) -> String {
    let mut out = String::new();
    for row in rows {
        let indent = "  ".repeat(row.level);
        match &row.value {
            Some(_) => {
                let _ = writeln!(out, "{}{} = {}", indent, row.name, value_text(row));
            }
            None => {
                let _ = writeln!(out, "{}[{}]", indent, row.name);
            }
        }
    }
    out
}

/// Escape special markdown characters in cell content
fn escape_markdown(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ").replace('\r', "")
}
