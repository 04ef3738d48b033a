//! Plain-text rendering of the column summary printed after a scan.

use std::fmt::Write as _;

use crate::{locale::LocaleTable, results::ParsingResults, sql};

const SUMMARY_HEADERS: [&str; 7] = ["#", "column", "type", "nullable", "max len", "nulls", "locale"];

/// One row per column: ordinal, name, SQL type, nullability, width, NULL count, grammar.
pub fn column_summary(
    results: &ParsingResults,
    locales: &LocaleTable,
) -> (Vec<String>, Vec<Vec<String>>) {
    let headers = SUMMARY_HEADERS.iter().map(|h| h.to_string()).collect();
    let types = sql::column_types(results, locales).types;
    let rows = results
        .columns()
        .iter()
        .zip(types)
        .map(|(column, sql_type)| {
            vec![
                (column.ordinal() + 1).to_string(),
                column.name().to_string(),
                sql_type.to_string(),
                if column.nullable() { "yes" } else { "no" }.to_string(),
                column.max_length().to_string(),
                column.null_count().to_string(),
                column.locale_name().unwrap_or("-").to_string(),
            ]
        })
        .collect();
    (headers, rows)
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat((*w).max(3))).collect();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = value.replace(['\n', '\r', '\t'], " ");
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}
