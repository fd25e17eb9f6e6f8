use itertools::Itertools;

use crate::metadata::{Attribute, TableSchema};

const DESCRIBE_HEADERS: [&str; 5] = ["COLUMN", "TYPE", "PRECISION", "SCALE", "NULLABLE"];

/// Fixed-width rendering of a normalized schema, one column per row, in
/// catalog order.
pub fn render_schema(schema: &TableSchema) -> String {
    let rows = schema
        .values()
        .map(|column| {
            let mut row = vec![column.name.clone()];
            row.extend(Attribute::COMPARED.iter().map(|a| column.value_of(*a)));
            row
        })
        .collect::<Vec<_>>();
    let headers = DESCRIBE_HEADERS
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(sanitize_cell(cell).chars().count());
        }
    }

    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    std::iter::once(headers)
        .chain(std::iter::once(separator.as_slice()))
        .chain(rows.iter().map(Vec::as_slice))
        .map(|row| format_row(row, &widths) + "\n")
        .collect()
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    values
        .iter()
        .zip(widths)
        .map(|(value, width)| format!("{:<width$}", sanitize_cell(value), width = *width))
        .join("  ")
        .trim_end()
        .to_string()
}

fn sanitize_cell(value: &str) -> String {
    value.replace(['\n', '\r', '\t'], " ")
}
