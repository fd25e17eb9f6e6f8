use std::io::{self, Write};

use anyhow::{Context, Result};

use crate::compare::{AuditReport, DiffEntry, TableReport, Verdict};

pub fn entry_line(entry: &DiffEntry) -> String {
    match entry {
        DiffEntry::AttributeMismatch {
            column,
            attribute,
            current,
            history,
        } => format!(
            "{column} differs between current and history table: {} is {current} in current table, {history} in history table",
            attribute.label()
        ),
        DiffEntry::MissingFromHistory { column } => {
            format!("{column} column missing from history table")
        }
        DiffEntry::MissingFromCurrent { columns } => {
            format!("{} columns missing from current table", columns.join(", "))
        }
    }
}

/// Writes one table's block followed by a blank separator line. Consistent
/// tables produce no output at all in quiet mode.
pub fn write_table_text<W: Write + ?Sized>(
    out: &mut W,
    report: &TableReport,
    quiet: bool,
) -> io::Result<()> {
    match &report.verdict {
        Verdict::Consistent if quiet => return Ok(()),
        Verdict::Consistent => {
            writeln!(out, "{} current and history tables are consistent", report.table)?;
        }
        Verdict::Inconsistent { differences } => {
            writeln!(
                out,
                "{} current and history tables are inconsistent",
                report.table
            )?;
            for entry in differences {
                writeln!(out, "{}", entry_line(entry))?;
            }
        }
        Verdict::Unavailable {
            side,
            table,
            reason,
        } => {
            let side = side.map(|s| format!("{s} ")).unwrap_or_default();
            writeln!(
                out,
                "{} could not be compared: {side}table {table} metadata unavailable ({reason})",
                report.table
            )?;
        }
    }
    writeln!(out)
}

pub fn render_json(report: &AuditReport, quiet: bool) -> Result<String> {
    let visible = AuditReport {
        tables: report
            .tables
            .iter()
            .filter(|table| !(quiet && table.is_consistent()))
            .cloned()
            .collect(),
    };
    serde_json::to_string_pretty(&visible).context("Serializing audit report as JSON")
}
