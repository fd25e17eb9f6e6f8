//! Current-versus-history schema comparison.
//!
//! For each archivable table the comparator derives the history table name,
//! fetches both schemas, strips the ignored columns and diffs what remains.
//! Differences are returned as data ([`DiffEntry`]); only connection
//! failures, and metadata failures under `abort_on_missing`, stop a run.

use std::io::Write;

use anyhow::Result;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    config::AuditConfig,
    error::{AuditError, TableSide},
    metadata::{Attribute, MetadataProvider, TableSchema},
    report,
};

/// Inserts `his` after the first character, so `TFOO` pairs with `ThisFOO`.
/// Case is left exactly as given.
pub fn history_table_name(table: &str) -> String {
    let split = table
        .char_indices()
        .nth(1)
        .map(|(idx, _)| idx)
        .unwrap_or(table.len());
    let (head, tail) = table.split_at(split);
    format!("{head}his{tail}")
}

/// Drops ignored columns, matching names without regard to case since
/// catalogs differ in how they fold unquoted identifiers.
pub fn strip_ignored(schema: &mut TableSchema, ignore_fields: &[String]) {
    schema.retain(|name, _| {
        !ignore_fields
            .iter()
            .any(|field| field.eq_ignore_ascii_case(name))
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffEntry {
    AttributeMismatch {
        column: String,
        attribute: Attribute,
        current: String,
        history: String,
    },
    MissingFromHistory {
        column: String,
    },
    MissingFromCurrent {
        columns: Vec<String>,
    },
}

/// Walks `current` in catalog order. Shared columns are compared attribute
/// by attribute, current-only columns are reported one by one, and whatever
/// is left of `history` is reported as a single trailing entry.
pub fn diff_schemas(mut current: TableSchema, mut history: TableSchema) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    for (name, current_column) in current.drain(..) {
        match history.shift_remove(&name) {
            Some(history_column) => {
                for attribute in Attribute::COMPARED {
                    let current_value = current_column.value_of(attribute);
                    let history_value = history_column.value_of(attribute);
                    if current_value != history_value {
                        entries.push(DiffEntry::AttributeMismatch {
                            column: name.clone(),
                            attribute,
                            current: current_value,
                            history: history_value,
                        });
                    }
                }
            }
            None => entries.push(DiffEntry::MissingFromHistory { column: name }),
        }
    }
    if !history.is_empty() {
        entries.push(DiffEntry::MissingFromCurrent {
            columns: history.into_keys().collect(),
        });
    }
    entries
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Consistent,
    Inconsistent {
        differences: Vec<DiffEntry>,
    },
    Unavailable {
        side: Option<TableSide>,
        #[serde(rename = "failed_table")]
        table: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub history_table: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

impl TableReport {
    pub fn is_consistent(&self) -> bool {
        matches!(self.verdict, Verdict::Consistent)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub tables: Vec<TableReport>,
}

impl AuditReport {
    pub fn consistent_count(&self) -> usize {
        self.tables.iter().filter(|t| t.is_consistent()).count()
    }

    pub fn inconsistent_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t.verdict, Verdict::Inconsistent { .. }))
            .count()
    }

    pub fn unavailable_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t.verdict, Verdict::Unavailable { .. }))
            .count()
    }

    pub fn has_drift(&self) -> bool {
        self.tables.iter().any(|t| !t.is_consistent())
    }
}

pub struct Comparator<'a, P: MetadataProvider + ?Sized> {
    provider: &'a mut P,
    config: &'a AuditConfig,
}

impl<'a, P: MetadataProvider + ?Sized> Comparator<'a, P> {
    pub fn new(provider: &'a mut P, config: &'a AuditConfig) -> Self {
        Self { provider, config }
    }

    fn fetch(&mut self, table: &str, side: TableSide) -> Result<TableSchema, AuditError> {
        let mut schema = self
            .provider
            .table_struct(table)
            .map_err(|err| err.on_side(side))?;
        strip_ignored(&mut schema, &self.config.ignore_fields);
        Ok(schema)
    }

    pub fn compare_table(&mut self, table: &str) -> Result<TableReport, AuditError> {
        let history_table = history_table_name(table);
        debug!("Comparing {table} against {history_table}");
        let fetched = self.fetch(table, TableSide::Current).and_then(|current| {
            self.fetch(&history_table, TableSide::History)
                .map(|history| (current, history))
        });
        let verdict = match fetched {
            Ok((current, history)) if current == history => Verdict::Consistent,
            Ok((current, history)) => Verdict::Inconsistent {
                differences: diff_schemas(current, history),
            },
            Err(AuditError::MetadataUnavailable {
                table: failed,
                side,
                reason,
            }) if !self.config.abort_on_missing => {
                warn!("Skipping {table}: metadata unavailable for {failed} ({reason})");
                Verdict::Unavailable {
                    side,
                    table: failed,
                    reason,
                }
            }
            Err(err) => return Err(err),
        };
        Ok(TableReport {
            table: table.to_string(),
            history_table,
            verdict,
        })
    }

    pub fn run(&mut self) -> Result<AuditReport, AuditError> {
        let tables = self.provider.archivable_tables()?;
        info!("Comparing {} archivable table(s)", tables.len());
        let mut report = AuditReport::default();
        for table in &tables {
            report.tables.push(self.compare_table(table)?);
        }
        log_summary(&report);
        Ok(report)
    }

    /// Like [`Comparator::run`], but writes each table's text block to `out`
    /// as soon as it is decided.
    pub fn compare<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<AuditReport> {
        let tables = self.provider.archivable_tables()?;
        info!("Comparing {} archivable table(s)", tables.len());
        let mut report = AuditReport::default();
        for table in &tables {
            let table_report = self.compare_table(table)?;
            report::write_table_text(out, &table_report, self.config.quiet)?;
            report.tables.push(table_report);
        }
        out.flush()?;
        log_summary(&report);
        Ok(report)
    }
}

fn log_summary(report: &AuditReport) {
    info!(
        "{} consistent, {} inconsistent, {} unavailable",
        report.consistent_count(),
        report.inconsistent_count(),
        report.unavailable_count()
    );
}
