//! Offline catalog snapshots.
//!
//! A snapshot is a YAML copy of the two catalog reads the comparator needs:
//! the archive registry and the raw column rows per table. It can be
//! captured from a live database with [`capture`] and audited later through
//! [`SnapshotProvider`], which applies the same visibility rules as the live
//! provider.

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    compare::history_table_name,
    config::RegistryConfig,
    error::AuditError,
    metadata::{MetadataProvider, RawColumn, RegistryEntry},
    yaml,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    #[serde(default)]
    pub registry: Vec<RegistryEntry>,
    #[serde(default)]
    pub tables: IndexMap<String, Vec<RawColumn>>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let snapshot: Snapshot = yaml::load_from_path(path)
            .with_context(|| format!("Loading catalog snapshot from {path:?}"))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        yaml::save_to_path(path, self)
            .with_context(|| format!("Writing catalog snapshot to {path:?}"))
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        let mut table_names = std::collections::HashMap::new();
        for name in self.tables.keys() {
            if let Some(previous) = table_names.insert(name.to_uppercase(), name) {
                return Err(AuditError::Snapshot(format!(
                    "tables {previous} and {name} differ only in case"
                )));
            }
        }
        for (name, columns) in &self.tables {
            let mut seen = std::collections::HashSet::new();
            for column in columns {
                if !seen.insert(column.column_name.as_str()) {
                    return Err(AuditError::Snapshot(format!(
                        "table {name} lists column {} more than once",
                        column.column_name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Catalog lookup is case-insensitive, as table names are upper-cased
    /// before querying the catalog.
    fn columns_for(&self, table: &str) -> Option<&Vec<RawColumn>> {
        let wanted = table.to_uppercase();
        self.tables
            .iter()
            .find(|(name, _)| name.to_uppercase() == wanted)
            .map(|(_, columns)| columns)
    }
}

pub struct SnapshotProvider {
    snapshot: Snapshot,
    excluded_category: String,
}

impl SnapshotProvider {
    pub fn new(snapshot: Snapshot, registry: &RegistryConfig) -> Self {
        Self {
            snapshot,
            excluded_category: registry.excluded_category.clone(),
        }
    }

    pub fn load(path: &Path, registry: &RegistryConfig) -> Result<Self> {
        Ok(Self::new(Snapshot::load(path)?, registry))
    }
}

impl MetadataProvider for SnapshotProvider {
    fn registry(&mut self) -> Result<Vec<RegistryEntry>, AuditError> {
        let excluded = self.excluded_category.as_str();
        Ok(self
            .snapshot
            .registry
            .iter()
            .filter(|entry| entry.category.as_deref().is_some_and(|c| c != excluded))
            .cloned()
            .collect())
    }

    fn raw_columns(&mut self, table: &str) -> Result<Vec<RawColumn>, AuditError> {
        let Some(columns) = self.snapshot.columns_for(table) else {
            debug!("{table} is not present in the snapshot");
            return Ok(Vec::new());
        };
        Ok(columns
            .iter()
            .filter(|column| column.comment.is_some())
            .cloned()
            .collect())
    }
}

/// Records the registry and the documented columns of every archivable
/// table and its history table. Pairs whose metadata cannot be read are
/// left out of the snapshot; connection failures abort the capture.
pub fn capture<P: MetadataProvider + ?Sized>(provider: &mut P) -> Result<Snapshot, AuditError> {
    let mut snapshot = Snapshot::default();
    for entry in provider.registry()? {
        for name in [entry.table.clone(), history_table_name(&entry.table)] {
            match provider.raw_columns(&name) {
                Ok(columns) if columns.is_empty() => {
                    warn!("{name} has no documented columns; not captured");
                }
                Ok(columns) => {
                    snapshot.tables.insert(name, columns);
                }
                Err(err) if !err.is_fatal() => warn!("{err}; not captured"),
                Err(err) => return Err(err),
            }
        }
        snapshot.registry.push(entry);
    }
    Ok(snapshot)
}
