//! Column metadata model and the normalization applied to catalog rows.
//!
//! A [`MetadataProvider`] answers two questions about a database: which
//! current tables are registered for historization, and which documented
//! columns a table has. Every provider hands back [`RawColumn`] rows; the
//! shared [`MetadataProvider::table_struct`] turns them into a
//! [`TableSchema`] so live and offline sources normalize identically.

use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::AuditError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nullable {
    #[serde(rename = "Y")]
    Yes,
    #[serde(rename = "N")]
    No,
}

impl fmt::Display for Nullable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nullable::Yes => f.write_str("Y"),
            Nullable::No => f.write_str("N"),
        }
    }
}

impl FromStr for Nullable {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "Y" | "YES" => Ok(Nullable::Yes),
            "N" | "NO" => Ok(Nullable::No),
            other => Err(format!("Unrecognised nullability flag '{other}'")),
        }
    }
}

/// One row of the column catalog, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawColumn {
    pub column_name: String,
    pub data_type: String,
    pub data_length: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_precision: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_scale: Option<i64>,
    pub nullable: Nullable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Normalized per-column metadata; the unit of comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub precision: i64,
    pub scale: i64,
    pub nullable: Nullable,
}

/// The attributes of a [`ColumnDescriptor`] that take part in a diff, in
/// the order they are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    DataType,
    Precision,
    Scale,
    Nullable,
}

impl Attribute {
    pub const COMPARED: [Attribute; 4] = [
        Attribute::DataType,
        Attribute::Precision,
        Attribute::Scale,
        Attribute::Nullable,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Attribute::DataType => "DATA_TYPE",
            Attribute::Precision => "DATA_PRECISION",
            Attribute::Scale => "DATA_SCALE",
            Attribute::Nullable => "NULLABLE",
        }
    }

    pub fn label(self) -> &'static str {
        attribute_label(self.key())
    }
}

/// Human-readable label for a catalog attribute key. Unknown keys are
/// returned as-is.
pub fn attribute_label(key: &str) -> &str {
    match key {
        "DATA_TYPE" => "field type",
        "DATA_PRECISION" => "total field length",
        "DATA_SCALE" => "decimal precision",
        "NULLABLE" => "nullable?",
        other => other,
    }
}

impl ColumnDescriptor {
    pub fn value_of(&self, attribute: Attribute) -> String {
        match attribute {
            Attribute::DataType => self.data_type.clone(),
            Attribute::Precision => self.precision.to_string(),
            Attribute::Scale => self.scale.to_string(),
            Attribute::Nullable => self.nullable.to_string(),
        }
    }
}

/// Resolves precision and scale defaults and drops the raw length.
pub fn normalize_column(raw: RawColumn) -> ColumnDescriptor {
    ColumnDescriptor {
        precision: raw.data_precision.unwrap_or(raw.data_length),
        scale: raw.data_scale.unwrap_or(0),
        name: raw.column_name,
        data_type: raw.data_type,
        nullable: raw.nullable,
    }
}

/// Column name to descriptor, in catalog order.
pub type TableSchema = IndexMap<String, ColumnDescriptor>;

pub fn build_schema<I>(rows: I) -> TableSchema
where
    I: IntoIterator<Item = RawColumn>,
{
    rows.into_iter()
        .map(normalize_column)
        .map(|column| (column.name.clone(), column))
        .collect()
}

/// One row of the archive registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryEntry {
    pub table: String,
    /// Archive category. Rows without one are never archivable, matching
    /// how the catalog query treats a NULL category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

pub trait MetadataProvider {
    /// Registry rows of the archivable tables: a category is present and is
    /// not the reserved one.
    fn registry(&mut self) -> Result<Vec<RegistryEntry>, AuditError>;

    fn archivable_tables(&mut self) -> Result<Vec<String>, AuditError> {
        Ok(self
            .registry()?
            .into_iter()
            .map(|entry| entry.table)
            .collect())
    }

    /// Documented columns of `table` in catalog order. Columns without a
    /// comment are never returned.
    fn raw_columns(&mut self, table: &str) -> Result<Vec<RawColumn>, AuditError>;

    fn table_struct(&mut self, table: &str) -> Result<TableSchema, AuditError> {
        let rows = self.raw_columns(table)?;
        if rows.is_empty() {
            return Err(AuditError::unavailable(
                table,
                "table not found or has no documented columns",
            ));
        }
        debug!("Fetched {} column(s) for {}", rows.len(), table);
        Ok(build_schema(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, data_type: &str, length: i64) -> RawColumn {
        RawColumn {
            column_name: name.to_string(),
            data_type: data_type.to_string(),
            data_length: length,
            data_precision: None,
            data_scale: None,
            nullable: Nullable::No,
            comment: Some("documented".to_string()),
        }
    }

    #[test]
    fn missing_precision_falls_back_to_length() {
        let column = normalize_column(raw("VC_CODE", "VARCHAR2", 38));
        assert_eq!(column.precision, 38);
        assert_eq!(column.scale, 0);
    }

    #[test]
    fn explicit_precision_and_scale_are_kept() {
        let mut row = raw("EN_AMOUNT", "NUMBER", 22);
        row.data_precision = Some(18);
        row.data_scale = Some(4);
        let column = normalize_column(row);
        assert_eq!(column.precision, 18);
        assert_eq!(column.scale, 4);
    }

    #[test]
    fn raw_length_does_not_survive_normalization() {
        let mut left = raw("EN_AMOUNT", "NUMBER", 22);
        left.data_precision = Some(10);
        let mut right = raw("EN_AMOUNT", "NUMBER", 40);
        right.data_precision = Some(10);
        assert_eq!(normalize_column(left), normalize_column(right));
    }

    #[test]
    fn build_schema_preserves_catalog_order() {
        let schema = build_schema(vec![
            raw("ZETA", "CHAR", 1),
            raw("ALPHA", "CHAR", 1),
            raw("MIDDLE", "CHAR", 1),
        ]);
        let names: Vec<&str> = schema.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["ZETA", "ALPHA", "MIDDLE"]);
    }

    #[test]
    fn labels_cover_compared_attributes_and_pass_unknown_keys_through() {
        let labels: Vec<&str> = Attribute::COMPARED.iter().map(|a| a.label()).collect();
        assert_eq!(
            labels,
            vec![
                "field type",
                "total field length",
                "decimal precision",
                "nullable?"
            ]
        );
        assert_eq!(attribute_label("CHAR_USED"), "CHAR_USED");
    }

    #[test]
    fn nullable_parses_catalog_spellings() {
        assert_eq!("Y".parse::<Nullable>(), Ok(Nullable::Yes));
        assert_eq!("no".parse::<Nullable>(), Ok(Nullable::No));
        assert!("maybe".parse::<Nullable>().is_err());
    }

    struct EmptyCatalog;

    impl MetadataProvider for EmptyCatalog {
        fn registry(&mut self) -> Result<Vec<RegistryEntry>, AuditError> {
            Ok(Vec::new())
        }

        fn raw_columns(&mut self, _table: &str) -> Result<Vec<RawColumn>, AuditError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn table_without_rows_is_unavailable() {
        let err = EmptyCatalog.table_struct("TGHOST").unwrap_err();
        assert!(matches!(
            err,
            AuditError::MetadataUnavailable { ref table, side: None, .. } if table == "TGHOST"
        ));
    }
}
