use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Which half of a current/history pair a metadata lookup was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableSide {
    Current,
    History,
}

impl fmt::Display for TableSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableSide::Current => f.write_str("current"),
            TableSide::History => f.write_str("history"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("{}", describe_unavailable(.table, .side, .reason))]
    MetadataUnavailable {
        table: String,
        side: Option<TableSide>,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl AuditError {
    pub fn unavailable(table: impl Into<String>, reason: impl Into<String>) -> Self {
        AuditError::MetadataUnavailable {
            table: table.into(),
            side: None,
            reason: reason.into(),
        }
    }

    /// Tags a metadata failure with the side of the pair it occurred on.
    /// Other variants pass through untouched.
    pub fn on_side(self, side: TableSide) -> Self {
        match self {
            AuditError::MetadataUnavailable { table, reason, .. } => {
                AuditError::MetadataUnavailable {
                    table,
                    side: Some(side),
                    reason,
                }
            }
            other => other,
        }
    }

    pub fn is_fatal(&self) -> bool {
        !matches!(self, AuditError::MetadataUnavailable { .. })
    }
}

fn describe_unavailable(table: &str, side: &Option<TableSide>, reason: &str) -> String {
    match side {
        Some(side) => format!("metadata unavailable for {side} table {table}: {reason}"),
        None => format!("metadata unavailable for table {table}: {reason}"),
    }
}

impl From<tokio_postgres::Error> for AuditError {
    fn from(err: tokio_postgres::Error) -> Self {
        AuditError::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_side_names_the_failing_half() {
        let err = AuditError::unavailable("THISFOO", "no documented columns")
            .on_side(TableSide::History);
        assert_eq!(
            err.to_string(),
            "metadata unavailable for history table THISFOO: no documented columns"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn connection_errors_are_fatal_and_keep_their_shape() {
        let err = AuditError::Connection("refused".to_string()).on_side(TableSide::Current);
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "database connection error: refused");
    }
}
