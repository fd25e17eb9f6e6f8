use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{error::AuditError, yaml};

pub const DEFAULT_IGNORE_FIELDS: &[&str] = &["L_DATE", "D_DATETIME"];
pub const DEFAULT_SCHEMA: &str = "public";

/// Where the list of archivable tables lives and which category is never
/// historized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub table: String,
    pub name_column: String,
    pub category_column: String,
    pub excluded_category: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            table: "TARCHIVE".to_string(),
            name_column: "VC_TABLE_NAME".to_string(),
            category_column: "C_ARCHIVE_TYPE".to_string(),
            excluded_category: "4".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Suppress the per-table line for consistent pairs.
    pub quiet: bool,
    /// Columns stripped from both sides before comparing.
    pub ignore_fields: Vec<String>,
    /// Abort the whole run when a table's metadata is unavailable instead
    /// of skipping the pair.
    pub abort_on_missing: bool,
    /// Catalog schema the live provider inspects.
    pub schema: String,
    pub registry: RegistryConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            ignore_fields: DEFAULT_IGNORE_FIELDS.iter().map(|f| f.to_string()).collect(),
            abort_on_missing: false,
            schema: DEFAULT_SCHEMA.to_string(),
            registry: RegistryConfig::default(),
        }
    }
}

/// Command-line values layered on top of a loaded [`AuditConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub quiet: bool,
    pub ignore_fields: Vec<String>,
    pub no_default_ignores: bool,
    pub fail_fast: bool,
    pub schema: Option<String>,
}

impl AuditConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: AuditConfig = yaml::load_from_path(path)
            .with_context(|| format!("Loading configuration from {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn apply(mut self, overrides: &ConfigOverrides) -> Self {
        if overrides.quiet {
            self.quiet = true;
        }
        if overrides.fail_fast {
            self.abort_on_missing = true;
        }
        if overrides.no_default_ignores {
            self.ignore_fields.clear();
        }
        for field in overrides
            .ignore_fields
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
        {
            if !self.ignore_fields.iter().any(|existing| existing == field) {
                self.ignore_fields.push(field.to_string());
            }
        }
        if let Some(schema) = &overrides.schema {
            self.schema = schema.clone();
        }
        self
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        let registry = &self.registry;
        for (key, value) in [
            ("registry.table", &registry.table),
            ("registry.name_column", &registry.name_column),
            ("registry.category_column", &registry.category_column),
            ("schema", &self.schema),
        ] {
            if value.trim().is_empty() {
                return Err(AuditError::Config(format!("{key} cannot be empty")));
            }
            // Spliced into SQL unquoted.
            if !is_plain_identifier(value) {
                return Err(AuditError::Config(format!(
                    "{key} '{value}' is not a plain SQL identifier"
                )));
            }
        }
        Ok(())
    }
}

fn is_plain_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_ignore_audit_timestamps() {
        let config = AuditConfig::default();
        assert!(!config.quiet);
        assert_eq!(config.ignore_fields, vec!["L_DATE", "D_DATETIME"]);
        assert_eq!(config.registry.excluded_category, "4");
    }

    #[test]
    fn partial_yaml_keeps_remaining_defaults() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "quiet: true\nregistry:\n  excluded_category: \"9\"").unwrap();
        let config = AuditConfig::load(file.path()).expect("load config");
        assert!(config.quiet);
        assert_eq!(config.registry.excluded_category, "9");
        assert_eq!(config.registry.table, "TARCHIVE");
        assert_eq!(config.ignore_fields.len(), 2);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "quiet_mode: true").unwrap();
        assert!(AuditConfig::load(file.path()).is_err());
    }

    #[test]
    fn blank_registry_table_is_invalid() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "registry:\n  table: \"  \"").unwrap();
        let err = AuditConfig::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("registry.table cannot be empty"));
    }

    #[test]
    fn identifiers_with_sql_syntax_are_rejected() {
        let config = AuditConfig {
            registry: RegistryConfig {
                table: "TARCHIVE; DROP TABLE TFOO".to_string(),
                ..RegistryConfig::default()
            },
            ..AuditConfig::default()
        };
        assert!(matches!(config.validate(), Err(AuditError::Config(_))));
        assert!(is_plain_identifier("VC_TABLE_NAME"));
        assert!(!is_plain_identifier("1TABLE"));
    }

    #[test]
    fn overrides_extend_ignore_fields_without_duplicates() {
        let overrides = ConfigOverrides {
            quiet: true,
            ignore_fields: vec!["L_DATE".to_string(), " D_UPDATED ".to_string()],
            ..ConfigOverrides::default()
        };
        let config = AuditConfig::default().apply(&overrides);
        assert!(config.quiet);
        assert_eq!(config.ignore_fields, vec!["L_DATE", "D_DATETIME", "D_UPDATED"]);
    }

    #[test]
    fn no_default_ignores_clears_before_extending() {
        let overrides = ConfigOverrides {
            no_default_ignores: true,
            ignore_fields: vec!["D_UPDATED".to_string()],
            fail_fast: true,
            schema: Some("o32".to_string()),
            ..ConfigOverrides::default()
        };
        let config = AuditConfig::default().apply(&overrides);
        assert_eq!(config.ignore_fields, vec!["D_UPDATED"]);
        assert!(config.abort_on_missing);
        assert_eq!(config.schema, "o32");
    }
}
