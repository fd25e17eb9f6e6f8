//! Live catalog access over a single PostgreSQL session.
//!
//! The session is driven by a private current-thread runtime so callers
//! stay synchronous. It is opened by [`PgProvider::connect`] and released by
//! [`PgProvider::close`], or on drop if a run ends early.

use log::{debug, error, info};
use tokio::{runtime::Runtime, task::JoinHandle};
use tokio_postgres::{Client, NoTls, Row, types::ToSql};

use crate::{
    config::{AuditConfig, RegistryConfig},
    error::AuditError,
    metadata::{MetadataProvider, Nullable, RawColumn, RegistryEntry},
};

// Only commented columns survive the join against pg_description. Column
// names are upper-cased so they line up with configured ignore fields.
const DESCRIBE_COLUMNS_SQL: &str = "
    SELECT upper(c.column_name::text),
           c.data_type::text,
           COALESCE(c.character_maximum_length, 0)::int8,
           c.numeric_precision::int8,
           c.numeric_scale::int8,
           CASE c.is_nullable WHEN 'YES' THEN 'Y' ELSE 'N' END,
           d.description
      FROM information_schema.columns c
      JOIN pg_catalog.pg_namespace n ON n.nspname = c.table_schema
      JOIN pg_catalog.pg_class t ON t.relnamespace = n.oid AND t.relname = c.table_name
      JOIN pg_catalog.pg_description d
        ON d.objoid = t.oid
       AND d.classoid = 'pg_catalog.pg_class'::regclass
       AND d.objsubid = c.ordinal_position
     WHERE c.table_schema::text = $1::text
       AND upper(c.table_name::text) = upper($2::text)
     ORDER BY c.ordinal_position";

pub struct PgProvider {
    runtime: Runtime,
    client: Option<Client>,
    connection: Option<JoinHandle<()>>,
    schema: String,
    registry: RegistryConfig,
}

impl PgProvider {
    pub fn connect(database_url: &str, config: &AuditConfig) -> Result<Self, AuditError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AuditError::Connection(format!("starting runtime: {e}")))?;
        let (client, connection) = runtime.block_on(tokio_postgres::connect(database_url, NoTls))?;
        let connection = runtime.spawn(async move {
            if let Err(e) = connection.await {
                error!("Database connection error: {e}");
            }
        });
        info!("Connected to database (schema '{}')", config.schema);
        Ok(Self {
            runtime,
            client: Some(client),
            connection: Some(connection),
            schema: config.schema.clone(),
            registry: config.registry.clone(),
        })
    }

    fn query(
        &self,
        subject: &str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, AuditError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AuditError::Connection("session already closed".to_string()))?;
        debug!("Executing: {}", sql.trim());
        self.runtime
            .block_on(client.query(sql, params))
            .map_err(|e| query_failure(subject, e))
    }

    /// Ends the session and waits for the connection task to finish.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(client) = self.client.take() {
            drop(client);
            if let Some(connection) = self.connection.take() {
                let _ = self.runtime.block_on(connection);
            }
            debug!("Database session closed");
        }
    }
}

impl Drop for PgProvider {
    fn drop(&mut self) {
        self.release();
    }
}

fn query_failure(subject: &str, err: tokio_postgres::Error) -> AuditError {
    if err.is_closed() {
        AuditError::Connection(err.to_string())
    } else {
        AuditError::unavailable(subject, err.to_string())
    }
}

/// Registry query for `schema`. Identifiers are spliced in and must have
/// passed config validation; the excluded category is bound as `$1`. A NULL
/// category never satisfies `<>`, so such rows are not archivable.
fn registry_sql(schema: &str, registry: &RegistryConfig) -> String {
    let RegistryConfig {
        table,
        name_column,
        category_column,
        ..
    } = registry;
    format!(
        "SELECT {name_column}::text, {category_column}::text FROM {schema}.{table} \
         WHERE {category_column}::text <> $1::text ORDER BY 1"
    )
}

fn decode_nullable(table: &str, flag: &str) -> Result<Nullable, AuditError> {
    flag.parse::<Nullable>()
        .map_err(|reason| AuditError::unavailable(table, reason))
}

fn decode_column(table: &str, row: &Row) -> Result<RawColumn, AuditError> {
    let failure = |e| query_failure(table, e);
    let nullable: String = row.try_get(5).map_err(failure)?;
    Ok(RawColumn {
        column_name: row.try_get(0).map_err(failure)?,
        data_type: row.try_get(1).map_err(failure)?,
        data_length: row.try_get(2).map_err(failure)?,
        data_precision: row.try_get(3).map_err(failure)?,
        data_scale: row.try_get(4).map_err(failure)?,
        nullable: decode_nullable(table, &nullable)?,
        comment: row.try_get(6).map_err(failure)?,
    })
}

impl MetadataProvider for PgProvider {
    fn registry(&mut self) -> Result<Vec<RegistryEntry>, AuditError> {
        let sql = registry_sql(&self.schema, &self.registry);
        let excluded = self.registry.excluded_category.as_str();
        let rows = self.query(&self.registry.table, &sql, &[&excluded])?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let failure = |e| query_failure(&self.registry.table, e);
            let name: Option<String> = row.try_get(0).map_err(failure)?;
            let category: Option<String> = row.try_get(1).map_err(failure)?;
            if let Some(table) = name {
                entries.push(RegistryEntry { table, category });
            }
        }
        debug!("Registry lists {} archivable table(s)", entries.len());
        Ok(entries)
    }

    fn raw_columns(&mut self, table: &str) -> Result<Vec<RawColumn>, AuditError> {
        let rows = self.query(table, DESCRIBE_COLUMNS_SQL, &[&self.schema.as_str(), &table])?;
        rows.iter().map(|row| decode_column(table, row)).collect()
    }
}
