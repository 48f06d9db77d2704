//! Postgres-like relational destination adapter (§4.1). Table creation,
//! additive schema evolution, and constraint creation all go through
//! `planner::query::ddl`; writes render a literal multi-row `INSERT` (via
//! `Value`'s SQL-literal `Display` impl) rather than bound parameters, since a
//! batch's fields are heterogeneously typed and must cross several backends
//! with different parameter-binding support.

use crate::contracts::DestinationAdapter;
use crate::error::ConnectorError;
use async_trait::async_trait;
use model::core::data_type::DataType;
use model::operation::table::{
    ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, MappedColumn, UniqueConstraintDescriptor,
};
use model::records::row_batch::RowBatch;
use planner::query::ddl::{add_column_sql, add_foreign_key_sql, add_unique_constraint_sql, create_index_sql, create_table_sql};
use planner::query::dialect::{Dialect, Postgres as PgDialect};
use serde::Deserialize;
use std::collections::BTreeSet;
use tokio_postgres::{Client, NoTls};
use tracing::info;

#[derive(Debug, Deserialize)]
struct PgDestConfig {
    connection_string: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    #[serde(default = "default_schema")]
    schema: String,
}

fn default_schema() -> String {
    "public".to_string()
}

fn build_connection_string(cfg: &PgDestConfig) -> Result<String, ConnectorError> {
    if let Some(conn) = &cfg.connection_string {
        return Ok(conn.clone());
    }
    let host = cfg.host.as_deref().unwrap_or("localhost");
    let port = cfg.port.unwrap_or(5432);
    let user = cfg
        .user
        .as_deref()
        .ok_or_else(|| ConnectorError::Connection("postgres config missing 'user'".into()))?;
    let database = cfg
        .database
        .as_deref()
        .ok_or_else(|| ConnectorError::Connection("postgres config missing 'database'".into()))?;
    let password = cfg.password.as_deref().unwrap_or("");
    Ok(format!(
        "host={host} port={port} user={user} password={password} dbname={database}"
    ))
}

pub struct PostgresDestination {
    client: Option<Client>,
    schema: String,
}

impl PostgresDestination {
    pub fn new() -> Self {
        PostgresDestination {
            client: None,
            schema: default_schema(),
        }
    }

    fn client(&self) -> Result<&Client, ConnectorError> {
        self.client
            .as_ref()
            .ok_or_else(|| ConnectorError::Connection("not connected".into()))
    }
}

impl Default for PostgresDestination {
    fn default() -> Self {
        Self::new()
    }
}

/// Widest string type a destination falls back to for a type it cannot map
/// precisely (§4.1 "Type mapping ... maps unknown types to the destination's
/// widest string type").
const WIDEST_STRING_TYPE: &str = "TEXT";

#[async_trait]
impl DestinationAdapter for PostgresDestination {
    #[tracing::instrument(skip(self, config, _source_type))]
    async fn connect(&mut self, config: serde_json::Value, _source_type: &str) -> Result<(), ConnectorError> {
        if self.client.is_some() {
            return Ok(());
        }
        let cfg: PgDestConfig = serde_json::from_value(config)
            .map_err(|e| ConnectorError::Connection(format!("invalid postgres config: {e}")))?;
        self.schema = cfg.schema.clone();
        let conn_str = build_connection_string(&cfg)?;

        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls)
            .await
            .map_err(|e| ConnectorError::Connection(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(%err, "postgres destination connection task failed");
            }
        });

        client
            .batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.schema))
            .await
            .map_err(|e| ConnectorError::Connection(e.to_string()))?;

        self.client = Some(client);
        info!(schema = %self.schema, "connected to postgres-like destination");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectorError> {
        self.client = None;
        Ok(())
    }

    fn map_types(&self, columns: &[ColumnDescriptor], _source_type: &str) -> Vec<MappedColumn> {
        let dialect = PgDialect;
        columns
            .iter()
            .map(|c| {
                let dest_type = match &c.source_type {
                    DataType::Custom(_) => WIDEST_STRING_TYPE.to_string(),
                    DataType::VarChar | DataType::String | DataType::Char => {
                        dialect.render_data_type(&c.source_type, Some(255))
                    }
                    DataType::Decimal | DataType::NewDecimal => {
                        // Fixed-point precision is preserved by naming NUMERIC
                        // with no length, rather than collapsing to a float.
                        "NUMERIC".to_string()
                    }
                    DataType::Array(_) => "JSONB".to_string(),
                    _ => dialect.render_data_type(&c.source_type, None),
                };
                MappedColumn {
                    name: c.name.clone(),
                    dest_type,
                    nullable: c.nullable,
                    default: c.default.as_deref().and_then(|d| dialect.translate_default(d)),
                }
            })
            .collect()
    }

    async fn create_table(
        &self,
        table: &str,
        columns: &[MappedColumn],
        primary_key: &BTreeSet<String>,
    ) -> Result<(), ConnectorError> {
        let sql = create_table_sql(&PgDialect, table, columns, primary_key);
        self.client()?
            .batch_execute(&sql)
            .await
            .map_err(|e| ConnectorError::Write(e.to_string()))
    }

    async fn existing_columns(&self, table: &str) -> Result<BTreeSet<String>, ConnectorError> {
        let rows = self
            .client()?
            .query(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2",
                &[&self.schema, &table],
            )
            .await
            .map_err(|e| ConnectorError::Schema(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn evolve_schema(&self, table: &str, missing_columns: &[MappedColumn]) -> Result<(), ConnectorError> {
        for column in missing_columns {
            let sql = add_column_sql(&PgDialect, table, column);
            self.client()?
                .batch_execute(&sql)
                .await
                .map_err(|e| ConnectorError::Write(e.to_string()))?;
        }
        Ok(())
    }

    async fn write_data(
        &self,
        table: &str,
        batch: &RowBatch,
        primary_key: &BTreeSet<String>,
    ) -> Result<(), ConnectorError> {
        if batch.is_empty() {
            return Ok(());
        }
        let dialect = PgDialect;
        let columns: Vec<String> = batch.rows[0].field_values.iter().map(|f| f.name.clone()).collect();
        let quoted_columns = columns
            .iter()
            .map(|c| dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        let values_clause = batch
            .rows
            .iter()
            .map(|row| {
                let rendered = columns
                    .iter()
                    .map(|col| row.get_value(col).to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({rendered})")
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "INSERT INTO {} ({quoted_columns}) VALUES {values_clause}",
            dialect.quote_identifier(table)
        );
        if !primary_key.is_empty() {
            let pk: Vec<String> = primary_key.iter().cloned().collect();
            let clause = dialect.upsert_clause(&columns, &pk);
            if !clause.is_empty() {
                sql.push(' ');
                sql.push_str(&clause);
            }
        }

        self.client()?
            .execute(&sql, &[])
            .await
            .map_err(|e| ConnectorError::Write(e.to_string()))?;
        Ok(())
    }

    async fn create_indexes(&self, table: &str, indexes: &[IndexDescriptor]) -> Result<Vec<String>, ConnectorError> {
        let mut failures = Vec::new();
        for index in indexes {
            let sql = create_index_sql(&PgDialect, table, index);
            if let Err(err) = self.client()?.batch_execute(&sql).await {
                tracing::warn!(%err, table, index = %index.name, "failed to create index");
                failures.push(format!("index '{}' on '{table}' failed: {err}", index.name));
            }
        }
        Ok(failures)
    }

    async fn create_unique_constraints(
        &self,
        table: &str,
        constraints: &[UniqueConstraintDescriptor],
    ) -> Result<Vec<String>, ConnectorError> {
        let mut failures = Vec::new();
        for constraint in constraints {
            let sql = add_unique_constraint_sql(&PgDialect, table, constraint);
            if let Err(err) = self.client()?.batch_execute(&sql).await {
                tracing::warn!(%err, table, constraint = %constraint.name, "failed to create unique constraint");
                failures.push(format!("unique constraint '{}' on '{table}' failed: {err}", constraint.name));
            }
        }
        Ok(failures)
    }

    async fn create_foreign_keys(&self, table: &str, foreign_keys: &[ForeignKeyDescriptor]) -> Result<Vec<String>, ConnectorError> {
        let mut failures = Vec::new();
        for fk in foreign_keys {
            let sql = add_foreign_key_sql(&PgDialect, table, fk);
            if let Err(err) = self.client()?.batch_execute(&sql).await {
                tracing::warn!(%err, table, referenced = %fk.referenced_table, "failed to create foreign key");
                failures.push(format!(
                    "foreign key on '{table}' referencing '{}' failed: {err}",
                    fk.referenced_table
                ));
            }
        }
        Ok(failures)
    }

    fn destination_key(&self) -> &'static str {
        "postgres-like"
    }
}
