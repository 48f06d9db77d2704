//! MySQL-like relational destination adapter (§4.1). Same literal-`VALUES`
//! write strategy as `PostgresDestination`, against the `MySql` dialect.

use crate::contracts::DestinationAdapter;
use crate::error::ConnectorError;
use async_trait::async_trait;
use model::core::data_type::DataType;
use model::operation::table::{
    ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, MappedColumn, UniqueConstraintDescriptor,
};
use model::records::row_batch::RowBatch;
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool};
use planner::query::ddl::{add_column_sql, add_foreign_key_sql, add_unique_constraint_sql, create_index_sql, create_table_sql};
use planner::query::dialect::{Dialect, MySql as MySqlDialect};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Deserialize)]
struct MySqlDestConfig {
    connection_string: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    database: String,
}

fn build_opts(cfg: &MySqlDestConfig) -> Result<Opts, ConnectorError> {
    if let Some(conn) = &cfg.connection_string {
        return Opts::from_url(conn).map_err(|e| ConnectorError::Connection(e.to_string()));
    }
    let builder = OptsBuilder::default()
        .ip_or_hostname(cfg.host.clone().unwrap_or_else(|| "localhost".to_string()))
        .tcp_port(cfg.port.unwrap_or(3306))
        .user(cfg.user.clone())
        .pass(cfg.password.clone())
        .db_name(Some(cfg.database.clone()));
    Ok(Opts::from(builder))
}

pub struct MySqlDestination {
    pool: Option<Pool>,
    database: String,
}

impl MySqlDestination {
    pub fn new() -> Self {
        MySqlDestination {
            pool: None,
            database: String::new(),
        }
    }

    fn pool(&self) -> Result<&Pool, ConnectorError> {
        self.pool
            .as_ref()
            .ok_or_else(|| ConnectorError::Connection("not connected".into()))
    }
}

impl Default for MySqlDestination {
    fn default() -> Self {
        Self::new()
    }
}

const WIDEST_STRING_TYPE: &str = "TEXT";

#[async_trait]
impl DestinationAdapter for MySqlDestination {
    #[tracing::instrument(skip(self, config, _source_type))]
    async fn connect(&mut self, config: serde_json::Value, _source_type: &str) -> Result<(), ConnectorError> {
        if self.pool.is_some() {
            return Ok(());
        }
        let cfg: MySqlDestConfig = serde_json::from_value(config)
            .map_err(|e| ConnectorError::Connection(format!("invalid mysql config: {e}")))?;
        self.database = cfg.database.clone();
        let opts = build_opts(&cfg)?;
        let pool = Pool::new(opts);
        let _conn = pool
            .get_conn()
            .await
            .map_err(|e| ConnectorError::Connection(e.to_string()))?;
        self.pool = Some(pool);
        info!(database = %self.database, "connected to mysql-like destination");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectorError> {
        if let Some(pool) = self.pool.take() {
            pool.disconnect()
                .await
                .map_err(|e| ConnectorError::Connection(e.to_string()))?;
        }
        Ok(())
    }

    fn map_types(&self, columns: &[ColumnDescriptor], _source_type: &str) -> Vec<MappedColumn> {
        let dialect = MySqlDialect;
        columns
            .iter()
            .map(|c| {
                let dest_type = match &c.source_type {
                    DataType::Custom(_) => WIDEST_STRING_TYPE.to_string(),
                    DataType::VarChar | DataType::String | DataType::Char => {
                        dialect.render_data_type(&c.source_type, Some(255))
                    }
                    DataType::Decimal | DataType::NewDecimal => "DECIMAL(65,10)".to_string(),
                    DataType::Array(_) => "JSON".to_string(),
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
        let sql = create_table_sql(&MySqlDialect, table, columns, primary_key);
        self.pool()?
            .get_conn()
            .await
            .map_err(|e| ConnectorError::Write(e.to_string()))?
            .query_drop(sql)
            .await
            .map_err(|e| ConnectorError::Write(e.to_string()))
    }

    async fn existing_columns(&self, table: &str) -> Result<BTreeSet<String>, ConnectorError> {
        let mut conn = self
            .pool()?
            .get_conn()
            .await
            .map_err(|e| ConnectorError::Connection(e.to_string()))?;
        let cols: Vec<String> = conn
            .exec(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ?",
                (&self.database, table),
            )
            .await
            .map_err(|e| ConnectorError::Schema(e.to_string()))?;
        Ok(cols.into_iter().collect())
    }

    async fn evolve_schema(&self, table: &str, missing_columns: &[MappedColumn]) -> Result<(), ConnectorError> {
        let mut conn = self
            .pool()?
            .get_conn()
            .await
            .map_err(|e| ConnectorError::Connection(e.to_string()))?;
        for column in missing_columns {
            let sql = add_column_sql(&MySqlDialect, table, column);
            conn.query_drop(sql)
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
        let dialect = MySqlDialect;
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

        self.pool()?
            .get_conn()
            .await
            .map_err(|e| ConnectorError::Write(e.to_string()))?
            .query_drop(sql)
            .await
            .map_err(|e| ConnectorError::Write(e.to_string()))
    }

    async fn create_indexes(&self, table: &str, indexes: &[IndexDescriptor]) -> Result<Vec<String>, ConnectorError> {
        let mut conn = self
            .pool()?
            .get_conn()
            .await
            .map_err(|e| ConnectorError::Connection(e.to_string()))?;
        let mut failures = Vec::new();
        for index in indexes {
            let sql = create_index_sql(&MySqlDialect, table, index);
            if let Err(err) = conn.query_drop(sql).await {
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
        let mut conn = self
            .pool()?
            .get_conn()
            .await
            .map_err(|e| ConnectorError::Connection(e.to_string()))?;
        let mut failures = Vec::new();
        for constraint in constraints {
            let sql = add_unique_constraint_sql(&MySqlDialect, table, constraint);
            if let Err(err) = conn.query_drop(sql).await {
                tracing::warn!(%err, table, constraint = %constraint.name, "failed to create unique constraint");
                failures.push(format!("unique constraint '{}' on '{table}' failed: {err}", constraint.name));
            }
        }
        Ok(failures)
    }

    async fn create_foreign_keys(&self, table: &str, foreign_keys: &[ForeignKeyDescriptor]) -> Result<Vec<String>, ConnectorError> {
        let mut conn = self
            .pool()?
            .get_conn()
            .await
            .map_err(|e| ConnectorError::Connection(e.to_string()))?;
        let mut failures = Vec::new();
        for fk in foreign_keys {
            let sql = add_foreign_key_sql(&MySqlDialect, table, fk);
            if let Err(err) = conn.query_drop(sql).await {
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
        "mysql-like"
    }
}
