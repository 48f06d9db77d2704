//! Postgres-like relational source adapter (§4.1). Schema is introspected
//! from `information_schema`/`pg_catalog`; full and incremental reads are
//! both driven by `LIMIT`/`OFFSET` pagination over a stable `ORDER BY`.

use crate::contracts::{BoxedRowStream, RowBatchStream, SourceAdapter};
use crate::error::ConnectorError;
use crate::retry::NetworkRetryPolicy;
use crate::sql::row::DbRow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::core::data_type::DataType;
use model::operation::table::{ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, TableDescriptor, UniqueConstraintDescriptor};
use model::records::row::RowData;
use model::records::row_batch::RowBatch;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::{Client, NoTls};
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
struct PgConfig {
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

fn build_connection_string(cfg: &PgConfig) -> Result<String, ConnectorError> {
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

pub struct PostgresSource {
    client: Option<Arc<Client>>,
    schema: String,
    retry: NetworkRetryPolicy,
}

impl PostgresSource {
    pub fn new() -> Self {
        PostgresSource {
            client: None,
            schema: default_schema(),
            retry: NetworkRetryPolicy::default(),
        }
    }

    fn client(&self) -> Result<&Arc<Client>, ConnectorError> {
        self.client
            .as_ref()
            .ok_or_else(|| ConnectorError::Connection("not connected".into()))
    }
}

impl Default for PostgresSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for PostgresSource {
    #[tracing::instrument(skip(self, config))]
    async fn connect(&mut self, config: serde_json::Value) -> Result<(), ConnectorError> {
        if self.client.is_some() {
            return Ok(());
        }
        let cfg: PgConfig = serde_json::from_value(config)
            .map_err(|e| ConnectorError::Connection(format!("invalid postgres config: {e}")))?;
        self.schema = cfg.schema.clone();
        let conn_str = build_connection_string(&cfg)?;

        let client = self
            .retry
            .run("postgres connect", || {
                let conn_str = conn_str.clone();
                async move {
                    let (client, connection) = tokio_postgres::connect(&conn_str, NoTls)
                        .await
                        .map_err(|e| ConnectorError::Connection(e.to_string()))?;
                    tokio::spawn(async move {
                        if let Err(err) = connection.await {
                            tracing::error!(%err, "postgres connection task failed");
                        }
                    });
                    Ok::<_, ConnectorError>(client)
                }
            })
            .await?;

        self.client = Some(Arc::new(client));
        info!(schema = %self.schema, "connected to postgres-like source");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectorError> {
        self.client = None;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError> {
        let client = self.client()?;
        let rows = client
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name",
                &[&self.schema],
            )
            .await
            .map_err(|e| ConnectorError::Schema(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn get_schema(&self, table: &str) -> Result<TableDescriptor, ConnectorError> {
        let client = self.client()?;

        let column_rows = client
            .query(
                "SELECT column_name, data_type, is_nullable, column_default \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
                &[&self.schema, &table],
            )
            .await
            .map_err(|e| ConnectorError::Schema(e.to_string()))?;

        let columns: Vec<ColumnDescriptor> = column_rows
            .iter()
            .map(|row| {
                let name: String = row.get("column_name");
                let type_name: String = row.get("data_type");
                let nullable: String = row.get("is_nullable");
                let default: Option<String> = row.get("column_default");
                ColumnDescriptor {
                    name,
                    source_type: DataType::from_postgres_type(&type_name)
                        .unwrap_or(DataType::Custom(type_name)),
                    nullable: nullable == "YES",
                    default,
                }
            })
            .collect();

        let mut desc = TableDescriptor::new(table, columns);

        // Primary key (non-fatal: errors here are logged, not propagated, §4.1).
        match client
            .query(
                "SELECT kcu.column_name FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                 WHERE tc.table_schema = $1 AND tc.table_name = $2 AND tc.constraint_type = 'PRIMARY KEY'",
                &[&self.schema, &table],
            )
            .await
        {
            Ok(rows) => {
                desc.primary_key = rows.iter().map(|r| r.get::<_, String>(0)).collect::<BTreeSet<_>>();
            }
            Err(err) => tracing::warn!(%err, table, "failed to read primary key, leaving empty"),
        }

        // Foreign keys.
        match client
            .query(
                "SELECT kcu.column_name, ccu.table_name AS ref_table, ccu.column_name AS ref_column \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu ON tc.constraint_name = kcu.constraint_name \
                 JOIN information_schema.constraint_column_usage ccu ON tc.constraint_name = ccu.constraint_name \
                 WHERE tc.table_schema = $1 AND tc.table_name = $2 AND tc.constraint_type = 'FOREIGN KEY'",
                &[&self.schema, &table],
            )
            .await
        {
            Ok(rows) => {
                desc.foreign_keys = rows
                    .iter()
                    .map(|r| ForeignKeyDescriptor {
                        columns: vec![r.get::<_, String>(0)],
                        referenced_table: r.get::<_, String>(1),
                        referenced_columns: vec![r.get::<_, String>(2)],
                    })
                    .collect();
            }
            Err(err) => tracing::warn!(%err, table, "failed to read foreign keys, leaving empty"),
        }

        // Unique constraints.
        match client
            .query(
                "SELECT tc.constraint_name, kcu.column_name \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu ON tc.constraint_name = kcu.constraint_name \
                 WHERE tc.table_schema = $1 AND tc.table_name = $2 AND tc.constraint_type = 'UNIQUE' \
                 ORDER BY tc.constraint_name",
                &[&self.schema, &table],
            )
            .await
        {
            Ok(rows) => {
                let mut grouped: std::collections::BTreeMap<String, Vec<String>> = Default::default();
                for row in rows {
                    let name: String = row.get(0);
                    let col: String = row.get(1);
                    grouped.entry(name).or_default().push(col);
                }
                desc.unique_constraints = grouped
                    .into_iter()
                    .map(|(name, columns)| UniqueConstraintDescriptor { name, columns })
                    .collect();
            }
            Err(err) => tracing::warn!(%err, table, "failed to read unique constraints, leaving empty"),
        }

        // Indexes (excluding those already backing the primary key).
        match client
            .query(
                "SELECT indexname, indexdef FROM pg_indexes WHERE schemaname = $1 AND tablename = $2",
                &[&self.schema, &table],
            )
            .await
        {
            Ok(rows) => {
                desc.indexes = rows
                    .iter()
                    .filter_map(|r| {
                        let name: String = r.get(0);
                        if name.ends_with("_pkey") {
                            return None;
                        }
                        Some(IndexDescriptor {
                            name,
                            columns: Vec::new(),
                        })
                    })
                    .collect();
            }
            Err(err) => tracing::warn!(%err, table, "failed to read indexes, leaving empty"),
        }

        Ok(desc)
    }

    async fn read_data(&self, table: &str, batch_size: usize) -> Result<BoxedRowStream, ConnectorError> {
        let schema = self.get_schema(table).await?;
        Ok(Box::new(PgRowStream::new(
            self.client()?.clone(),
            self.schema.clone(),
            table.to_string(),
            schema.columns,
            batch_size,
            None,
        )))
    }

    async fn read_incremental(
        &self,
        table: &str,
        since: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<BoxedRowStream, ConnectorError> {
        let schema = self.get_schema(table).await?;
        let watermark = watermark_column(&schema);
        Ok(Box::new(PgRowStream::new(
            self.client()?.clone(),
            self.schema.clone(),
            table.to_string(),
            schema.columns,
            batch_size,
            watermark.map(|col| (col, since)),
        )))
    }

    fn source_key(&self) -> &'static str {
        "postgres-like"
    }

    fn preferred_batch_size(&self) -> usize {
        1000
    }

    fn logs_every_batch(&self) -> bool {
        false
    }
}

/// Picks the change-tracking column for incremental reads: prefers an
/// `updated_at`/`modified_at`-style timestamp column over the primary key.
fn watermark_column(desc: &TableDescriptor) -> Option<String> {
    desc.columns
        .iter()
        .find(|c| matches!(c.source_type, DataType::Timestamp) && (c.name.contains("updated") || c.name.contains("modified")))
        .or_else(|| desc.columns.iter().find(|c| matches!(c.source_type, DataType::Timestamp)))
        .map(|c| c.name.clone())
}

struct PgRowStream {
    client: Arc<Client>,
    schema: String,
    table: String,
    columns: Vec<ColumnDescriptor>,
    batch_size: usize,
    offset: usize,
    since: Option<(String, DateTime<Utc>)>,
    done: bool,
}

impl PgRowStream {
    fn new(
        client: Arc<Client>,
        schema: String,
        table: String,
        columns: Vec<ColumnDescriptor>,
        batch_size: usize,
        since: Option<(String, DateTime<Utc>)>,
    ) -> Self {
        PgRowStream {
            client,
            schema,
            table,
            columns,
            batch_size,
            offset: 0,
            since,
            done: false,
        }
    }
}

#[async_trait]
impl RowBatchStream for PgRowStream {
    async fn next_batch(&mut self) -> Result<Option<RowBatch>, ConnectorError> {
        if self.done {
            return Ok(None);
        }

        let qualified = format!("{}.{}", self.schema, self.table);
        let column_order: Vec<(String, DataType)> = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.source_type.clone()))
            .collect();
        let select_list = column_order
            .iter()
            .map(|(name, _)| format!("\"{name}\""))
            .collect::<Vec<_>>()
            .join(", ");

        let rows = if let Some((watermark_col, since)) = &self.since {
            let sql = format!(
                "SELECT {select_list} FROM {qualified} WHERE \"{watermark_col}\" > $1 \
                 ORDER BY \"{watermark_col}\" LIMIT {limit} OFFSET {offset}",
                limit = self.batch_size,
                offset = self.offset,
            );
            self.client
                .query(&sql, &[since])
                .await
                .map_err(|e| ConnectorError::Read(e.to_string()))?
        } else {
            let order_col = &column_order[0].0;
            let sql = format!(
                "SELECT {select_list} FROM {qualified} ORDER BY \"{order_col}\" LIMIT {limit} OFFSET {offset}",
                limit = self.batch_size,
                offset = self.offset,
            );
            self.client
                .query(&sql, &[])
                .await
                .map_err(|e| ConnectorError::Read(e.to_string()))?
        };

        let fetched = rows.len();
        self.offset += fetched;
        self.done = fetched < self.batch_size;

        let rows: Vec<RowData> = rows
            .iter()
            .map(|row| DbRow::Postgres(row).to_row_data(&self.table, &column_order))
            .collect();

        Ok(Some(RowBatch {
            rows,
            next_cursor: model::pagination::cursor::Cursor::Default { offset: self.offset },
            reached_end: self.done,
        }))
    }
}
