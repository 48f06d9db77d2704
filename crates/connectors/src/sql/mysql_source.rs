//! MySQL-like relational source adapter (§4.1). Mirrors `PostgresSource`'s
//! shape; differs in its driver (`mysql_async`) and its `information_schema`
//! column/constraint queries.

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
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Deserialize)]
struct MySqlConfig {
    connection_string: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    database: String,
}

fn build_opts(cfg: &MySqlConfig) -> Result<Opts, ConnectorError> {
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

pub struct MySqlSource {
    pool: Option<Pool>,
    database: String,
    retry: NetworkRetryPolicy,
}

impl MySqlSource {
    pub fn new() -> Self {
        MySqlSource {
            pool: None,
            database: String::new(),
            retry: NetworkRetryPolicy::default(),
        }
    }

    fn pool(&self) -> Result<&Pool, ConnectorError> {
        self.pool
            .as_ref()
            .ok_or_else(|| ConnectorError::Connection("not connected".into()))
    }
}

impl Default for MySqlSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for MySqlSource {
    #[tracing::instrument(skip(self, config))]
    async fn connect(&mut self, config: serde_json::Value) -> Result<(), ConnectorError> {
        if self.pool.is_some() {
            return Ok(());
        }
        let cfg: MySqlConfig = serde_json::from_value(config)
            .map_err(|e| ConnectorError::Connection(format!("invalid mysql config: {e}")))?;
        self.database = cfg.database.clone();
        let opts = build_opts(&cfg)?;

        let pool = self
            .retry
            .run("mysql connect", || {
                let opts = opts.clone();
                async move {
                    let pool = Pool::new(opts);
                    // Verify the pool can actually hand out a connection.
                    let _conn = pool
                        .get_conn()
                        .await
                        .map_err(|e| ConnectorError::Connection(e.to_string()))?;
                    Ok::<_, ConnectorError>(pool)
                }
            })
            .await?;

        self.pool = Some(pool);
        info!(database = %self.database, "connected to mysql-like source");
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

    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError> {
        let mut conn = self
            .pool()?
            .get_conn()
            .await
            .map_err(|e| ConnectorError::Connection(e.to_string()))?;
        let tables: Vec<String> = conn
            .exec(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = ? AND table_type = 'BASE TABLE' ORDER BY table_name",
                (&self.database,),
            )
            .await
            .map_err(|e| ConnectorError::Schema(e.to_string()))?;
        Ok(tables)
    }

    async fn get_schema(&self, table: &str) -> Result<TableDescriptor, ConnectorError> {
        let mut conn = self
            .pool()?
            .get_conn()
            .await
            .map_err(|e| ConnectorError::Connection(e.to_string()))?;

        let rows: Vec<(String, String, String, Option<String>)> = conn
            .exec(
                "SELECT column_name, data_type, is_nullable, column_default \
                 FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
                (&self.database, table),
            )
            .await
            .map_err(|e| ConnectorError::Schema(e.to_string()))?;

        let columns: Vec<ColumnDescriptor> = rows
            .into_iter()
            .map(|(name, type_name, nullable, default)| ColumnDescriptor {
                name,
                source_type: DataType::from_mysql_type(&type_name).unwrap_or(DataType::Custom(type_name)),
                nullable: nullable == "YES",
                default,
            })
            .collect();

        let mut desc = TableDescriptor::new(table, columns);

        match conn
            .exec::<String, _, _>(
                "SELECT column_name FROM information_schema.key_column_usage \
                 WHERE table_schema = ? AND table_name = ? AND constraint_name = 'PRIMARY'",
                (&self.database, table),
            )
            .await
        {
            Ok(cols) => desc.primary_key = cols.into_iter().collect::<BTreeSet<_>>(),
            Err(err) => tracing::warn!(%err, table, "failed to read primary key, leaving empty"),
        }

        match conn
            .exec::<(String, String, String), _, _>(
                "SELECT column_name, referenced_table_name, referenced_column_name \
                 FROM information_schema.key_column_usage \
                 WHERE table_schema = ? AND table_name = ? AND referenced_table_name IS NOT NULL",
                (&self.database, table),
            )
            .await
        {
            Ok(rows) => {
                desc.foreign_keys = rows
                    .into_iter()
                    .map(|(col, ref_table, ref_col)| ForeignKeyDescriptor {
                        columns: vec![col],
                        referenced_table: ref_table,
                        referenced_columns: vec![ref_col],
                    })
                    .collect();
            }
            Err(err) => tracing::warn!(%err, table, "failed to read foreign keys, leaving empty"),
        }

        match conn
            .exec::<(String, String), _, _>(
                "SELECT index_name, column_name FROM information_schema.statistics \
                 WHERE table_schema = ? AND table_name = ? AND non_unique = 0 AND index_name <> 'PRIMARY' \
                 ORDER BY index_name, seq_in_index",
                (&self.database, table),
            )
            .await
        {
            Ok(rows) => {
                let mut grouped: std::collections::BTreeMap<String, Vec<String>> = Default::default();
                for (name, col) in rows {
                    grouped.entry(name).or_default().push(col);
                }
                desc.unique_constraints = grouped
                    .into_iter()
                    .map(|(name, columns)| UniqueConstraintDescriptor { name, columns })
                    .collect();
            }
            Err(err) => tracing::warn!(%err, table, "failed to read unique constraints, leaving empty"),
        }

        match conn
            .exec::<(String, String), _, _>(
                "SELECT index_name, column_name FROM information_schema.statistics \
                 WHERE table_schema = ? AND table_name = ? AND non_unique = 1 \
                 ORDER BY index_name, seq_in_index",
                (&self.database, table),
            )
            .await
        {
            Ok(rows) => {
                let mut grouped: std::collections::BTreeMap<String, Vec<String>> = Default::default();
                for (name, col) in rows {
                    grouped.entry(name).or_default().push(col);
                }
                desc.indexes = grouped
                    .into_iter()
                    .map(|(name, columns)| IndexDescriptor { name, columns })
                    .collect();
            }
            Err(err) => tracing::warn!(%err, table, "failed to read indexes, leaving empty"),
        }

        Ok(desc)
    }

    async fn read_data(&self, table: &str, batch_size: usize) -> Result<BoxedRowStream, ConnectorError> {
        let schema = self.get_schema(table).await?;
        Ok(Box::new(MySqlRowStream::new(
            self.pool()?.clone(),
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
        let watermark = schema
            .columns
            .iter()
            .find(|c| matches!(c.source_type, DataType::Timestamp))
            .map(|c| c.name.clone());
        Ok(Box::new(MySqlRowStream::new(
            self.pool()?.clone(),
            table.to_string(),
            schema.columns,
            batch_size,
            watermark.map(|col| (col, since)),
        )))
    }

    fn source_key(&self) -> &'static str {
        "mysql-like"
    }

    fn preferred_batch_size(&self) -> usize {
        1000
    }
}

struct MySqlRowStream {
    pool: Pool,
    table: String,
    columns: Vec<ColumnDescriptor>,
    batch_size: usize,
    offset: usize,
    since: Option<(String, DateTime<Utc>)>,
    done: bool,
}

impl MySqlRowStream {
    fn new(
        pool: Pool,
        table: String,
        columns: Vec<ColumnDescriptor>,
        batch_size: usize,
        since: Option<(String, DateTime<Utc>)>,
    ) -> Self {
        MySqlRowStream {
            pool,
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
impl RowBatchStream for MySqlRowStream {
    async fn next_batch(&mut self) -> Result<Option<RowBatch>, ConnectorError> {
        if self.done {
            return Ok(None);
        }

        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| ConnectorError::Read(e.to_string()))?;

        let column_order: Vec<(String, DataType)> = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.source_type.clone()))
            .collect();
        let select_list = column_order
            .iter()
            .map(|(name, _)| format!("`{name}`"))
            .collect::<Vec<_>>()
            .join(", ");

        let rows: Vec<mysql_async::Row> = if let Some((watermark_col, since)) = &self.since {
            let sql = format!(
                "SELECT {select_list} FROM `{table}` WHERE `{watermark_col}` > :since \
                 ORDER BY `{watermark_col}` LIMIT {limit} OFFSET {offset}",
                table = self.table,
                limit = self.batch_size,
                offset = self.offset,
            );
            conn.exec(&sql, mysql_async::params! { "since" => since.naive_utc() })
                .await
                .map_err(|e| ConnectorError::Read(e.to_string()))?
        } else {
            let order_col = &column_order[0].0;
            let sql = format!(
                "SELECT {select_list} FROM `{table}` ORDER BY `{order_col}` LIMIT {limit} OFFSET {offset}",
                table = self.table,
                limit = self.batch_size,
                offset = self.offset,
            );
            conn.query(&sql)
                .await
                .map_err(|e| ConnectorError::Read(e.to_string()))?
        };

        let fetched = rows.len();
        self.offset += fetched;
        self.done = fetched < self.batch_size;

        let rows: Vec<RowData> = rows
            .iter()
            .map(|row| DbRow::MySql(row).to_row_data(&self.table, &column_order))
            .collect();

        Ok(Some(RowBatch {
            rows,
            next_cursor: model::pagination::cursor::Cursor::Default { offset: self.offset },
            reached_end: self.done,
        }))
    }
}
