//! Columnar analytic destination (§4.1): writes go through a literal
//! multi-row `INSERT`, same rendering approach as the relational
//! destinations. Tables are created `ReplacingMergeTree` keyed by the
//! primary key when one exists, plain `MergeTree` otherwise, since the
//! destination has no notion of an upsert.

use crate::contracts::DestinationAdapter;
use crate::error::ConnectorError;
use async_trait::async_trait;
use clickhouse::{Client, Row};
use model::core::data_type::DataType;
use model::operation::table::{
    ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, MappedColumn, UniqueConstraintDescriptor,
};
use model::records::row_batch::RowBatch;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct ColumnarDestConfig {
    url: String,
    database: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Row, Deserialize)]
struct ColumnNameRow {
    name: String,
}

const WIDEST_STRING_TYPE: &str = "String";

fn clickhouse_type(source_type: &DataType) -> &'static str {
    match source_type {
        DataType::Boolean => "UInt8",
        DataType::Short => "Int16",
        DataType::ShortUnsigned => "UInt16",
        DataType::Int | DataType::Int4 | DataType::Year => "Int32",
        DataType::IntUnsigned => "UInt32",
        DataType::Long => "Int64",
        DataType::LongLong => "UInt64",
        DataType::Float => "Float32",
        DataType::Double => "Float64",
        DataType::Decimal | DataType::NewDecimal => "Decimal(38, 10)",
        DataType::Date => "Date",
        DataType::Timestamp => "DateTime",
        DataType::Json => "String",
        DataType::VarChar | DataType::Char | DataType::String | DataType::Enum | DataType::Set => "String",
        DataType::Binary | DataType::VarBinary | DataType::Blob | DataType::TinyBlob | DataType::MediumBlob
        | DataType::LongBlob | DataType::Bytea | DataType::Geometry => "String",
        DataType::Array(_) => "Array(String)",
        DataType::Custom(_) => WIDEST_STRING_TYPE,
        DataType::Null => "Nullable(String)",
        _ => WIDEST_STRING_TYPE,
    }
}

pub struct ColumnarDestination {
    client: Option<Client>,
    database: String,
    table_prefix: String,
}

impl ColumnarDestination {
    pub fn new() -> Self {
        ColumnarDestination {
            client: None,
            database: String::new(),
            table_prefix: String::new(),
        }
    }

    fn client(&self) -> Result<&Client, ConnectorError> {
        self.client
            .as_ref()
            .ok_or_else(|| ConnectorError::Connection("not connected".into()))
    }

    /// Table name as it lives in ClickHouse: prefixed by source family
    /// (§4.1) so several sources can coexist in one database unambiguously.
    fn prefixed(&self, table: &str) -> String {
        format!("{}{}", self.table_prefix, table)
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", self.database, self.prefixed(table))
    }
}

impl Default for ColumnarDestination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DestinationAdapter for ColumnarDestination {
    #[tracing::instrument(skip(self, config, source_type))]
    async fn connect(&mut self, config: serde_json::Value, source_type: &str) -> Result<(), ConnectorError> {
        if self.client.is_some() {
            return Ok(());
        }
        let cfg: ColumnarDestConfig = serde_json::from_value(config)
            .map_err(|e| ConnectorError::Connection(format!("invalid columnar config: {e}")))?;
        self.database = cfg.database.clone();
        self.table_prefix = crate::contracts::table_prefix_for_source(source_type);

        let bootstrap = Client::default().with_url(&cfg.url);
        let bootstrap = match (&cfg.user, &cfg.password) {
            (Some(u), Some(p)) => bootstrap.with_user(u).with_password(p),
            (Some(u), None) => bootstrap.with_user(u),
            _ => bootstrap,
        };
        bootstrap
            .query(&format!("CREATE DATABASE IF NOT EXISTS {}", cfg.database))
            .execute()
            .await?;

        let client = bootstrap.with_database(&cfg.database);
        self.client = Some(client);
        info!(database = %self.database, source = source_type, "connected to columnar destination");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectorError> {
        self.client = None;
        Ok(())
    }

    fn map_types(&self, columns: &[ColumnDescriptor], _source_type: &str) -> Vec<MappedColumn> {
        columns
            .iter()
            .map(|c| {
                let base = clickhouse_type(&c.source_type);
                let dest_type = if c.nullable && !base.starts_with("Nullable") {
                    format!("Nullable({base})")
                } else {
                    base.to_string()
                };
                MappedColumn {
                    name: c.name.clone(),
                    dest_type,
                    nullable: c.nullable,
                    default: None,
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
        let column_defs = columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.dest_type))
            .collect::<Vec<_>>()
            .join(", ");
        let order_by = if primary_key.is_empty() {
            "tuple()".to_string()
        } else {
            primary_key.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        let engine = if primary_key.is_empty() { "MergeTree" } else { "ReplacingMergeTree" };
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({column_defs}) ENGINE = {engine} ORDER BY ({order_by})",
            self.qualified(table)
        );
        self.client()?.query(&sql).execute().await?;
        Ok(())
    }

    async fn existing_columns(&self, table: &str) -> Result<BTreeSet<String>, ConnectorError> {
        let rows = self
            .client()?
            .query("SELECT name FROM system.columns WHERE database = ? AND table = ?")
            .bind(&self.database)
            .bind(self.prefixed(table))
            .fetch_all::<ColumnNameRow>()
            .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn evolve_schema(&self, table: &str, missing_columns: &[MappedColumn]) -> Result<(), ConnectorError> {
        for column in missing_columns {
            let dest_type = if column.nullable && !column.dest_type.starts_with("Nullable") {
                format!("Nullable({})", column.dest_type)
            } else {
                column.dest_type.clone()
            };
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
                self.qualified(table),
                column.name,
                dest_type
            );
            self.client()?.query(&sql).execute().await?;
        }
        Ok(())
    }

    async fn write_data(
        &self,
        table: &str,
        batch: &RowBatch,
        _primary_key: &BTreeSet<String>,
    ) -> Result<(), ConnectorError> {
        if batch.is_empty() {
            return Ok(());
        }
        let columns: Vec<String> = batch.rows[0].field_values.iter().map(|f| f.name.clone()).collect();
        let columns_clause = columns.join(", ");

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

        let sql = format!(
            "INSERT INTO {} ({columns_clause}) VALUES {values_clause}",
            self.qualified(table)
        );
        self.client()?.query(&sql).execute().await?;
        Ok(())
    }

    async fn create_indexes(&self, table: &str, indexes: &[IndexDescriptor]) -> Result<Vec<String>, ConnectorError> {
        let mut failures = Vec::new();
        for index in indexes {
            let cols = index.columns.join(", ");
            let sql = format!(
                "ALTER TABLE {} ADD INDEX IF NOT EXISTS {} ({cols}) TYPE minmax GRANULARITY 4",
                self.qualified(table),
                index.name
            );
            if let Err(err) = self.client()?.query(&sql).execute().await {
                warn!(%err, table, index = %index.name, "failed to create index");
                failures.push(format!("index '{}' on '{table}' failed: {err}", index.name));
            }
        }
        Ok(failures)
    }

    /// The destination has no unique-constraint primitive; relies on
    /// `ReplacingMergeTree` dedup instead (§4.1), so every requested
    /// constraint is reported as a non-fatal capability gap rather than
    /// attempted.
    async fn create_unique_constraints(
        &self,
        table: &str,
        constraints: &[UniqueConstraintDescriptor],
    ) -> Result<Vec<String>, ConnectorError> {
        if constraints.is_empty() {
            return Ok(Vec::new());
        }
        warn!(
            table,
            count = constraints.len(),
            "columnar destination cannot enforce uniqueness constraints, relying on ReplacingMergeTree dedup"
        );
        Ok(constraints
            .iter()
            .map(|c| {
                format!(
                    "unique constraint '{}' on '{table}' not enforced: columnar destination has no uniqueness primitive",
                    c.name
                )
            })
            .collect())
    }

    async fn create_foreign_keys(&self, table: &str, foreign_keys: &[ForeignKeyDescriptor]) -> Result<Vec<String>, ConnectorError> {
        if foreign_keys.is_empty() {
            return Ok(Vec::new());
        }
        warn!(
            table,
            count = foreign_keys.len(),
            "columnar destination has no foreign key enforcement, skipping"
        );
        Ok(foreign_keys
            .iter()
            .map(|fk| {
                format!(
                    "foreign key on '{table}' referencing '{}' not enforced: columnar destination has no foreign key support",
                    fk.referenced_table
                )
            })
            .collect())
    }

    fn destination_key(&self) -> &'static str {
        "columnar"
    }
}
