//! SQL Server-like relational source adapter (§4.1). Tables are listed
//! across every non-system schema and qualified as `schema.table`, since SQL
//! Server databases commonly spread user tables across several schemas. The
//! single `tiberius` connection is shared behind a mutex so both the adapter
//! and its row streams can drive it with `&self`/`&mut self` respectively.

use crate::contracts::{BoxedRowStream, RowBatchStream, SourceAdapter};
use crate::error::ConnectorError;
use crate::retry::NetworkRetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use model::core::data_type::DataType;
use model::core::value::{FieldValue, Value};
use model::operation::table::{ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, TableDescriptor, UniqueConstraintDescriptor};
use model::records::row::RowData;
use model::records::row_batch::RowBatch;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tiberius::{Client, Config, Query, QueryItem};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::info;

type MsSqlClient = Client<Compat<TcpStream>>;
type SharedClient = Arc<Mutex<MsSqlClient>>;

#[derive(Debug, Deserialize)]
struct MsSqlConfig {
    host: Option<String>,
    port: Option<u16>,
    instance_name: Option<String>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    #[serde(default)]
    trust_cert: bool,
    /// Windows/trusted auth against the named instance instead of a SQL login.
    #[serde(default)]
    windows_auth: bool,
}

fn build_config(cfg: &MsSqlConfig) -> Result<Config, ConnectorError> {
    let mut config = Config::new();
    config.host(cfg.host.as_deref().unwrap_or("localhost"));
    config.port(cfg.port.unwrap_or(1433));
    if let Some(instance) = &cfg.instance_name {
        config.instance_name(instance);
    }
    if let Some(database) = &cfg.database {
        config.database(database);
    }
    if cfg.windows_auth {
        config.authentication(tiberius::AuthMethod::Integrated);
    } else {
        let user = cfg
            .user
            .as_deref()
            .ok_or_else(|| ConnectorError::Connection("sqlserver config missing 'user'".into()))?;
        let password = cfg.password.as_deref().unwrap_or("");
        config.authentication(tiberius::AuthMethod::sql_server(user, password));
    }
    if cfg.trust_cert {
        config.trust_cert();
    }
    Ok(config)
}

async fn connect_once(config: Config) -> Result<MsSqlClient, ConnectorError> {
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| ConnectorError::Connection(e.to_string()))?;
    tcp.set_nodelay(true).ok();
    Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| ConnectorError::Connection(e.to_string()))
}

pub struct MsSqlSource {
    client: Option<SharedClient>,
    retry: NetworkRetryPolicy,
}

impl MsSqlSource {
    pub fn new() -> Self {
        MsSqlSource {
            client: None,
            retry: NetworkRetryPolicy::default(),
        }
    }

    fn client(&self) -> Result<SharedClient, ConnectorError> {
        self.client
            .clone()
            .ok_or_else(|| ConnectorError::Connection("not connected".into()))
    }
}

impl Default for MsSqlSource {
    fn default() -> Self {
        Self::new()
    }
}

fn split_qualified(table: &str) -> (String, String) {
    match table.split_once('.') {
        Some((schema, name)) => (schema.to_string(), name.to_string()),
        None => ("dbo".to_string(), table.to_string()),
    }
}

#[async_trait]
impl SourceAdapter for MsSqlSource {
    #[tracing::instrument(skip(self, config))]
    async fn connect(&mut self, config: serde_json::Value) -> Result<(), ConnectorError> {
        if self.client.is_some() {
            return Ok(());
        }
        let cfg: MsSqlConfig = serde_json::from_value(config)
            .map_err(|e| ConnectorError::Connection(format!("invalid sqlserver config: {e}")))?;
        let tiberius_config = build_config(&cfg)?;

        let client = self
            .retry
            .run("sqlserver connect", || {
                let tiberius_config = tiberius_config.clone();
                async move { connect_once(tiberius_config).await }
            })
            .await?;

        self.client = Some(Arc::new(Mutex::new(client)));
        info!("connected to sqlserver-like source");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectorError> {
        self.client = None;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError> {
        let client = self.client()?;
        let mut client = client.lock().await;
        let query = Query::new(
            "SELECT s.name, t.name FROM sys.tables t \
             JOIN sys.schemas s ON t.schema_id = s.schema_id \
             WHERE s.name NOT IN ('sys', 'INFORMATION_SCHEMA') \
             ORDER BY s.name, t.name",
        );
        let mut stream = query
            .query(&mut *client)
            .await
            .map_err(|e| ConnectorError::Schema(e.to_string()))?;

        let mut tables = Vec::new();
        while let Some(item) = stream
            .try_next()
            .await
            .map_err(|e| ConnectorError::Schema(e.to_string()))?
        {
            if let QueryItem::Row(row) = item {
                let schema: &str = row.get(0).unwrap_or("dbo");
                let table: &str = row.get(1).unwrap_or_default();
                tables.push(format!("{schema}.{table}"));
            }
        }
        Ok(tables)
    }

    async fn get_schema(&self, table: &str) -> Result<TableDescriptor, ConnectorError> {
        let (schema, table_name) = split_qualified(table);
        let client = self.client()?;
        let mut client = client.lock().await;

        let mut query = Query::new(
            "SELECT column_name, data_type, is_nullable \
             FROM information_schema.columns \
             WHERE table_schema = @P1 AND table_name = @P2 ORDER BY ordinal_position",
        );
        query.bind(schema.clone());
        query.bind(table_name.clone());
        let mut stream = query
            .query(&mut *client)
            .await
            .map_err(|e| ConnectorError::Schema(e.to_string()))?;

        let mut columns = Vec::new();
        while let Some(item) = stream
            .try_next()
            .await
            .map_err(|e| ConnectorError::Schema(e.to_string()))?
        {
            if let QueryItem::Row(row) = item {
                let name: &str = row.get(0).unwrap_or_default();
                let type_name: &str = row.get(1).unwrap_or_default();
                let nullable: &str = row.get(2).unwrap_or("YES");
                columns.push(ColumnDescriptor {
                    name: name.to_string(),
                    source_type: DataType::from_mysql_type(type_name).unwrap_or(DataType::Custom(type_name.to_string())),
                    nullable: nullable == "YES",
                    default: None,
                });
            }
        }

        // Primary key, foreign keys, unique constraints, and indexes are left
        // empty: tiberius has no information_schema view for constraints as
        // uniform as Postgres'/MySQL's, so this would routinely fail rather
        // than exceptionally (§4.1 non-fatal introspection).
        Ok(TableDescriptor {
            name: table.to_string(),
            columns,
            primary_key: BTreeSet::new(),
            foreign_keys: Vec::<ForeignKeyDescriptor>::new(),
            unique_constraints: Vec::<UniqueConstraintDescriptor>::new(),
            indexes: Vec::<IndexDescriptor>::new(),
        })
    }

    async fn read_data(&self, table: &str, batch_size: usize) -> Result<BoxedRowStream, ConnectorError> {
        let schema = self.get_schema(table).await?;
        Ok(Box::new(MsSqlRowStream {
            client: self.client()?,
            table: table.to_string(),
            columns: schema.columns,
            batch_size,
            offset: 0,
            since: None,
            done: false,
        }))
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
        Ok(Box::new(MsSqlRowStream {
            client: self.client()?,
            table: table.to_string(),
            columns: schema.columns,
            batch_size,
            offset: 0,
            since: watermark.map(|col| (col, since)),
            done: false,
        }))
    }

    fn source_key(&self) -> &'static str {
        "sqlserver-like"
    }

    fn preferred_batch_size(&self) -> usize {
        1000
    }
}

struct MsSqlRowStream {
    client: SharedClient,
    table: String,
    columns: Vec<ColumnDescriptor>,
    batch_size: usize,
    offset: usize,
    since: Option<(String, DateTime<Utc>)>,
    done: bool,
}

fn value_from_row(row: &tiberius::Row, idx: usize, data_type: &DataType) -> Option<Value> {
    match data_type {
        DataType::Int | DataType::Long | DataType::Short | DataType::LongLong | DataType::IntUnsigned => {
            row.get::<i64, _>(idx).map(Value::Int).or_else(|| row.get::<i32, _>(idx).map(|v| Value::Int(v as i64)))
        }
        DataType::Float | DataType::Double => row.get::<f64, _>(idx).map(Value::Float),
        DataType::Boolean => row.get::<bool, _>(idx).map(Value::Boolean),
        DataType::Timestamp => row
            .get::<chrono::NaiveDateTime, _>(idx)
            .map(|naive| Value::Timestamp(chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(naive, chrono::Utc))),
        DataType::Date => row.get::<chrono::NaiveDate, _>(idx).map(Value::Date),
        _ => row.get::<&str, _>(idx).map(|s| Value::String(s.to_string())),
    }
}

#[async_trait]
impl RowBatchStream for MsSqlRowStream {
    async fn next_batch(&mut self) -> Result<Option<RowBatch>, ConnectorError> {
        if self.done {
            return Ok(None);
        }

        let (schema, table_name) = split_qualified(&self.table);
        let qualified = format!("[{schema}].[{table_name}]");
        let select_list = self
            .columns
            .iter()
            .map(|c| format!("[{}]", c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut client = self.client.lock().await;

        let sql = if let Some((watermark_col, _since)) = &self.since {
            format!(
                "SELECT {select_list} FROM {qualified} WHERE [{watermark_col}] > @P1 \
                 ORDER BY [{watermark_col}] OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY",
                offset = self.offset,
                limit = self.batch_size,
            )
        } else {
            let order_col = &self.columns[0].name;
            format!(
                "SELECT {select_list} FROM {qualified} ORDER BY [{order_col}] \
                 OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY",
                offset = self.offset,
                limit = self.batch_size,
            )
        };

        let mut query = Query::new(sql);
        if let Some((_, since)) = &self.since {
            query.bind(since.naive_utc());
        }

        let mut stream = query
            .query(&mut *client)
            .await
            .map_err(|e| ConnectorError::Read(e.to_string()))?;

        let mut rows: Vec<RowData> = Vec::new();
        while let Some(item) = stream
            .try_next()
            .await
            .map_err(|e| ConnectorError::Read(e.to_string()))?
        {
            if let QueryItem::Row(row) = item {
                let field_values: Vec<FieldValue> = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| FieldValue {
                        name: col.name.clone(),
                        value: value_from_row(&row, idx, &col.source_type),
                        data_type: col.source_type.clone(),
                    })
                    .collect();
                rows.push(RowData::new(&table_name, field_values));
            }
        }
        drop(client);

        let fetched = rows.len();
        self.offset += fetched;
        self.done = fetched < self.batch_size;

        Ok(Some(RowBatch {
            rows,
            next_cursor: model::pagination::cursor::Cursor::Default { offset: self.offset },
            reached_end: self.done,
        }))
    }
}
