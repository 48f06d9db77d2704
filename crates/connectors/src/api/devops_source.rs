//! Personal-token protected DevOps work-item API source (§4.1, §9). Unlike
//! `CrmSource` there is no refresh-token exchange: the token is sent as-is on
//! every request. The upstream API exposes no documented server-side filter
//! for "changed since", so incremental reads page through every item and
//! compare each one's `changed_date` against the watermark client-side.

use crate::contracts::{BoxedRowStream, RowBatchStream, SourceAdapter};
use crate::error::ConnectorError;
use crate::retry::NetworkRetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::core::data_type::DataType;
use model::core::value::{FieldValue, Value};
use model::operation::table::TableDescriptor;
use model::records::row::RowData;
use model::records::row_batch::RowBatch;
use serde::Deserialize;

fn default_projects() -> Vec<String> {
    vec!["work_items".to_string(), "builds".to_string(), "releases".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
struct DevOpsConfig {
    base_url: String,
    personal_token: String,
    #[serde(default = "default_projects")]
    projects: Vec<String>,
}

pub struct DevOpsSource {
    http: reqwest::Client,
    config: Option<DevOpsConfig>,
    retry: NetworkRetryPolicy,
}

impl DevOpsSource {
    pub fn new() -> Self {
        DevOpsSource {
            http: reqwest::Client::new(),
            config: None,
            retry: NetworkRetryPolicy::default(),
        }
    }

    fn config(&self) -> Result<&DevOpsConfig, ConnectorError> {
        self.config
            .as_ref()
            .ok_or_else(|| ConnectorError::Connection("not connected".into()))
    }

    fn clone_handle(&self) -> DevOpsHandle {
        DevOpsHandle {
            http: self.http.clone(),
            config: self.config.clone(),
            retry: self.retry,
        }
    }

    async fn fetch_page(&self, table: &str, page: usize, page_size: usize) -> Result<Vec<serde_json::Value>, ConnectorError> {
        let cfg = self.config()?;
        let url = format!("{}/{}", cfg.base_url, table);
        let token = cfg.personal_token.clone();

        let items: serde_json::Value = self
            .retry
            .run("devops page fetch", || {
                let http = self.http.clone();
                let url = url.clone();
                let token = token.clone();
                async move {
                    http.get(&url)
                        .basic_auth("", Some(&token))
                        .query(&[("page", page.to_string()), ("page_size", page_size.to_string())])
                        .send()
                        .await
                        .map_err(ConnectorError::from)?
                        .error_for_status()
                        .map_err(ConnectorError::from)?
                        .json::<serde_json::Value>()
                        .await
                        .map_err(ConnectorError::from)
                }
            })
            .await?;

        Ok(items
            .get("value")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

impl Default for DevOpsSource {
    fn default() -> Self {
        Self::new()
    }
}

fn json_value_to_value(v: &serde_json::Value) -> Option<Value> {
    match v {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Value::Boolean(*b)),
        serde_json::Value::Number(n) => n.as_f64().map(Value::Float),
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        other => Some(Value::Json(other.clone())),
    }
}

fn json_field_type(v: &serde_json::Value) -> DataType {
    match v {
        serde_json::Value::Bool(_) => DataType::Boolean,
        serde_json::Value::Number(_) => DataType::Float,
        serde_json::Value::String(_) => DataType::String,
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => DataType::Json,
        serde_json::Value::Null => DataType::Null,
    }
}

fn record_to_row(table: &str, record: &serde_json::Value) -> RowData {
    let field_values = record
        .as_object()
        .map(|obj| {
            obj.iter()
                .map(|(name, v)| FieldValue {
                    name: name.clone(),
                    value: json_value_to_value(v),
                    data_type: json_field_type(v),
                })
                .collect()
        })
        .unwrap_or_default();
    RowData::new(table, field_values)
}

/// `changed_date` is read back out of the already-deserialised JSON record
/// rather than re-fetched, since the watermark comparison happens per-row
/// after the page has already been pulled down.
fn changed_date(record: &serde_json::Value) -> Option<DateTime<Utc>> {
    record
        .get("changed_date")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// P6: a record belongs in an incremental read only if its `changed_date`
/// strictly exceeds `watermark`. A record with no parseable `changed_date`
/// has no such field value to compare, so it is excluded rather than let
/// through; a full read (`watermark == None`) always passes.
fn passes_watermark(record: &serde_json::Value, watermark: Option<DateTime<Utc>>) -> bool {
    match watermark {
        Some(since) => changed_date(record).is_some_and(|cd| cd > since),
        None => true,
    }
}

#[async_trait]
impl SourceAdapter for DevOpsSource {
    #[tracing::instrument(skip(self, config))]
    async fn connect(&mut self, config: serde_json::Value) -> Result<(), ConnectorError> {
        let cfg: DevOpsConfig = serde_json::from_value(config)
            .map_err(|e| ConnectorError::Connection(format!("invalid devops config: {e}")))?;
        self.config = Some(cfg);
        tracing::info!("connected to devops-api source");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectorError> {
        self.config = None;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.config()?.projects.clone())
    }

    async fn get_schema(&self, table: &str) -> Result<TableDescriptor, ConnectorError> {
        let records = self.fetch_page(table, 1, 1).await?;
        let mut columns = std::collections::BTreeMap::new();
        for record in &records {
            if let Some(obj) = record.as_object() {
                for (name, v) in obj {
                    columns.entry(name.clone()).or_insert_with(|| json_field_type(v));
                }
            }
        }
        let columns = columns
            .into_iter()
            .map(|(name, source_type)| model::operation::table::ColumnDescriptor {
                name,
                source_type,
                nullable: true,
                default: None,
            })
            .collect();
        Ok(TableDescriptor::new(table, columns))
    }

    async fn read_data(&self, table: &str, batch_size: usize) -> Result<BoxedRowStream, ConnectorError> {
        Ok(Box::new(DevOpsRowStream {
            source: self.clone_handle(),
            table: table.to_string(),
            batch_size,
            page: 1,
            watermark: None,
            done: false,
        }))
    }

    async fn read_incremental(
        &self,
        table: &str,
        since: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<BoxedRowStream, ConnectorError> {
        Ok(Box::new(DevOpsRowStream {
            source: self.clone_handle(),
            table: table.to_string(),
            batch_size,
            page: 1,
            watermark: Some(since),
            done: false,
        }))
    }

    fn source_key(&self) -> &'static str {
        "devops-api"
    }

    fn preferred_batch_size(&self) -> usize {
        50
    }

    fn logs_every_batch(&self) -> bool {
        true
    }
}

#[derive(Clone)]
struct DevOpsHandle {
    http: reqwest::Client,
    config: Option<DevOpsConfig>,
    retry: NetworkRetryPolicy,
}

impl DevOpsHandle {
    fn as_source(&self) -> DevOpsSource {
        DevOpsSource {
            http: self.http.clone(),
            config: self.config.clone(),
            retry: self.retry,
        }
    }
}

struct DevOpsRowStream {
    source: DevOpsHandle,
    table: String,
    batch_size: usize,
    page: usize,
    /// `Some` for incremental reads; rows whose `changed_date` does not
    /// strictly exceed this are dropped from the batch rather than filtered
    /// server-side, since the API offers no such query parameter.
    watermark: Option<DateTime<Utc>>,
    done: bool,
}

#[async_trait]
impl RowBatchStream for DevOpsRowStream {
    async fn next_batch(&mut self) -> Result<Option<RowBatch>, ConnectorError> {
        if self.done {
            return Ok(None);
        }
        let source = self.source.as_source();
        let records = source.fetch_page(&self.table, self.page, self.batch_size).await?;

        let fetched = records.len();
        self.page += 1;
        self.done = fetched < self.batch_size;

        let rows: Vec<RowData> = records
            .iter()
            .filter(|r| passes_watermark(r, self.watermark))
            .map(|r| record_to_row(&self.table, r))
            .collect();

        Ok(Some(RowBatch {
            rows,
            next_cursor: model::pagination::cursor::Cursor::Default { offset: self.page },
            reached_end: self.done,
        }))
    }
}
