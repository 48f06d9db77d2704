//! OAuth refresh-token protected CRM API source (§4.1). Tokens are shared
//! across in-flight requests behind a `tokio::sync::RwLock` so a single
//! refresh exchange covers every request racing the same expiry; incremental
//! reads use the server-side `modified_since` query parameter (§9).

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
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

fn default_modules() -> Vec<String> {
    vec!["contacts".to_string(), "accounts".to_string(), "deals".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
struct CrmConfig {
    base_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default = "default_modules")]
    modules: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct TokenState {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    fn needs_refresh(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now() >= exp - chrono::Duration::seconds(30),
            None => true,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

pub struct CrmSource {
    http: reqwest::Client,
    config: Option<CrmConfig>,
    token: Arc<RwLock<TokenState>>,
    retry: NetworkRetryPolicy,
}

impl CrmSource {
    pub fn new() -> Self {
        CrmSource {
            http: reqwest::Client::new(),
            config: None,
            token: Arc::new(RwLock::new(TokenState::default())),
            retry: NetworkRetryPolicy::default(),
        }
    }

    fn config(&self) -> Result<&CrmConfig, ConnectorError> {
        self.config
            .as_ref()
            .ok_or_else(|| ConnectorError::Connection("not connected".into()))
    }

    async fn refresh_token(&self) -> Result<(), ConnectorError> {
        let cfg = self.config()?;
        {
            let guard = self.token.read().await;
            if !guard.needs_refresh() {
                return Ok(());
            }
        }
        let mut guard = self.token.write().await;
        if !guard.needs_refresh() {
            return Ok(());
        }
        let resp: TokenResponse = self
            .retry
            .run("crm token refresh", || {
                let http = self.http.clone();
                let cfg = cfg.clone();
                async move {
                    http.post(format!("{}/oauth/token", cfg.base_url))
                        .form(&[
                            ("grant_type", "refresh_token"),
                            ("client_id", &cfg.client_id),
                            ("client_secret", &cfg.client_secret),
                            ("refresh_token", &cfg.refresh_token),
                        ])
                        .send()
                        .await
                        .map_err(ConnectorError::from)?
                        .error_for_status()
                        .map_err(ConnectorError::from)?
                        .json::<TokenResponse>()
                        .await
                        .map_err(ConnectorError::from)
                }
            })
            .await
            .map_err(|e| ConnectorError::Auth(e.to_string()))?;

        guard.access_token = resp.access_token;
        guard.expires_at = resp
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        Ok(())
    }

    async fn bearer(&self) -> Result<String, ConnectorError> {
        self.refresh_token().await?;
        Ok(self.token.read().await.access_token.clone())
    }

    async fn fetch_page(
        &self,
        table: &str,
        page: usize,
        page_size: usize,
        modified_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<serde_json::Value>, ConnectorError> {
        let cfg = self.config()?;
        let token = self.bearer().await?;
        let url = format!("{}/{}", cfg.base_url, table);

        let items: serde_json::Value = self
            .retry
            .run("crm page fetch", || {
                let http = self.http.clone();
                let url = url.clone();
                let token = token.clone();
                async move {
                    let mut req = http
                        .get(&url)
                        .bearer_auth(&token)
                        .query(&[("page", page.to_string()), ("page_size", page_size.to_string())]);
                    if let Some(since) = modified_since {
                        req = req.query(&[("modified_since", since.to_rfc3339())]);
                    }
                    req.send()
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
            .get("data")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

impl Default for CrmSource {
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

#[async_trait]
impl SourceAdapter for CrmSource {
    #[tracing::instrument(skip(self, config))]
    async fn connect(&mut self, config: serde_json::Value) -> Result<(), ConnectorError> {
        let cfg: CrmConfig = serde_json::from_value(config)
            .map_err(|e| ConnectorError::Connection(format!("invalid crm config: {e}")))?;
        self.config = Some(cfg);
        self.refresh_token().await?;
        tracing::info!("connected to crm-api source");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectorError> {
        self.config = None;
        *self.token.write().await = TokenState::default();
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.config()?.modules.clone())
    }

    async fn get_schema(&self, table: &str) -> Result<TableDescriptor, ConnectorError> {
        let records = self.fetch_page(table, 1, 1, None).await?;
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
        Ok(Box::new(CrmRowStream {
            source: self.clone_handle(),
            table: table.to_string(),
            batch_size,
            page: 1,
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
        Ok(Box::new(CrmRowStream {
            source: self.clone_handle(),
            table: table.to_string(),
            batch_size,
            page: 1,
            since: Some(since),
            done: false,
        }))
    }

    fn source_key(&self) -> &'static str {
        "crm-api"
    }

    fn preferred_batch_size(&self) -> usize {
        50
    }

    fn logs_every_batch(&self) -> bool {
        true
    }
}

impl CrmSource {
    /// Row streams need their own handle to re-issue authenticated requests;
    /// the token lock and http client are shared, config is cloned once.
    fn clone_handle(&self) -> CrmHandle {
        CrmHandle {
            http: self.http.clone(),
            config: self.config.clone(),
            token: self.token.clone(),
            retry: self.retry,
        }
    }
}

#[derive(Clone)]
struct CrmHandle {
    http: reqwest::Client,
    config: Option<CrmConfig>,
    token: Arc<RwLock<TokenState>>,
    retry: NetworkRetryPolicy,
}

impl CrmHandle {
    fn as_source(&self) -> CrmSource {
        CrmSource {
            http: self.http.clone(),
            config: self.config.clone(),
            token: self.token.clone(),
            retry: self.retry,
        }
    }
}

struct CrmRowStream {
    source: CrmHandle,
    table: String,
    batch_size: usize,
    page: usize,
    since: Option<DateTime<Utc>>,
    done: bool,
}

#[async_trait]
impl RowBatchStream for CrmRowStream {
    async fn next_batch(&mut self) -> Result<Option<RowBatch>, ConnectorError> {
        if self.done {
            return Ok(None);
        }
        let source = self.source.as_source();
        let records = source
            .fetch_page(&self.table, self.page, self.batch_size, self.since)
            .await?;

        let fetched = records.len();
        self.page += 1;
        self.done = fetched < self.batch_size;

        let rows: Vec<RowData> = records.iter().map(|r| record_to_row(&self.table, r)).collect();

        Ok(Some(RowBatch {
            rows,
            next_cursor: model::pagination::cursor::Cursor::Default { offset: self.page },
            reached_end: self.done,
        }))
    }
}
