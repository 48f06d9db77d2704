use std::collections::BTreeSet;
use std::time::Duration;

use model::operation::types::{MigrationResult, OperationType};
use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

#[derive(Debug, Clone, Serialize)]
pub struct MigrateRequestBody {
    pub source_type: String,
    pub dest_type: String,
    pub source: serde_json::Value,
    pub destination: serde_json::Value,
    pub operation_type: OperationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Tables a prior attempt at this operation already migrated (R2):
    /// carried across a retry so the worker does not re-stream them.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub already_migrated: BTreeSet<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub destinations: Vec<String>,
}

/// Thin `reqwest` client for the worker's HTTP surface (§6). Every call goes
/// through here so the supervisor and lifecycle modules never build requests
/// by hand.
pub struct WorkerClient {
    http: reqwest::Client,
    base_url: String,
}

impl WorkerClient {
    pub fn new(base_url: String, migrate_timeout: Duration) -> Result<Self, OrchestratorError> {
        let http = reqwest::Client::builder()
            .timeout(migrate_timeout)
            .build()
            .map_err(OrchestratorError::WorkerTransport)?;
        Ok(WorkerClient { http, base_url })
    }

    pub async fn health(&self) -> Result<HealthResponse, OrchestratorError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(OrchestratorError::WorkerTransport)?
            .error_for_status()
            .map_err(OrchestratorError::WorkerTransport)?;
        resp.json::<HealthResponse>()
            .await
            .map_err(OrchestratorError::WorkerTransport)
    }

    pub async fn migrate(
        &self,
        body: &MigrateRequestBody,
    ) -> Result<MigrationResult, OrchestratorError> {
        let resp = self
            .http
            .post(format!("{}/migrate", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(OrchestratorError::WorkerTransport)?;

        // §6: the worker always returns a body, on both 200 and 500 — only
        // transport failures (the branch above) are `WorkerTransport`.
        resp.json::<MigrationResult>()
            .await
            .map_err(OrchestratorError::WorkerTransport)
    }
}
