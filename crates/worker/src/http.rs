use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use connectors::{AdapterRegistry, DestinationAdapter, SourceAdapter};
use model::operation::types::{MigrationResult, OperationType};
use pipeline::{MigrateRequest, PipelineEngine};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AdapterRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/migrate", post(migrate))
        .route("/test-connection", post(test_connection))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    sources: Vec<&'static str>,
    destinations: Vec<&'static str>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        sources: state.registry.source_keys(),
        destinations: state.registry.destination_keys(),
    })
}

#[derive(Debug, Deserialize)]
struct MigrateBody {
    source_type: String,
    dest_type: String,
    source: serde_json::Value,
    destination: serde_json::Value,
    operation_type: OperationType,
    last_sync_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Tables a prior attempt at this same operation already migrated (R2);
    /// the orchestrator populates this on a retry from the stored
    /// `MigrationResult.tables_migrated`. Absent (or empty) on a fresh run.
    #[serde(default)]
    already_migrated: std::collections::BTreeSet<String>,
}

/// Aggregated success is HTTP 200, aggregated failure is HTTP 500 — both
/// always carry the `MigrationResult` body (§6).
async fn migrate(
    State(state): State<AppState>,
    Json(body): Json<MigrateBody>,
) -> (StatusCode, Json<MigrationResult>) {
    let run_id = uuid::Uuid::new_v4().to_string();
    info!(run_id = %run_id, source_type = %body.source_type, dest_type = %body.dest_type, "received migrate request");

    let engine = PipelineEngine::new(Arc::clone(&state.registry));
    let result = engine
        .run(MigrateRequest {
            run_id,
            source_type: body.source_type,
            dest_type: body.dest_type,
            source_config: body.source,
            destination_config: body.destination,
            operation_type: body.operation_type,
            since: body.last_sync_time,
            already_migrated: body.already_migrated,
        })
        .await;

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum EndpointKind {
    Source,
    Destination,
}

#[derive(Debug, Deserialize)]
struct TestConnectionBody {
    #[serde(rename = "type")]
    kind: EndpointKind,
    adapter_type: String,
    config: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct TestConnectionResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl IntoResponse for TestConnectionResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// A throwaway connect-then-disconnect against one adapter, used by the CRUD
/// layer's "test connection" button before an operation is ever scheduled.
async fn test_connection(
    State(state): State<AppState>,
    Json(body): Json<TestConnectionBody>,
) -> TestConnectionResponse {
    let outcome = match body.kind {
        EndpointKind::Source => {
            match state.registry.build_source(&body.adapter_type) {
                Ok(mut adapter) => {
                    let result = adapter.connect(body.config).await;
                    let _ = adapter.disconnect().await;
                    result
                }
                Err(e) => Err(e),
            }
        }
        EndpointKind::Destination => {
            match state.registry.build_destination(&body.adapter_type) {
                Ok(mut adapter) => {
                    let result = adapter.connect(body.config, "postgres-like").await;
                    let _ = adapter.disconnect().await;
                    result
                }
                Err(e) => Err(e),
            }
        }
    };

    match outcome {
        Ok(()) => TestConnectionResponse { success: true, error: None },
        Err(e) => TestConnectionResponse { success: false, error: Some(e.to_string()) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_state() -> AppState {
        AppState { registry: Arc::new(AdapterRegistry::with_defaults()) }
    }

    #[tokio::test]
    async fn health_lists_every_registered_adapter_key() {
        let Json(response) = health(State(mk_state())).await;
        assert_eq!(response.status, "healthy");
        assert!(response.sources.contains(&"postgres-like"));
        assert!(response.destinations.contains(&"columnar"));
    }

    #[tokio::test]
    async fn test_connection_reports_failure_for_an_unknown_adapter_type() {
        let body = TestConnectionBody {
            kind: EndpointKind::Source,
            adapter_type: "nonexistent".into(),
            config: serde_json::json!({}),
        };
        let response = test_connection(State(mk_state()), Json(body)).await;
        assert!(!response.success);
        assert!(response.error.is_some());
    }
}
