mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::lifecycle::Lifecycle;
use crate::store::OperationStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OperationStore>,
    pub lifecycle: Arc<Lifecycle>,
}

/// Orchestrator HTTP surface (§6): operations CRUD plus the lifecycle and
/// reporting endpoints surfaced to the CRUD layer.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/operations", post(handlers::create_operation).get(handlers::list_operations))
        .route(
            "/operations/{id}",
            get(handlers::get_operation).delete(handlers::delete_operation),
        )
        .route("/operations/{id}/execute", post(handlers::execute_operation))
        .route("/operations/{id}/retry", post(handlers::retry_operation))
        .route("/operations/{id}/status", get(handlers::operation_status))
        .route("/operations/summary", get(handlers::operations_summary))
        .route("/health", get(handlers::health))
        .with_state(state)
}
