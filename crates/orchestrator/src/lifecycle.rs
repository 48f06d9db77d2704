use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use model::operation::types::{Operation, OperationStatus};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::store::OperationStore;
use crate::supervisor::Supervisor;
use crate::worker_client::MigrateRequestBody;

/// Execute/retry/delete (§4.3). Both HTTP handlers and the scheduler funnel
/// through here so the transition rules only live in one place.
pub struct Lifecycle {
    store: Arc<dyn OperationStore>,
    supervisor: Arc<Supervisor>,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn OperationStore>, supervisor: Arc<Supervisor>) -> Self {
        Lifecycle { store, supervisor }
    }

    /// §4.3 Execute(operation, force). Reject conditions are checked against
    /// the record *before* any status is claimed, then the actual claim is a
    /// compare-and-set so two callers racing on the same id cannot both win.
    pub async fn execute(&self, id: Uuid, force: bool) -> Result<Operation, OrchestratorError> {
        let op = self
            .store
            .get(id)
            .await?
            .ok_or(OrchestratorError::NotFound(id))?;

        if op.status == OperationStatus::Running {
            return Err(OrchestratorError::InvalidTransition(id, op.status));
        }
        if op.status == OperationStatus::Pending && op.scheduled_at > Utc::now() && !force {
            return Err(OrchestratorError::InvalidTransition(id, op.status));
        }

        let claimed = self
            .store
            .cas_status(id, op.status, OperationStatus::Running)
            .await?
            .ok_or(OrchestratorError::InvalidTransition(id, op.status))?;

        self.dispatch(claimed).await
    }

    /// §4.3 retry: identical dispatch, available from `failed` or `completed`.
    pub async fn retry(&self, id: Uuid) -> Result<Operation, OrchestratorError> {
        self.execute(id, true).await
    }

    /// §4.3 Delete(operation): best-effort cancel if running, then remove.
    pub async fn delete(&self, id: Uuid) -> Result<Operation, OrchestratorError> {
        let op = self
            .store
            .get(id)
            .await?
            .ok_or(OrchestratorError::NotFound(id))?;

        if op.status == OperationStatus::Running {
            // Best-effort: the worker's in-flight HTTP call is not interrupted.
            let _ = self
                .store
                .cas_status(id, OperationStatus::Running, OperationStatus::Cancelled)
                .await?;
        } else if op.status == OperationStatus::Pending {
            let _ = self
                .store
                .cas_status(id, OperationStatus::Pending, OperationStatus::Cancelled)
                .await?;
        }

        self.store
            .delete(id)
            .await?
            .ok_or(OrchestratorError::NotFound(id))
    }

    /// Runs the already-claimed (`running`) operation against the worker and
    /// writes the terminal transition.
    pub(crate) async fn dispatch(&self, op: Operation) -> Result<Operation, OrchestratorError> {
        info!(operation_id = %op.id, source_type = %op.config.source_type, dest_type = %op.config.dest_type, "dispatching operation to worker");

        if let Err(e) = self.supervisor.ensure_worker().await {
            warn!(operation_id = %op.id, error = %e, "worker unavailable, failing operation");
            return self
                .finish_failed(op.id, format!("worker unavailable: {e}"))
                .await;
        }

        let body = MigrateRequestBody {
            source_type: op.config.source_type.clone(),
            dest_type: op.config.dest_type.clone(),
            source: op.config.source.clone(),
            destination: op.config.destination.clone(),
            operation_type: op.config.operation_type,
            last_sync_time: op.config.last_sync_time,
            already_migrated: already_migrated_tables(&op),
        };

        match self.supervisor.client().migrate(&body).await {
            Ok(result) => {
                let to = if result.success {
                    OperationStatus::Completed
                } else {
                    OperationStatus::Failed
                };
                let error_message = (!result.success).then(|| {
                    result
                        .errors
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "one or more tables failed".to_string())
                });
                let updated = self
                    .store
                    .finish(op.id, to, Some(result), error_message)
                    .await?
                    .ok_or(OrchestratorError::InvalidTransition(op.id, OperationStatus::Running))?;
                info!(operation_id = %op.id, success = updated.is_success(), "operation finished");
                Ok(updated)
            }
            Err(e) => {
                error!(operation_id = %op.id, error = %e, "transport error calling worker");
                self.finish_failed(op.id, format!("transport error: {e}")).await
            }
        }
    }

    async fn finish_failed(&self, id: Uuid, message: String) -> Result<Operation, OrchestratorError> {
        self.store
            .finish(id, OperationStatus::Failed, None, Some(message))
            .await?
            .ok_or(OrchestratorError::InvalidTransition(id, OperationStatus::Running))
    }
}

/// R2: the skip-list for a retry. `op.result` still holds the prior attempt's
/// `MigrationResult` at this point (only the *next* terminal transition
/// overwrites it), so its `tables_migrated` names become the tables the
/// worker must not re-stream. A fresh, never-run operation has no `result`
/// yet and yields an empty set.
fn already_migrated_tables(op: &Operation) -> BTreeSet<String> {
    op.result
        .as_ref()
        .map(|r| r.tables_migrated.iter().map(|t| t.table.clone()).collect())
        .unwrap_or_default()
}
