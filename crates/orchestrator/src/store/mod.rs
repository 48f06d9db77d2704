//! Operation persistence (§3 Operation, §4.3). The store is the only place
//! that enforces the lifecycle state machine's compare-and-set discipline:
//! the scheduler and `execute`/`retry`/delete all go through `cas_status`
//! rather than reading-then-writing a status field directly, so that two
//! orchestrator replicas racing on the same operation cannot both dispatch it.

pub mod sled_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::operation::types::{MigrationResult, Operation, OperationStatus};
use uuid::Uuid;

use crate::error::OrchestratorError;

#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn insert(&self, op: Operation) -> Result<Operation, OrchestratorError>;

    async fn get(&self, id: Uuid) -> Result<Option<Operation>, OrchestratorError>;

    async fn list(&self, owner_id: Option<&str>) -> Result<Vec<Operation>, OrchestratorError>;

    /// Full overwrite of an existing record (used once a transition has
    /// already been validated by the caller, e.g. after `cas_status`
    /// succeeds and the caller wants to also set `result`/`error_message`).
    async fn replace(&self, op: Operation) -> Result<(), OrchestratorError>;

    async fn delete(&self, id: Uuid) -> Result<Option<Operation>, OrchestratorError>;

    /// Atomically transitions `id` from `expected` to `to`, refusing if the
    /// stored status has moved on (§4.3, §5 "compare-and-set scheduler
    /// claims"). Returns the updated record on success.
    async fn cas_status(
        &self,
        id: Uuid,
        expected: OperationStatus,
        to: OperationStatus,
    ) -> Result<Option<Operation>, OrchestratorError>;

    /// Pending operations due for dispatch (§4.3 Scheduler): `status =
    /// pending AND scheduled_at <= now`.
    async fn due_pending(&self, now: DateTime<Utc>) -> Result<Vec<Operation>, OrchestratorError>;

    /// Writes `result`/`error_message` atomically with the transition from
    /// `running` into a terminal status (§4.3: "written atomically with the
    /// terminal transition"). Returns `None` if the record was not `running`.
    async fn finish(
        &self,
        id: Uuid,
        to: OperationStatus,
        result: Option<MigrationResult>,
        error_message: Option<String>,
    ) -> Result<Option<Operation>, OrchestratorError>;
}
