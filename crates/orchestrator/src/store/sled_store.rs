//! `sled`-backed `OperationStore` (§4.3.1), grounded on the teacher's
//! `engine_core::state::sled_store::SledStateStore`: the same
//! check-then-set transaction shape that store used to order checkpoint
//! writes is used here to make a scheduler claim (or any other status
//! transition) a true compare-and-set rather than a racy read-modify-write.

use async_trait::async_trait;
use chrono::Utc;
use model::operation::types::{Operation, OperationStatus};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use uuid::Uuid;

use super::OperationStore;
use crate::error::OrchestratorError;

pub struct SledOperationStore {
    db: sled::Db,
}

impl SledOperationStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, OrchestratorError> {
        let db = sled::open(path).map_err(|e| OrchestratorError::Persistence(e.to_string()))?;
        Ok(SledOperationStore { db })
    }

    #[inline]
    fn key(id: Uuid) -> String {
        format!("op:{id}")
    }

    fn decode(bytes: &[u8]) -> Result<Operation, OrchestratorError> {
        serde_json::from_slice(bytes)
            .map_err(|e| OrchestratorError::Persistence(format!("corrupt operation record: {e}")))
    }

    fn encode(op: &Operation) -> Result<Vec<u8>, OrchestratorError> {
        serde_json::to_vec(op).map_err(|e| OrchestratorError::Persistence(e.to_string()))
    }
}

#[async_trait]
impl OperationStore for SledOperationStore {
    async fn insert(&self, op: Operation) -> Result<Operation, OrchestratorError> {
        let key = Self::key(op.id);
        let bytes = Self::encode(&op)?;
        self.db
            .insert(key, bytes)
            .map_err(|e| OrchestratorError::Persistence(e.to_string()))?;
        Ok(op)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Operation>, OrchestratorError> {
        match self
            .db
            .get(Self::key(id))
            .map_err(|e| OrchestratorError::Persistence(e.to_string()))?
        {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, owner_id: Option<&str>) -> Result<Vec<Operation>, OrchestratorError> {
        let mut out = Vec::new();
        for entry in self.db.scan_prefix("op:") {
            let (_, bytes) = entry.map_err(|e| OrchestratorError::Persistence(e.to_string()))?;
            let op = Self::decode(&bytes)?;
            if owner_id.is_none_or(|owner| op.owner_id == owner) {
                out.push(op);
            }
        }
        out.sort_by_key(|op| op.created_at);
        Ok(out)
    }

    async fn replace(&self, op: Operation) -> Result<(), OrchestratorError> {
        let key = Self::key(op.id);
        let bytes = Self::encode(&op)?;
        self.db
            .insert(key, bytes)
            .map_err(|e| OrchestratorError::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Operation>, OrchestratorError> {
        match self
            .db
            .remove(Self::key(id))
            .map_err(|e| OrchestratorError::Persistence(e.to_string()))?
        {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn cas_status(
        &self,
        id: Uuid,
        expected: OperationStatus,
        to: OperationStatus,
    ) -> Result<Option<Operation>, OrchestratorError> {
        let key = Self::key(id);
        let now = Utc::now();

        let result = self.db.transaction::<_, _, OrchestratorError>(|tx| {
            let Some(bytes) = tx.get(&key)? else {
                return Ok(None);
            };
            let mut op: Operation = serde_json::from_slice(&bytes).map_err(|e| {
                ConflictableTransactionError::Abort(OrchestratorError::Persistence(e.to_string()))
            })?;

            if op.status != expected || !op.status.can_transition_to(to) {
                // Not a storage error: the caller lost the race or asked for
                // an illegal transition (I1). Report via Ok(None), not Err,
                // so `TransactionError::Storage` stays reserved for sled faults.
                return Ok(None);
            }

            op.status = to;
            op.updated_at = now;
            if to == OperationStatus::Running && op.started_at.is_none() {
                op.started_at = Some(now);
            }
            if to.is_terminal() {
                op.completed_at = Some(now);
            }

            let encoded = serde_json::to_vec(&op).map_err(|e| {
                ConflictableTransactionError::Abort(OrchestratorError::Persistence(e.to_string()))
            })?;
            tx.insert(&*key, encoded)?;
            Ok(Some(op))
        });

        match result {
            Ok(updated) => Ok(updated),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(OrchestratorError::Persistence(e.to_string())),
        }
    }

    async fn due_pending(
        &self,
        now: chrono::DateTime<Utc>,
    ) -> Result<Vec<Operation>, OrchestratorError> {
        let mut out = Vec::new();
        for entry in self.db.scan_prefix("op:") {
            let (_, bytes) = entry.map_err(|e| OrchestratorError::Persistence(e.to_string()))?;
            let op = Self::decode(&bytes)?;
            if op.status == OperationStatus::Pending && op.scheduled_at <= now {
                out.push(op);
            }
        }
        out.sort_by_key(|op| op.scheduled_at);
        Ok(out)
    }

    async fn finish(
        &self,
        id: Uuid,
        to: OperationStatus,
        result: Option<model::operation::types::MigrationResult>,
        error_message: Option<String>,
    ) -> Result<Option<Operation>, OrchestratorError> {
        let key = Self::key(id);
        let now = Utc::now();

        let outcome = self.db.transaction::<_, _, OrchestratorError>(|tx| {
            let Some(bytes) = tx.get(&key)? else {
                return Ok(None);
            };
            let mut op: Operation = serde_json::from_slice(&bytes).map_err(|e| {
                ConflictableTransactionError::Abort(OrchestratorError::Persistence(e.to_string()))
            })?;

            if op.status != OperationStatus::Running || !op.status.can_transition_to(to) {
                return Ok(None);
            }

            op.status = to;
            op.updated_at = now;
            op.completed_at = Some(now);
            op.result = result.clone();
            op.error_message = error_message.clone();

            let encoded = serde_json::to_vec(&op).map_err(|e| {
                ConflictableTransactionError::Abort(OrchestratorError::Persistence(e.to_string()))
            })?;
            tx.insert(&*key, encoded)?;
            Ok(Some(op))
        });

        match outcome {
            Ok(updated) => Ok(updated),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(OrchestratorError::Persistence(e.to_string())),
        }
    }
}
