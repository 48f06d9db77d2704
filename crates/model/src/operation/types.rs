use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// Lifecycle state of an `Operation` (§4.3). Transitions are enforced by the
/// orchestrator's store, never by the type itself — this is a plain label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// Whether `self -> to` is a legal transition per the table in §4.3.
    pub fn can_transition_to(self, to: OperationStatus) -> bool {
        use OperationStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Failed, Running)
                | (Completed, Running)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Full,
    Incremental,
}

/// Value object carried inside `Operation.config` (§3). `source`/`destination`
/// are opaque to the orchestrator: only the adapter named by `source_type`/
/// `dest_type` ever deserializes them, at `connect` time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationConfig {
    pub source_type: String,
    pub dest_type: String,
    pub source: Json,
    pub destination: Json,
    pub operation_type: OperationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl OperationConfig {
    /// I4/OperationConfig invariant: `source_type` must differ from `dest_type`.
    pub fn validate(&self) -> Result<(), String> {
        if self.source_type == self.dest_type {
            return Err(format!(
                "source_type and dest_type must differ, both were '{}'",
                self.source_type
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    pub table: String,
    pub records: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

/// Aggregated outcome of a single pipeline run (§3 MigrationResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    pub success: bool,
    pub tables_migrated: Vec<TableResult>,
    pub tables_failed: Vec<TableFailure>,
    pub total_tables: u64,
    pub total_records: u64,
    pub errors: Vec<String>,
}

impl MigrationResult {
    pub fn empty() -> Self {
        MigrationResult {
            success: true,
            tables_migrated: Vec::new(),
            tables_failed: Vec::new(),
            total_tables: 0,
            total_records: 0,
            errors: Vec::new(),
        }
    }

    /// P2: success must be exactly `tables_failed.is_empty()`.
    pub fn finalize(mut self) -> Self {
        self.success = self.tables_failed.is_empty();
        self.total_tables = (self.tables_migrated.len() + self.tables_failed.len()) as u64;
        self.total_records = self.tables_migrated.iter().map(|t| t.records).sum();
        self
    }
}

/// Persistent record describing a migration job (§3 Operation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub owner_id: String,
    pub source_registry_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub config: OperationConfig,
    pub result: Option<MigrationResult>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl Operation {
    pub fn new(owner_id: String, source_registry_id: String, config: OperationConfig) -> Self {
        let now = Utc::now();
        Operation {
            id: Uuid::new_v4(),
            owner_id,
            source_registry_id,
            scheduled_at: now,
            operation_type: config.operation_type,
            status: OperationStatus::Pending,
            last_sync_time: config.last_sync_time,
            config,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_only_move_to_running_or_cancelled() {
        let pending = OperationStatus::Pending;
        assert!(pending.can_transition_to(OperationStatus::Running));
        assert!(pending.can_transition_to(OperationStatus::Cancelled));
        assert!(!pending.can_transition_to(OperationStatus::Completed));
        assert!(!pending.can_transition_to(OperationStatus::Failed));
    }

    #[test]
    fn failed_and_completed_can_retry_into_running() {
        assert!(OperationStatus::Failed.can_transition_to(OperationStatus::Running));
        assert!(OperationStatus::Completed.can_transition_to(OperationStatus::Running));
    }

    #[test]
    fn cancelled_is_terminal_and_has_no_outgoing_transitions() {
        assert!(OperationStatus::Cancelled.is_terminal());
        for to in [
            OperationStatus::Pending,
            OperationStatus::Running,
            OperationStatus::Completed,
            OperationStatus::Failed,
            OperationStatus::Cancelled,
        ] {
            assert!(!OperationStatus::Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn config_validation_rejects_same_source_and_dest() {
        let config = OperationConfig {
            source_type: "postgres-like".into(),
            dest_type: "postgres-like".into(),
            source: serde_json::json!({}),
            destination: serde_json::json!({}),
            operation_type: OperationType::Full,
            last_sync_time: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn migration_result_success_matches_empty_failures() {
        let mut result = MigrationResult::empty();
        result.tables_migrated.push(TableResult {
            table: "users".into(),
            records: 3,
        });
        let result = result.finalize();
        assert!(result.success);
        assert_eq!(result.total_records, 3);
        assert_eq!(result.total_tables, 1);

        let mut failing = MigrationResult::empty();
        failing.tables_failed.push(TableFailure {
            table: "orders".into(),
            error: "boom".into(),
        });
        let failing = failing.finalize();
        assert!(!failing.success);
    }
}
