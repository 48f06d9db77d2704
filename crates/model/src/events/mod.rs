use std::fmt::Debug;

/// A trait for events that can be published on the `EventBus`.
pub trait Event: Send + Sync + Debug + 'static {
    /// Returns a unique identifier for this event type.
    fn event_type(&self) -> &'static str;
}

/// Emitted when the pipeline begins processing one table (§4.2 step 3).
#[derive(Debug, Clone)]
pub struct TableStarted {
    pub run_id: String,
    pub table: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event for TableStarted {
    fn event_type(&self) -> &'static str {
        "table.started"
    }
}

/// Emitted once a table's batches have all been written (§4.2 step 3.h).
#[derive(Debug, Clone)]
pub struct TableLoaded {
    pub run_id: String,
    pub table: String,
    pub records: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event for TableLoaded {
    fn event_type(&self) -> &'static str {
        "table.loaded"
    }
}

/// Emitted when a table's migration is abandoned after exhausting retries.
#[derive(Debug, Clone)]
pub struct TableFailed {
    pub run_id: String,
    pub table: String,
    pub error: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event for TableFailed {
    fn event_type(&self) -> &'static str {
        "table.failed"
    }
}

/// Progress heartbeat emitted per batch (API sources) or every N batches
/// (SQL sources), per §4.2 step 3.g.
#[derive(Debug, Clone)]
pub struct BatchWritten {
    pub run_id: String,
    pub table: String,
    pub rows_in_batch: u64,
    pub rows_total: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event for BatchWritten {
    fn event_type(&self) -> &'static str {
        "batch.written"
    }
}

/// Emitted when the Schema Evolver adds columns to a destination table
/// mid-operation (§4.4).
#[derive(Debug, Clone)]
pub struct SchemaEvolved {
    pub run_id: String,
    pub table: String,
    pub added_columns: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event for SchemaEvolved {
    fn event_type(&self) -> &'static str {
        "schema.evolved"
    }
}

/// Emitted once an attempt at post-load constraint creation (indexes, unique
/// constraints, or foreign keys) finishes for a table, successfully or not.
#[derive(Debug, Clone)]
pub struct ConstraintsApplied {
    pub run_id: String,
    pub table: String,
    pub failures: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event for ConstraintsApplied {
    fn event_type(&self) -> &'static str {
        "constraints.applied"
    }
}

/// Emitted when a whole operation (all tables) finishes, successfully or not.
#[derive(Debug, Clone)]
pub struct OperationFinished {
    pub run_id: String,
    pub success: bool,
    pub total_records: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event for OperationFinished {
    fn event_type(&self) -> &'static str {
        "operation.finished"
    }
}
