//! The adapter capability set (§4.1): `SourceAdapter` and `DestinationAdapter`.
//! Every concrete adapter in `sql`, `api`, and `columnar` implements one of
//! these traits; the Pipeline Engine (in the `pipeline` crate) only ever
//! talks to adapters through them.

use crate::error::ConnectorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::operation::table::{
    ForeignKeyDescriptor, IndexDescriptor, MappedColumn, TableDescriptor, UniqueConstraintDescriptor,
};
use model::records::row_batch::RowBatch;
use std::collections::BTreeSet;

/// Pull-based replacement for a `Stream` of `RowBatch`: simpler to hold
/// behind a trait object than a boxed `futures::Stream`, and matches the
/// spec's "finite lazy sequence of batches" (§3 RowBatch) exactly — callers
/// drive it one `next_batch` at a time, which is also where backpressure
/// lives (§5): the caller does not pull the next batch until the previous
/// one has been written.
#[async_trait]
pub trait RowBatchStream: Send {
    /// Returns `Ok(None)` once the source has no more rows for this table.
    async fn next_batch(&mut self) -> Result<Option<RowBatch>, ConnectorError>;
}

pub type BoxedRowStream = Box<dyn RowBatchStream>;

/// A `SourceAdapter` is instantiated fresh per migration by the registry
/// (§3 AdapterRegistry) — it is never shared across concurrent operations.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Acquires network/connection resources. Idempotent-safe: calling twice
    /// on an already-connected adapter is a no-op, not an error.
    async fn connect(&mut self, config: serde_json::Value) -> Result<(), ConnectorError>;

    /// Scoped release; the Pipeline Engine calls this on every control-flow
    /// exit (success, per-table failure, or pre-flight abort).
    async fn disconnect(&mut self) -> Result<(), ConnectorError>;

    /// For API sources, "tables" are logical modules/resources (§4.1).
    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError>;

    /// Schema plus constraints in one call (primary key, foreign keys,
    /// unique constraints, indexes) — the individual `getPrimaryKey`-style
    /// accessors in §4.1 collapse into the fields already carried by
    /// `TableDescriptor`; adapters populate what they can and leave the rest
    /// empty rather than failing (errors here are logged, not propagated).
    async fn get_schema(&self, table: &str) -> Result<TableDescriptor, ConnectorError>;

    /// Full reload (§4.2 step 3.e). `batch_size` is chosen by the Pipeline
    /// Engine from `preferred_batch_size`.
    async fn read_data(
        &self,
        table: &str,
        batch_size: usize,
    ) -> Result<BoxedRowStream, ConnectorError>;

    /// Only rows whose change-tracking field strictly exceeds `since`.
    async fn read_incremental(
        &self,
        table: &str,
        since: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<BoxedRowStream, ConnectorError>;

    fn source_key(&self) -> &'static str;

    /// Batch size this source family prefers (§4.2 step 3.d): small for API
    /// sources (avoid rate-limit rejections), large for relational sources.
    /// The engine must not hardcode one constant across all sources — this
    /// is how that requirement is satisfied per-adapter.
    fn preferred_batch_size(&self) -> usize;

    /// Whether this source should log progress every batch (API sources,
    /// §4.2 step 3.g) or only every N batches (SQL sources).
    fn logs_every_batch(&self) -> bool {
        false
    }
}

/// A `DestinationAdapter` owns the target store: table creation, additive
/// schema evolution, upsert-or-append writes, and post-load constraints.
#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    /// `source_type` lets the destination pick a source-aware type map and
    /// namespace/table prefix (§4.1); must create the target
    /// database/namespace if it does not already exist.
    async fn connect(
        &mut self,
        config: serde_json::Value,
        source_type: &str,
    ) -> Result<(), ConnectorError>;

    async fn disconnect(&mut self) -> Result<(), ConnectorError>;

    /// Total function: unknown source types degrade to the destination's
    /// widest string type rather than failing (§4.1).
    fn map_types(
        &self,
        columns: &[model::operation::table::ColumnDescriptor],
        source_type: &str,
    ) -> Vec<MappedColumn>;

    /// Idempotent: must not drop a pre-existing table, and must succeed if
    /// the table already exists with a superset schema (§4.1, B3).
    async fn create_table(
        &self,
        table: &str,
        columns: &[MappedColumn],
        primary_key: &BTreeSet<String>,
    ) -> Result<(), ConnectorError>;

    /// Columns presently live at the destination, used by the Schema
    /// Evolver (§4.4) to diff against a batch's keyspace.
    async fn existing_columns(&self, table: &str) -> Result<BTreeSet<String>, ConnectorError>;

    /// Adds nullable columns; called when the source schema widens mid-run
    /// (dynamic API schemas) or when a pre-existing table is narrower than
    /// the source (B4).
    async fn evolve_schema(
        &self,
        table: &str,
        missing_columns: &[MappedColumn],
    ) -> Result<(), ConnectorError>;

    /// Upserts when `primary_key` is non-empty, otherwise appends (§4.1).
    async fn write_data(
        &self,
        table: &str,
        batch: &RowBatch,
        primary_key: &BTreeSet<String>,
    ) -> Result<(), ConnectorError>;

    /// Post-data constraint creation (§4.2 step 3.h) — invoked only after
    /// all of that table's batches have been written. A per-object failure
    /// here is non-fatal (`PostLoadConstraintError`, §7): it must not be
    /// returned as an `Err`, only collected into the returned `Vec` of
    /// human-readable descriptions so the caller can record it against the
    /// table (§4.2.h) instead of silently dropping it. Only a failure to
    /// reach the destination at all (connection lost) is an `Err`.
    async fn create_indexes(
        &self,
        table: &str,
        indexes: &[IndexDescriptor],
    ) -> Result<Vec<String>, ConnectorError>;

    async fn create_unique_constraints(
        &self,
        table: &str,
        constraints: &[UniqueConstraintDescriptor],
    ) -> Result<Vec<String>, ConnectorError>;

    /// Deferred to a final pass after every table has loaded (§4.2, §9).
    /// Same non-fatal-failures-collected-not-returned contract as
    /// `create_indexes`.
    async fn create_foreign_keys(
        &self,
        table: &str,
        foreign_keys: &[ForeignKeyDescriptor],
    ) -> Result<Vec<String>, ConnectorError>;

    fn destination_key(&self) -> &'static str;
}

/// Qualifies a destination table name by source family, so a columnar store
/// hosting migrations from several sources keeps them unambiguous (§4.1).
pub fn table_prefix_for_source(source_type: &str) -> String {
    match source_type {
        "postgres-like" | "mysql-like" | "sqlserver-like" => "REL_".to_string(),
        other => format!("{}_", other.to_uppercase().replace('-', "_")),
    }
}
