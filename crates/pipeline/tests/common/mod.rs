//! Fake in-memory `SourceAdapter`/`DestinationAdapter` implementations used
//! by the pipeline engine's integration tests. These stand in for the
//! teacher's dedicated `engine-tests` crate (which drives real Postgres/MySQL
//! instances): the fakes implement the exact same traits the real adapters
//! do, so `PipelineEngine::run` cannot tell the difference, but they need no
//! network or database.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connectors::contracts::{BoxedRowStream, RowBatchStream};
use connectors::{AdapterRegistry, ConnectorError, DestinationAdapter, SourceAdapter};
use model::core::data_type::DataType;
use model::core::value::{FieldValue, Value};
use model::operation::table::{
    ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, MappedColumn, TableDescriptor,
    UniqueConstraintDescriptor,
};
use model::pagination::cursor::Cursor;
use model::records::row::RowData;
use model::records::row_batch::RowBatch;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Builds a three-column (`id`, `name`, `updated_at`) row, the fixture shape
/// every test in this crate uses.
pub fn row(id: i64, name: &str, updated_at: DateTime<Utc>) -> RowData {
    RowData::new(
        "row",
        vec![
            FieldValue {
                name: "id".into(),
                value: Some(Value::Int(id)),
                data_type: DataType::Long,
            },
            FieldValue {
                name: "name".into(),
                value: Some(Value::String(name.to_string())),
                data_type: DataType::VarChar,
            },
            FieldValue {
                name: "updated_at".into(),
                value: Some(Value::Timestamp(updated_at)),
                data_type: DataType::Timestamp,
            },
        ],
    )
}

/// The schema fixture matching `row()`.
pub fn table_descriptor(name: &str, with_primary_key: bool) -> TableDescriptor {
    let mut desc = TableDescriptor::new(
        name,
        vec![
            ColumnDescriptor {
                name: "id".into(),
                source_type: DataType::Long,
                nullable: false,
                default: None,
            },
            ColumnDescriptor {
                name: "name".into(),
                source_type: DataType::VarChar,
                nullable: true,
                default: None,
            },
            ColumnDescriptor {
                name: "updated_at".into(),
                source_type: DataType::Timestamp,
                nullable: false,
                default: None,
            },
        ],
    );
    if with_primary_key {
        desc.primary_key = BTreeSet::from(["id".to_string()]);
    }
    desc
}

fn chunk_rows(rows: Vec<RowData>, batch_size: usize) -> VecDeque<RowBatch> {
    if rows.is_empty() {
        return VecDeque::from([RowBatch {
            rows: Vec::new(),
            next_cursor: Cursor::None,
            reached_end: true,
        }]);
    }
    let batch_size = batch_size.max(1);
    let mut chunks = VecDeque::new();
    let mut iter = rows.chunks(batch_size).peekable();
    while let Some(chunk) = iter.next() {
        chunks.push_back(RowBatch {
            rows: chunk.to_vec(),
            next_cursor: Cursor::None,
            reached_end: iter.peek().is_none(),
        });
    }
    chunks
}

struct FakeStream {
    batches: VecDeque<RowBatch>,
}

#[async_trait]
impl RowBatchStream for FakeStream {
    async fn next_batch(&mut self) -> Result<Option<RowBatch>, ConnectorError> {
        Ok(self.batches.pop_front())
    }
}

/// Call counters a test can assert on after a run (or several runs) has
/// completed. Shared via `Arc` between every clone of a `FakeSource`, so the
/// handle a test keeps sees the same counts the engine's own clone recorded.
#[derive(Default)]
pub struct SourceCalls {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    /// `(table, batch_size)` for every `read_data` call.
    pub full_reads: Mutex<Vec<(String, usize)>>,
    /// `(table, since, batch_size)` for every `read_incremental` call.
    pub incremental_reads: Mutex<Vec<(String, DateTime<Utc>, usize)>>,
}

#[derive(Clone)]
pub struct FakeSource {
    tables: Arc<BTreeMap<String, TableDescriptor>>,
    rows: Arc<BTreeMap<String, Vec<RowData>>>,
    batch_size: usize,
    logs_every_batch: bool,
    pub calls: Arc<SourceCalls>,
    fail_schema_for: Arc<BTreeSet<String>>,
}

impl FakeSource {
    pub fn new(tables: Vec<(&str, TableDescriptor, Vec<RowData>)>, batch_size: usize) -> Self {
        let mut schema = BTreeMap::new();
        let mut rows = BTreeMap::new();
        for (name, desc, table_rows) in tables {
            schema.insert(name.to_string(), desc);
            rows.insert(name.to_string(), table_rows);
        }
        FakeSource {
            tables: Arc::new(schema),
            rows: Arc::new(rows),
            batch_size,
            logs_every_batch: false,
            calls: Arc::new(SourceCalls::default()),
            fail_schema_for: Arc::new(BTreeSet::new()),
        }
    }

    pub fn logging_every_batch(mut self) -> Self {
        self.logs_every_batch = true;
        self
    }

    pub fn failing_schema_for(mut self, table: &str) -> Self {
        self.fail_schema_for = Arc::new(BTreeSet::from([table.to_string()]));
        self
    }

    /// Registers `self` under `key` in `registry`, cloning for every fresh
    /// adapter instance the registry is asked to build (mirrors how the
    /// real `AdapterRegistry::with_defaults` factories close over nothing
    /// mutable — here the mutable bits live behind the shared `Arc`s).
    pub fn register(self, registry: &mut AdapterRegistry, key: &'static str) {
        registry.register_source(key, move || Box::new(self.clone()));
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    async fn connect(&mut self, _config: serde_json::Value) -> Result<(), ConnectorError> {
        self.calls.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectorError> {
        self.calls.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn get_schema(&self, table: &str) -> Result<TableDescriptor, ConnectorError> {
        if self.fail_schema_for.contains(table) {
            return Err(ConnectorError::Schema(format!("no schema for '{table}'")));
        }
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| ConnectorError::Schema(format!("unknown table '{table}'")))
    }

    async fn read_data(&self, table: &str, batch_size: usize) -> Result<BoxedRowStream, ConnectorError> {
        self.calls
            .full_reads
            .lock()
            .unwrap()
            .push((table.to_string(), batch_size));
        let rows = self.rows.get(table).cloned().unwrap_or_default();
        Ok(Box::new(FakeStream {
            batches: chunk_rows(rows, batch_size),
        }))
    }

    async fn read_incremental(
        &self,
        table: &str,
        since: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<BoxedRowStream, ConnectorError> {
        self.calls
            .incremental_reads
            .lock()
            .unwrap()
            .push((table.to_string(), since, batch_size));
        let rows: Vec<RowData> = self
            .rows
            .get(table)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|r| match r.get_value("updated_at") {
                Value::Timestamp(ts) => ts > since,
                _ => false,
            })
            .collect();
        Ok(Box::new(FakeStream {
            batches: chunk_rows(rows, batch_size),
        }))
    }

    fn source_key(&self) -> &'static str {
        "fake-source"
    }

    fn preferred_batch_size(&self) -> usize {
        self.batch_size
    }

    fn logs_every_batch(&self) -> bool {
        self.logs_every_batch
    }
}

#[derive(Default)]
pub struct DestCalls {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub create_table: Mutex<Vec<String>>,
    /// `(table, rows_in_batch)` for every `write_data` call.
    pub writes: Mutex<Vec<(String, usize)>>,
    /// `(table, added_column_names)` for every `evolve_schema` call.
    pub evolves: Mutex<Vec<(String, Vec<String>)>>,
}

#[derive(Clone)]
pub struct FakeDestination {
    existing_columns: Arc<Mutex<BTreeMap<String, BTreeSet<String>>>>,
    upserted: Arc<Mutex<BTreeMap<String, BTreeMap<String, RowData>>>>,
    appended: Arc<Mutex<BTreeMap<String, Vec<RowData>>>>,
    pub calls: Arc<DestCalls>,
    /// Mutable (unlike the other `fail_*` sets) so a test can clear a
    /// table's simulated write failure between two `run()` calls, modelling
    /// a transient fault that clears up by the time an operation is retried.
    fail_write_for: Arc<Mutex<BTreeSet<String>>>,
    fail_indexes: Arc<BTreeSet<String>>,
    fail_unique: Arc<BTreeSet<String>>,
    fail_fk: Arc<BTreeSet<String>>,
}

impl FakeDestination {
    pub fn new() -> Self {
        FakeDestination {
            existing_columns: Arc::new(Mutex::new(BTreeMap::new())),
            upserted: Arc::new(Mutex::new(BTreeMap::new())),
            appended: Arc::new(Mutex::new(BTreeMap::new())),
            calls: Arc::new(DestCalls::default()),
            fail_write_for: Arc::new(Mutex::new(BTreeSet::new())),
            fail_indexes: Arc::new(BTreeSet::new()),
            fail_unique: Arc::new(BTreeSet::new()),
            fail_fk: Arc::new(BTreeSet::new()),
        }
    }

    /// Seeds a table as already existing at the destination with exactly
    /// `columns`, as if a prior run (or an operator) had created it — for
    /// B3 (superset schema, `create_table` must be a no-op) and B4
    /// (narrower schema, the Schema Evolver must widen it).
    pub fn seed_existing_table(&self, table: &str, columns: &[&str]) {
        self.existing_columns
            .lock()
            .unwrap()
            .insert(table.to_string(), columns.iter().map(|c| c.to_string()).collect());
    }

    pub fn failing_write_for(self, table: &str) -> Self {
        self.fail_write_for.lock().unwrap().insert(table.to_string());
        self
    }

    /// Clears a previously-configured write failure for `table`, as if the
    /// transient fault behind it had resolved by the next attempt.
    pub fn stop_failing_write(&self, table: &str) {
        self.fail_write_for.lock().unwrap().remove(table);
    }

    pub fn failing_index(mut self, index_name: &str) -> Self {
        self.fail_indexes = Arc::new(BTreeSet::from([index_name.to_string()]));
        self
    }

    pub fn failing_unique_constraint(mut self, constraint_name: &str) -> Self {
        self.fail_unique = Arc::new(BTreeSet::from([constraint_name.to_string()]));
        self
    }

    pub fn failing_foreign_key(mut self, referenced_table: &str) -> Self {
        self.fail_fk = Arc::new(BTreeSet::from([referenced_table.to_string()]));
        self
    }

    pub fn register(self, registry: &mut AdapterRegistry, key: &'static str) {
        registry.register_destination(key, move || Box::new(self.clone()));
    }

    pub fn columns_of(&self, table: &str) -> BTreeSet<String> {
        self.existing_columns.lock().unwrap().get(table).cloned().unwrap_or_default()
    }

    /// Rows currently upserted (by primary key) at the destination for
    /// `table`, in key order.
    pub fn upserted_rows(&self, table: &str) -> Vec<RowData> {
        self.upserted
            .lock()
            .unwrap()
            .get(table)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Rows appended (no primary key, so no dedup) for `table`, in write
    /// order, including duplicates across retries/reruns.
    pub fn appended_rows(&self, table: &str) -> Vec<RowData> {
        self.appended.lock().unwrap().get(table).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.upserted_rows(table).len() + self.appended_rows(table).len()
    }
}

impl Default for FakeDestination {
    fn default() -> Self {
        Self::new()
    }
}

fn pk_key(row: &RowData, primary_key: &BTreeSet<String>) -> String {
    primary_key.iter().map(|c| row.get_value(c).to_string()).collect::<Vec<_>>().join("\u{1}")
}

#[async_trait]
impl DestinationAdapter for FakeDestination {
    async fn connect(&mut self, _config: serde_json::Value, _source_type: &str) -> Result<(), ConnectorError> {
        self.calls.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectorError> {
        self.calls.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn map_types(&self, columns: &[ColumnDescriptor], _source_type: &str) -> Vec<MappedColumn> {
        columns
            .iter()
            .map(|c| MappedColumn {
                name: c.name.clone(),
                dest_type: "TEXT".to_string(),
                nullable: c.nullable,
                default: c.default.clone(),
            })
            .collect()
    }

    async fn create_table(
        &self,
        table: &str,
        columns: &[MappedColumn],
        _primary_key: &BTreeSet<String>,
    ) -> Result<(), ConnectorError> {
        self.calls.create_table.lock().unwrap().push(table.to_string());
        // Idempotent: a table that already exists (seeded or from a prior
        // call in this run) keeps whatever columns it already has (B3) —
        // only a brand new table gets exactly `columns`.
        self.existing_columns
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_insert_with(|| columns.iter().map(|c| c.name.clone()).collect());
        Ok(())
    }

    async fn existing_columns(&self, table: &str) -> Result<BTreeSet<String>, ConnectorError> {
        Ok(self.existing_columns.lock().unwrap().get(table).cloned().unwrap_or_default())
    }

    async fn evolve_schema(&self, table: &str, missing_columns: &[MappedColumn]) -> Result<(), ConnectorError> {
        let names: Vec<String> = missing_columns.iter().map(|c| c.name.clone()).collect();
        self.calls.evolves.lock().unwrap().push((table.to_string(), names.clone()));
        let mut existing = self.existing_columns.lock().unwrap();
        let set = existing.entry(table.to_string()).or_default();
        set.extend(names);
        Ok(())
    }

    async fn write_data(
        &self,
        table: &str,
        batch: &RowBatch,
        primary_key: &BTreeSet<String>,
    ) -> Result<(), ConnectorError> {
        if self.fail_write_for.lock().unwrap().contains(table) {
            return Err(ConnectorError::Write(format!("simulated write failure for '{table}'")));
        }
        self.calls.writes.lock().unwrap().push((table.to_string(), batch.len()));
        if primary_key.is_empty() {
            self.appended
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default()
                .extend(batch.rows.iter().cloned());
        } else {
            let mut upserted = self.upserted.lock().unwrap();
            let map = upserted.entry(table.to_string()).or_default();
            for row in &batch.rows {
                map.insert(pk_key(row, primary_key), row.clone());
            }
        }
        Ok(())
    }

    async fn create_indexes(&self, table: &str, indexes: &[IndexDescriptor]) -> Result<Vec<String>, ConnectorError> {
        Ok(indexes
            .iter()
            .filter(|idx| self.fail_indexes.contains(&idx.name))
            .map(|idx| format!("index '{}' on '{table}' failed: simulated", idx.name))
            .collect())
    }

    async fn create_unique_constraints(
        &self,
        table: &str,
        constraints: &[UniqueConstraintDescriptor],
    ) -> Result<Vec<String>, ConnectorError> {
        Ok(constraints
            .iter()
            .filter(|c| self.fail_unique.contains(&c.name))
            .map(|c| format!("unique constraint '{}' on '{table}' failed: simulated", c.name))
            .collect())
    }

    async fn create_foreign_keys(&self, table: &str, foreign_keys: &[ForeignKeyDescriptor]) -> Result<Vec<String>, ConnectorError> {
        Ok(foreign_keys
            .iter()
            .filter(|fk| self.fail_fk.contains(&fk.referenced_table))
            .map(|fk| format!("foreign key on '{table}' referencing '{}' failed: simulated", fk.referenced_table))
            .collect())
    }

    fn destination_key(&self) -> &'static str {
        "fake-dest"
    }
}
