//! The Pipeline Engine (§4.2): given a resolved `(source_key, dest_key)` pair
//! and their configs, runs the full extract/translate/load algorithm and
//! returns a `MigrationResult`. Carries no persistent state of its own — a
//! fresh `PipelineEngine` (or at least a fresh call to `run`) is used per
//! `/migrate` request.

use crate::retry::RetryPolicy;
use crate::schema_evolver::SchemaEvolver;
use crate::{EventBus, Metrics};
use chrono::{DateTime, Utc};
use connectors::{AdapterRegistry, DestinationAdapter, SourceAdapter};
use model::events::{
    BatchWritten, ConstraintsApplied, OperationFinished, TableFailed, TableLoaded, TableStarted,
};
use model::operation::table::TableDescriptor;
use model::operation::types::{MigrationResult, OperationType, TableFailure, TableResult};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the engine needs for one migration run. `run_id` is opaque to
/// the engine and only used to scope the schema evolver's cache and tag
/// emitted events; the orchestrator/worker may use the `Operation.id`.
#[derive(Debug, Clone)]
pub struct MigrateRequest {
    pub run_id: String,
    pub source_type: String,
    pub dest_type: String,
    pub source_config: serde_json::Value,
    pub destination_config: serde_json::Value,
    pub operation_type: OperationType,
    pub since: Option<DateTime<Utc>>,
    /// Tables a prior attempt at this same operation already migrated
    /// successfully (R2). On a retry the caller passes these back in so the
    /// engine does not re-stream them; they are simply omitted from this
    /// run's `tables_migrated`, not re-counted.
    pub already_migrated: BTreeSet<String>,
}

pub struct PipelineEngine {
    registry: Arc<AdapterRegistry>,
    event_bus: EventBus,
    metrics: Metrics,
    retry_policy: RetryPolicy,
    schema_evolver: SchemaEvolver,
}

impl PipelineEngine {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        PipelineEngine {
            registry,
            event_bus: EventBus::new(),
            metrics: Metrics::new(),
            retry_policy: RetryPolicy::default(),
            schema_evolver: SchemaEvolver::new(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Step 1 (pre-flight) through step 5 (aggregate) of §4.2's algorithm.
    #[tracing::instrument(skip_all, fields(source_key = %req.source_type, dest_key = %req.dest_type, operation_type = ?req.operation_type))]
    pub async fn run(&self, req: MigrateRequest) -> MigrationResult {
        if req.source_type == req.dest_type {
            return self.abort(format!(
                "source_type and dest_type must differ, both were '{}'",
                req.source_type
            ));
        }

        let mut source = match self.registry.build_source(&req.source_type) {
            Ok(s) => s,
            Err(e) => return self.abort(e.to_string()),
        };
        let mut destination = match self.registry.build_destination(&req.dest_type) {
            Ok(d) => d,
            Err(e) => return self.abort(e.to_string()),
        };

        if let Err(e) = source.connect(req.source_config.clone()).await {
            return self.abort(format!("source connect failed: {e}"));
        }
        if let Err(e) = destination
            .connect(req.destination_config.clone(), &req.source_type)
            .await
        {
            let _ = source.disconnect().await;
            return self.abort(format!("destination connect failed: {e}"));
        }

        let result = self
            .run_tables(&req, source.as_mut(), destination.as_mut())
            .await;

        if let Err(e) = source.disconnect().await {
            warn!(error = %e, "source disconnect failed");
        }
        if let Err(e) = destination.disconnect().await {
            warn!(error = %e, "destination disconnect failed");
        }

        self.event_bus
            .publish(OperationFinished {
                run_id: req.run_id.clone(),
                success: result.success,
                total_records: result.total_records,
                timestamp: Utc::now(),
            })
            .await;

        result
    }

    fn abort(&self, cause: String) -> MigrationResult {
        warn!(cause = %cause, "operation aborted before any table was processed");
        let mut result = MigrationResult::empty();
        result.errors.push(cause);
        result.success = false;
        result
    }

    /// Steps 2-5: enumerate tables, run the per-table loop with retry, then
    /// the deferred cross-table foreign-key pass.
    async fn run_tables(
        &self,
        req: &MigrateRequest,
        source: &mut dyn SourceAdapter,
        destination: &mut dyn DestinationAdapter,
    ) -> MigrationResult {
        let mut result = MigrationResult::empty();

        let tables = match source.list_tables().await {
            Ok(t) => t,
            Err(e) => {
                result.errors.push(format!("list_tables failed: {e}"));
                result.success = false;
                return result;
            }
        };

        let mut loaded_descriptors: Vec<(String, TableDescriptor)> = Vec::new();

        for table in tables {
            if req.already_migrated.contains(&table) {
                info!(table = %table, "skipping table already migrated on a prior attempt");
                continue;
            }
            let mut attempt = 0usize;
            loop {
                match self.migrate_table(req, &table, source, destination).await {
                    Ok((table_result, desc, constraint_failures)) => {
                        result.errors.extend(constraint_failures);
                        loaded_descriptors.push((table.clone(), desc));
                        result.tables_migrated.push(table_result);
                        break;
                    }
                    Err(cause) => {
                        attempt += 1;
                        if attempt >= self.retry_policy.max_attempts {
                            self.metrics.increment_failures(1);
                            self.event_bus
                                .publish(TableFailed {
                                    run_id: req.run_id.clone(),
                                    table: table.clone(),
                                    error: cause.clone(),
                                    timestamp: Utc::now(),
                                })
                                .await;
                            result.tables_failed.push(TableFailure {
                                table: table.clone(),
                                error: cause,
                            });
                            break;
                        }
                        self.metrics.increment_retries(1);
                        warn!(table = %table, attempt, cause = %cause, "retrying failed table");
                    }
                }
            }
        }

        // Foreign keys are deferred to one final pass after every table has
        // loaded (§9), preserving referential ordering across tables.
        for (table, desc) in &loaded_descriptors {
            if desc.foreign_keys.is_empty() {
                continue;
            }
            match destination.create_foreign_keys(table, &desc.foreign_keys).await {
                Ok(failures) => result.errors.extend(failures),
                Err(e) => {
                    warn!(table = %table, error = %e, "foreign key creation failed");
                    result
                        .errors
                        .push(format!("foreign keys for '{table}' failed: {e}"));
                }
            }
        }

        result.finalize()
    }

    /// Steps 3.a-3.h for a single table (minus foreign keys, deferred to the
    /// caller's final pass). On any failure the table is abandoned: the
    /// caller decides whether to retry or record it as failed.
    async fn migrate_table(
        &self,
        req: &MigrateRequest,
        table: &str,
        source: &mut dyn SourceAdapter,
        destination: &mut dyn DestinationAdapter,
    ) -> Result<(TableResult, TableDescriptor, Vec<String>), String> {
        self.event_bus
            .publish(TableStarted {
                run_id: req.run_id.clone(),
                table: table.to_string(),
                timestamp: Utc::now(),
            })
            .await;

        let desc = source
            .get_schema(table)
            .await
            .map_err(|e| format!("schema introspection failed: {e}"))?;

        let mapped = destination.map_types(&desc.columns, &req.source_type);
        destination
            .create_table(table, &mapped, &desc.primary_key)
            .await
            .map_err(|e| format!("create_table failed: {e}"))?;

        let column_names: BTreeSet<String> = desc.column_names().into_iter().collect();
        if !column_names.is_empty() {
            self.schema_evolver
                .ensure_columns(&req.run_id, table, &req.source_type, destination, &column_names)
                .await
                .map_err(|e| format!("schema evolution failed: {e}"))?;
        }

        // Batch size is chosen per source family (§4.2.d) by the adapter
        // itself via `preferred_batch_size`, never a single engine-wide constant.
        let batch_size = source.preferred_batch_size();
        let mut stream = match req.operation_type {
            OperationType::Full => source
                .read_data(table, batch_size)
                .await
                .map_err(|e| format!("open stream failed: {e}"))?,
            OperationType::Incremental => {
                let since = req
                    .since
                    .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is valid"));
                source
                    .read_incremental(table, since, batch_size)
                    .await
                    .map_err(|e| format!("open incremental stream failed: {e}"))?
            }
        };

        let mut records = 0u64;
        let mut batch_count = 0u64;
        loop {
            let batch = stream
                .next_batch()
                .await
                .map_err(|e| format!("stream read failed: {e}"))?;
            let Some(batch) = batch else { break };

            if !batch.is_empty() {
                let batch_columns: BTreeSet<String> = batch.rows[0]
                    .column_names()
                    .map(|s| s.to_string())
                    .collect();
                self.schema_evolver
                    .ensure_columns(&req.run_id, table, &req.source_type, destination, &batch_columns)
                    .await
                    .map_err(|e| format!("schema evolution failed: {e}"))?;

                destination
                    .write_data(table, &batch, &desc.primary_key)
                    .await
                    .map_err(|e| format!("batch write failed: {e}"))?;

                records += batch.len() as u64;
                batch_count += 1;
                self.metrics.increment_records(batch.len() as u64).await;
                self.metrics.increment_batches(1);

                // Progress logging density (§4.2.g): every batch for
                // small-batch (API) sources, every tenth for large-batch
                // (SQL) sources, so operators see liveness within seconds.
                if source.logs_every_batch() || batch_count % 10 == 0 {
                    info!(table, batch = batch_count, rows_in_batch = batch.len(), rows_total = records, "batch written");
                    self.event_bus
                        .publish(BatchWritten {
                            run_id: req.run_id.clone(),
                            table: table.to_string(),
                            rows_in_batch: batch.len() as u64,
                            rows_total: records,
                            timestamp: Utc::now(),
                        })
                        .await;
                }
            }

            if batch.reached_end {
                break;
            }
        }

        // Post-load constraints (§4.2.h): per-object failures are non-fatal
        // (`PostLoadConstraintError`, §7) and collected rather than failing
        // the table, so it can reach `ConstraintsPartial` instead of
        // `Failed`. Only a connector-level error (lost connection) aborts
        // the table via `?`.
        let mut constraint_failures = destination.create_indexes(table, &desc.indexes).await.map_err(|e| {
            format!("index creation for '{table}' could not be attempted: {e}")
        })?;
        constraint_failures.extend(
            destination
                .create_unique_constraints(table, &desc.unique_constraints)
                .await
                .map_err(|e| format!("unique constraint creation for '{table}' could not be attempted: {e}"))?,
        );

        if !constraint_failures.is_empty() {
            warn!(table, count = constraint_failures.len(), "table loaded with unapplied constraints");
        }

        self.event_bus
            .publish(ConstraintsApplied {
                run_id: req.run_id.clone(),
                table: table.to_string(),
                failures: constraint_failures.clone(),
                timestamp: Utc::now(),
            })
            .await;

        self.event_bus
            .publish(TableLoaded {
                run_id: req.run_id.clone(),
                table: table.to_string(),
                records,
                timestamp: Utc::now(),
            })
            .await;

        Ok((
            TableResult {
                table: table.to_string(),
                records,
            },
            desc,
            constraint_failures,
        ))
    }
}
