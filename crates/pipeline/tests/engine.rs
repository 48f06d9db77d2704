//! Integration coverage for `PipelineEngine::run`/`migrate_table` against
//! the in-memory fakes in `common`, exercising the engine's testable
//! properties end to end without any real network or database.

mod common;

use chrono::{Duration, Utc};
use common::{row, table_descriptor, FakeDestination, FakeSource};
use connectors::AdapterRegistry;
use model::core::value::Value;
use model::events::ConstraintsApplied;
use model::operation::table::{ForeignKeyDescriptor, IndexDescriptor, UniqueConstraintDescriptor};
use model::operation::types::OperationType;
use pipeline::{EventBus, MigrateRequest, PipelineEngine};
use std::collections::BTreeSet;
use std::sync::Arc;

fn base_request(run_id: &str, source_type: &str, dest_type: &str) -> MigrateRequest {
    MigrateRequest {
        run_id: run_id.to_string(),
        source_type: source_type.to_string(),
        dest_type: dest_type.to_string(),
        source_config: serde_json::json!({}),
        destination_config: serde_json::json!({}),
        operation_type: OperationType::Full,
        since: None,
        already_migrated: BTreeSet::new(),
    }
}

// P2: `success` must be exactly `tables_failed.is_empty()`.
#[tokio::test]
async fn p2_success_matches_empty_tables_failed() {
    let source = FakeSource::new(
        vec![("contacts", table_descriptor("contacts", true), vec![row(1, "a", Utc::now())])],
        500,
    );
    let dest = FakeDestination::new();
    let mut registry = AdapterRegistry::new();
    source.clone().register(&mut registry, "fake-source");
    dest.clone().register(&mut registry, "fake-dest");

    let engine = PipelineEngine::new(Arc::new(registry));
    let result = engine.run(base_request("r1", "fake-source", "fake-dest")).await;
    assert!(result.success);
    assert!(result.tables_failed.is_empty());
    assert_eq!(result.tables_migrated.len(), 1);

    // Now make the write permanently fail so the table is abandoned.
    let failing_dest = FakeDestination::new().failing_write_for("contacts");
    let mut registry2 = AdapterRegistry::new();
    source.register(&mut registry2, "fake-source");
    failing_dest.register(&mut registry2, "fake-dest");
    let engine2 = PipelineEngine::new(Arc::new(registry2));
    let result2 = engine2.run(base_request("r2", "fake-source", "fake-dest")).await;
    assert!(!result2.success);
    assert!(!result2.tables_failed.is_empty());
    assert_eq!(result2.success, result2.tables_failed.is_empty());
}

// P3: pre-flight rejects an unregistered key or equal source/dest keys,
// without ever touching the adapters.
#[tokio::test]
async fn p3_preflight_rejects_without_side_effects() {
    let source = FakeSource::new(vec![], 500);
    let dest = FakeDestination::new();
    let mut registry = AdapterRegistry::new();
    source.clone().register(&mut registry, "same-key");
    dest.clone().register(&mut registry, "same-key");
    let engine = PipelineEngine::new(Arc::new(registry));

    let result = engine.run(base_request("r1", "same-key", "same-key")).await;
    assert!(!result.success);
    assert!(!result.errors.is_empty());
    assert_eq!(source.calls.connects.load(std::sync::atomic::Ordering::SeqCst), 0);

    let mut registry2 = AdapterRegistry::new();
    source.clone().register(&mut registry2, "fake-source");
    // "fake-dest" deliberately left unregistered.
    let engine2 = PipelineEngine::new(Arc::new(registry2));
    let result2 = engine2.run(base_request("r2", "fake-source", "fake-dest")).await;
    assert!(!result2.success);
    assert!(!result2.errors.is_empty());
    assert_eq!(source.calls.connects.load(std::sync::atomic::Ordering::SeqCst), 0);
}

// P4: connect/disconnect on every exit path come in matched pairs.
#[tokio::test]
async fn p4_connect_disconnect_matched_pairs() {
    let source = FakeSource::new(
        vec![("contacts", table_descriptor("contacts", true), vec![row(1, "a", Utc::now())])],
        500,
    );
    let dest = FakeDestination::new();
    let mut registry = AdapterRegistry::new();
    source.clone().register(&mut registry, "fake-source");
    dest.clone().register(&mut registry, "fake-dest");

    let engine = PipelineEngine::new(Arc::new(registry));
    let _ = engine.run(base_request("r1", "fake-source", "fake-dest")).await;

    use std::sync::atomic::Ordering;
    assert_eq!(source.calls.connects.load(Ordering::SeqCst), 1);
    assert_eq!(source.calls.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(dest.calls.connects.load(Ordering::SeqCst), 1);
    assert_eq!(dest.calls.disconnects.load(Ordering::SeqCst), 1);
}

// P5: rows read equal rows written, modulo PK dedup; append-only
// destinations preserve multiplicity instead.
#[tokio::test]
async fn p5_read_equals_written_modulo_pk_dedup() {
    let now = Utc::now();
    let source = FakeSource::new(
        vec![(
            "contacts",
            table_descriptor("contacts", true),
            vec![row(1, "first", now), row(1, "updated", now), row(2, "b", now)],
        )],
        500,
    );
    let dest = FakeDestination::new();
    let mut registry = AdapterRegistry::new();
    source.register(&mut registry, "fake-source");
    dest.clone().register(&mut registry, "fake-dest");

    let engine = PipelineEngine::new(Arc::new(registry));
    let result = engine.run(base_request("r1", "fake-source", "fake-dest")).await;
    assert!(result.success);
    // Three rows read, but id=1 was upserted twice, so only 2 distinct rows land.
    assert_eq!(dest.row_count("contacts"), 2);

    let last_row_one = dest
        .upserted_rows("contacts")
        .into_iter()
        .find(|r| r.get_value("id") == Value::Int(1))
        .expect("row id=1 present");
    assert_eq!(last_row_one.get_value("name"), Value::String("updated".to_string()));
}

#[tokio::test]
async fn p5_append_only_destination_preserves_multiplicity() {
    let now = Utc::now();
    let source = FakeSource::new(
        vec![(
            "events",
            table_descriptor("events", false),
            vec![row(1, "click", now), row(1, "click", now), row(2, "view", now)],
        )],
        500,
    );
    let dest = FakeDestination::new();
    let mut registry = AdapterRegistry::new();
    source.register(&mut registry, "fake-source");
    dest.clone().register(&mut registry, "fake-dest");

    let engine = PipelineEngine::new(Arc::new(registry));
    let result = engine.run(base_request("r1", "fake-source", "fake-dest")).await;
    assert!(result.success);
    assert_eq!(dest.appended_rows("events").len(), 3);
}

// P6: incremental reads only yield rows strictly past the watermark.
#[tokio::test]
async fn p6_incremental_excludes_rows_at_or_before_watermark() {
    let since = Utc::now() - Duration::hours(1);
    let source = FakeSource::new(
        vec![(
            "contacts",
            table_descriptor("contacts", true),
            vec![
                row(1, "stale", since - Duration::minutes(1)),
                row(2, "at-watermark", since),
                row(3, "fresh", since + Duration::minutes(1)),
            ],
        )],
        500,
    );
    let dest = FakeDestination::new();
    let mut registry = AdapterRegistry::new();
    source.clone().register(&mut registry, "fake-source");
    dest.clone().register(&mut registry, "fake-dest");

    let mut req = base_request("r1", "fake-source", "fake-dest");
    req.operation_type = OperationType::Incremental;
    req.since = Some(since);

    let engine = PipelineEngine::new(Arc::new(registry));
    let result = engine.run(req).await;
    assert!(result.success);
    assert_eq!(dest.row_count("contacts"), 1);
    let remaining = dest.upserted_rows("contacts");
    assert_eq!(remaining[0].get_value("id"), Value::Int(3));

    let reads = source.calls.incremental_reads.lock().unwrap();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].1, since);
}

// P7: API-shaped sources read in small batches (<=100), SQL-shaped sources
// in large ones (>=500); the engine never hardcodes one constant.
#[tokio::test]
async fn p7_batch_size_is_chosen_per_source_family() {
    let now = Utc::now();
    let rows: Vec<_> = (0..5).map(|i| row(i, "r", now)).collect();

    let api_source = FakeSource::new(vec![("widgets", table_descriptor("widgets", true), rows.clone())], 50)
        .logging_every_batch();
    let dest = FakeDestination::new();
    let mut registry = AdapterRegistry::new();
    api_source.clone().register(&mut registry, "fake-source");
    dest.clone().register(&mut registry, "fake-dest");
    let engine = PipelineEngine::new(Arc::new(registry));
    let result = engine.run(base_request("r1", "fake-source", "fake-dest")).await;
    assert!(result.success);
    let reads = api_source.calls.full_reads.lock().unwrap();
    assert!(reads[0].1 <= 100, "API batch size should be <=100, was {}", reads[0].1);
    drop(reads);

    let sql_source = FakeSource::new(vec![("widgets", table_descriptor("widgets", true), rows)], 750);
    let dest2 = FakeDestination::new();
    let mut registry2 = AdapterRegistry::new();
    sql_source.clone().register(&mut registry2, "fake-source");
    dest2.register(&mut registry2, "fake-dest");
    let engine2 = PipelineEngine::new(Arc::new(registry2));
    let result2 = engine2.run(base_request("r2", "fake-source", "fake-dest")).await;
    assert!(result2.success);
    let reads2 = sql_source.calls.full_reads.lock().unwrap();
    assert!(reads2[0].1 >= 500, "SQL batch size should be >=500, was {}", reads2[0].1);
}

// P8: every field seen in any yielded batch ends up as a destination column.
#[tokio::test]
async fn p8_schema_evolves_for_fields_outside_the_declared_schema() {
    use model::core::data_type::DataType;
    use model::core::value::FieldValue;
    use model::records::row::RowData;

    let now = Utc::now();
    let first_batch_row = row(1, "a", now);
    let second_batch_row = RowData::new(
        "row",
        vec![
            FieldValue { name: "id".into(), value: Some(Value::Int(2)), data_type: DataType::Long },
            FieldValue { name: "name".into(), value: Some(Value::String("b".into())), data_type: DataType::VarChar },
            FieldValue { name: "updated_at".into(), value: Some(Value::Timestamp(now)), data_type: DataType::Timestamp },
            FieldValue { name: "extra_field".into(), value: Some(Value::String("new".into())), data_type: DataType::VarChar },
        ],
    );

    // batch_size=1 forces each row into its own batch so the schema
    // evolver's per-batch diff actually sees the wider second batch.
    let source = FakeSource::new(
        vec![("contacts", table_descriptor("contacts", true), vec![first_batch_row, second_batch_row])],
        1,
    );
    let dest = FakeDestination::new();
    let mut registry = AdapterRegistry::new();
    source.register(&mut registry, "fake-source");
    dest.clone().register(&mut registry, "fake-dest");

    let engine = PipelineEngine::new(Arc::new(registry));
    let result = engine.run(base_request("r1", "fake-source", "fake-dest")).await;
    assert!(result.success);
    assert!(dest.columns_of("contacts").contains("extra_field"));
}

// R1: rerunning against a primary-keyed destination converges to the same
// final row set as running once (write-upsert).
#[tokio::test]
async fn r1_rerun_is_idempotent_on_primary_key() {
    let now = Utc::now();
    let source = FakeSource::new(
        vec![("contacts", table_descriptor("contacts", true), vec![row(1, "a", now), row(2, "b", now)])],
        500,
    );
    let dest = FakeDestination::new();
    let mut registry = AdapterRegistry::new();
    source.clone().register(&mut registry, "fake-source");
    dest.clone().register(&mut registry, "fake-dest");
    let engine = PipelineEngine::new(Arc::new(registry));
    let first = engine.run(base_request("r1", "fake-source", "fake-dest")).await;
    assert!(first.success);
    let after_first = dest.upserted_rows("contacts");

    let mut registry2 = AdapterRegistry::new();
    source.register(&mut registry2, "fake-source");
    dest.clone().register(&mut registry2, "fake-dest");
    let engine2 = PipelineEngine::new(Arc::new(registry2));
    let second = engine2.run(base_request("r2", "fake-source", "fake-dest")).await;
    assert!(second.success);
    let after_second = dest.upserted_rows("contacts");

    assert_eq!(after_first.len(), after_second.len());
    assert_eq!(dest.row_count("contacts"), 2);
}

// R2: on a retry, tables already counted as migrated are not re-streamed.
#[tokio::test]
async fn r2_retry_does_not_restream_already_migrated_tables() {
    let now = Utc::now();
    let source = FakeSource::new(
        vec![
            ("accounts", table_descriptor("accounts", true), vec![row(1, "a", now)]),
            ("orders", table_descriptor("orders", true), vec![row(1, "o", now)]),
        ],
        500,
    );
    let dest = FakeDestination::new().failing_write_for("orders");
    let mut registry = AdapterRegistry::new();
    source.clone().register(&mut registry, "fake-source");
    dest.clone().register(&mut registry, "fake-dest");

    let engine = PipelineEngine::new(Arc::new(registry));
    let first = engine.run(base_request("r1", "fake-source", "fake-dest")).await;
    assert!(!first.success);
    assert_eq!(first.tables_migrated.len(), 1);
    assert_eq!(first.tables_migrated[0].table, "accounts");
    assert_eq!(first.tables_failed.len(), 1);
    assert_eq!(first.tables_failed[0].table, "orders");

    let accounts_reads_before = source.calls.full_reads.lock().unwrap().len();

    // The transient fault behind the "orders" write clears up before retry.
    dest.stop_failing_write("orders");

    let mut retry_req = base_request("r2", "fake-source", "fake-dest");
    retry_req.already_migrated = BTreeSet::from(["accounts".to_string()]);

    let mut registry2 = AdapterRegistry::new();
    source.clone().register(&mut registry2, "fake-source");
    dest.clone().register(&mut registry2, "fake-dest");
    let engine2 = PipelineEngine::new(Arc::new(registry2));
    let second = engine2.run(retry_req).await;

    assert!(second.success);
    assert_eq!(second.tables_migrated.len(), 1);
    assert_eq!(second.tables_migrated[0].table, "orders");

    let accounts_reads_after = source
        .calls
        .full_reads
        .lock()
        .unwrap()
        .iter()
        .filter(|(table, _)| table == "accounts")
        .count();
    assert_eq!(
        accounts_reads_after, accounts_reads_before,
        "accounts must not be re-streamed on retry"
    );
}

// B1: an empty table is still counted as migrated, with records=0.
#[tokio::test]
async fn b1_empty_table_counts_as_migrated_with_zero_records() {
    let source = FakeSource::new(vec![("empty_table", table_descriptor("empty_table", true), vec![])], 500);
    let dest = FakeDestination::new();
    let mut registry = AdapterRegistry::new();
    source.register(&mut registry, "fake-source");
    dest.clone().register(&mut registry, "fake-dest");

    let engine = PipelineEngine::new(Arc::new(registry));
    let result = engine.run(base_request("r1", "fake-source", "fake-dest")).await;
    assert!(result.success);
    assert_eq!(result.tables_migrated.len(), 1);
    assert_eq!(result.tables_migrated[0].records, 0);
    assert_eq!(dest.row_count("empty_table"), 0);
    assert!(dest.calls.create_table.lock().unwrap().contains(&"empty_table".to_string()));
}

// B3: a pre-existing destination table with a superset schema is left
// alone by `create_table`, and data still loads.
#[tokio::test]
async fn b3_preexisting_superset_schema_is_a_create_table_noop() {
    let now = Utc::now();
    let source = FakeSource::new(
        vec![("contacts", table_descriptor("contacts", true), vec![row(1, "a", now)])],
        500,
    );
    let dest = FakeDestination::new();
    dest.seed_existing_table("contacts", &["id", "name", "updated_at", "legacy_column"]);
    let mut registry = AdapterRegistry::new();
    source.register(&mut registry, "fake-source");
    dest.clone().register(&mut registry, "fake-dest");

    let engine = PipelineEngine::new(Arc::new(registry));
    let result = engine.run(base_request("r1", "fake-source", "fake-dest")).await;
    assert!(result.success);
    assert!(dest.columns_of("contacts").contains("legacy_column"));
    assert_eq!(dest.row_count("contacts"), 1);
}

// B4: a pre-existing destination table narrower than the source schema is
// widened by the Schema Evolver before the first write.
#[tokio::test]
async fn b4_preexisting_narrower_schema_is_evolved() {
    let now = Utc::now();
    let source = FakeSource::new(
        vec![("contacts", table_descriptor("contacts", true), vec![row(1, "a", now)])],
        500,
    );
    let dest = FakeDestination::new();
    dest.seed_existing_table("contacts", &["id"]);
    let mut registry = AdapterRegistry::new();
    source.register(&mut registry, "fake-source");
    dest.clone().register(&mut registry, "fake-dest");

    let engine = PipelineEngine::new(Arc::new(registry));
    let result = engine.run(base_request("r1", "fake-source", "fake-dest")).await;
    assert!(result.success);
    let columns = dest.columns_of("contacts");
    assert!(columns.contains("name"));
    assert!(columns.contains("updated_at"));
    assert_eq!(dest.row_count("contacts"), 1);
}

// Post-load constraint failures (§4.2.h): non-fatal, collected into
// `MigrationResult.errors` and the `ConstraintsApplied` event instead of
// being logged and dropped.
#[tokio::test]
async fn post_load_constraint_failures_are_recorded_not_swallowed() {
    let now = Utc::now();
    let mut desc = table_descriptor("contacts", true);
    desc.indexes = vec![IndexDescriptor {
        name: "idx_name".to_string(),
        columns: vec!["name".to_string()],
    }];
    desc.unique_constraints = vec![UniqueConstraintDescriptor {
        name: "uq_name".to_string(),
        columns: vec!["name".to_string()],
    }];
    let source = FakeSource::new(vec![("contacts", desc, vec![row(1, "a", now)])], 500);
    let dest = FakeDestination::new()
        .failing_index("idx_name")
        .failing_unique_constraint("uq_name");
    let mut registry = AdapterRegistry::new();
    source.register(&mut registry, "fake-source");
    dest.register(&mut registry, "fake-dest");

    let bus = EventBus::new();
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    bus.subscribe::<ConstraintsApplied>(tx).await;

    let engine = PipelineEngine::new(Arc::new(registry)).with_event_bus(bus);
    let result = engine.run(base_request("r1", "fake-source", "fake-dest")).await;

    // Non-fatal: the table is still counted as migrated (`ConstraintsPartial`
    // semantics, not `Failed`), but both failures are visible in `errors`.
    assert!(result.success);
    assert_eq!(result.tables_migrated.len(), 1);
    assert!(result.errors.iter().any(|e| e.contains("idx_name")));
    assert!(result.errors.iter().any(|e| e.contains("uq_name")));

    let published = rx.recv().await.expect("ConstraintsApplied published");
    assert_eq!(published.failures.len(), 2);
}

// Deferred foreign-key pass also surfaces its non-fatal failures.
#[tokio::test]
async fn deferred_foreign_key_failures_are_recorded() {
    let now = Utc::now();
    let mut desc = table_descriptor("orders", true);
    desc.foreign_keys = vec![ForeignKeyDescriptor {
        columns: vec!["customer_id".to_string()],
        referenced_table: "customers".to_string(),
        referenced_columns: vec!["id".to_string()],
    }];
    let source = FakeSource::new(vec![("orders", desc, vec![row(1, "o", now)])], 500);
    let dest = FakeDestination::new().failing_foreign_key("customers");
    let mut registry = AdapterRegistry::new();
    source.register(&mut registry, "fake-source");
    dest.register(&mut registry, "fake-dest");

    let engine = PipelineEngine::new(Arc::new(registry));
    let result = engine.run(base_request("r1", "fake-source", "fake-dest")).await;
    assert!(result.success);
    assert!(result.errors.iter().any(|e| e.contains("customers")));
}
