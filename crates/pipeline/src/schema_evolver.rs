//! Schema Evolver (§4.4). Caches the column set observed at the destination
//! per `(run_id, table)` and diffs it against a batch's keyspace before each
//! write; missing columns are added as nullable, destination-widest-string
//! columns by routing a synthetic `DataType::Custom` descriptor through the
//! destination's own `map_types` — the same "unknown type degrades to widest
//! string" rule every destination adapter already implements for `mapTypes`.

use connectors::error::ConnectorError;
use connectors::DestinationAdapter;
use model::core::data_type::DataType;
use model::operation::table::ColumnDescriptor;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Default)]
pub struct SchemaEvolver {
    known_columns: Mutex<HashMap<(String, String), BTreeSet<String>>>,
}

impl SchemaEvolver {
    pub fn new() -> Self {
        SchemaEvolver::default()
    }

    /// Ensures every name in `batch_columns` exists at the destination,
    /// evolving the table if not. Returns the column names that were added.
    pub async fn ensure_columns(
        &self,
        run_id: &str,
        table: &str,
        source_type: &str,
        destination: &dyn DestinationAdapter,
        batch_columns: &BTreeSet<String>,
    ) -> Result<Vec<String>, ConnectorError> {
        let key = (run_id.to_string(), table.to_string());

        let known = {
            let mut cache = self.known_columns.lock().await;
            match cache.get(&key) {
                Some(known) => known.clone(),
                None => {
                    let existing = destination.existing_columns(table).await?;
                    cache.insert(key.clone(), existing.clone());
                    existing
                }
            }
        };

        let missing: Vec<String> = batch_columns.difference(&known).cloned().collect();
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let descriptors: Vec<ColumnDescriptor> = missing
            .iter()
            .map(|name| ColumnDescriptor {
                name: name.clone(),
                source_type: DataType::Custom("unknown".to_string()),
                nullable: true,
                default: None,
            })
            .collect();
        let mapped = destination.map_types(&descriptors, source_type);
        destination.evolve_schema(table, &mapped).await?;

        info!(run_id, table, added = ?missing, "schema evolved with new columns");

        let mut cache = self.known_columns.lock().await;
        cache.entry(key).or_default().extend(missing.iter().cloned());
        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use model::operation::table::{
        ForeignKeyDescriptor, IndexDescriptor, MappedColumn, UniqueConstraintDescriptor,
    };
    use model::records::row_batch::RowBatch;
    use std::sync::Mutex as StdMutex;

    struct FakeDestination {
        existing: BTreeSet<String>,
        evolved_with: StdMutex<Vec<MappedColumn>>,
    }

    #[async_trait]
    impl DestinationAdapter for FakeDestination {
        async fn connect(&mut self, _config: serde_json::Value, _source_type: &str) -> Result<(), ConnectorError> {
            Ok(())
        }
        async fn disconnect(&mut self) -> Result<(), ConnectorError> {
            Ok(())
        }
        fn map_types(&self, columns: &[ColumnDescriptor], _source_type: &str) -> Vec<MappedColumn> {
            columns
                .iter()
                .map(|c| MappedColumn {
                    name: c.name.clone(),
                    dest_type: "TEXT".to_string(),
                    nullable: true,
                    default: None,
                })
                .collect()
        }
        async fn create_table(
            &self,
            _table: &str,
            _columns: &[MappedColumn],
            _primary_key: &BTreeSet<String>,
        ) -> Result<(), ConnectorError> {
            Ok(())
        }
        async fn existing_columns(&self, _table: &str) -> Result<BTreeSet<String>, ConnectorError> {
            Ok(self.existing.clone())
        }
        async fn evolve_schema(&self, _table: &str, missing_columns: &[MappedColumn]) -> Result<(), ConnectorError> {
            self.evolved_with.lock().unwrap().extend(missing_columns.iter().cloned());
            Ok(())
        }
        async fn write_data(
            &self,
            _table: &str,
            _batch: &RowBatch,
            _primary_key: &BTreeSet<String>,
        ) -> Result<(), ConnectorError> {
            Ok(())
        }
        async fn create_indexes(&self, _table: &str, _indexes: &[IndexDescriptor]) -> Result<Vec<String>, ConnectorError> {
            Ok(Vec::new())
        }
        async fn create_unique_constraints(
            &self,
            _table: &str,
            _constraints: &[UniqueConstraintDescriptor],
        ) -> Result<Vec<String>, ConnectorError> {
            Ok(Vec::new())
        }
        async fn create_foreign_keys(&self, _table: &str, _foreign_keys: &[ForeignKeyDescriptor]) -> Result<Vec<String>, ConnectorError> {
            Ok(Vec::new())
        }
        fn destination_key(&self) -> &'static str {
            "fake"
        }
    }

    #[tokio::test]
    async fn adds_only_missing_columns_and_caches_result() {
        let dest = FakeDestination {
            existing: BTreeSet::from(["id".to_string(), "name".to_string()]),
            evolved_with: StdMutex::new(Vec::new()),
        };
        let evolver = SchemaEvolver::new();

        let batch_columns = BTreeSet::from(["id".to_string(), "name".to_string(), "email".to_string()]);
        let added = evolver
            .ensure_columns("run-1", "contacts", "crm-api", &dest, &batch_columns)
            .await
            .unwrap();
        assert_eq!(added, vec!["email".to_string()]);
        assert_eq!(dest.evolved_with.lock().unwrap().len(), 1);

        // Second call with the same columns should not re-evolve: cache already covers them.
        let added_again = evolver
            .ensure_columns("run-1", "contacts", "crm-api", &dest, &batch_columns)
            .await
            .unwrap();
        assert!(added_again.is_empty());
        assert_eq!(dest.evolved_with.lock().unwrap().len(), 1);
    }
}
