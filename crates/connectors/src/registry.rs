//! `AdapterRegistry` (§3, §4.1): resolves the string type tags carried by an
//! `OperationConfig`'s `source`/`destination` blocks into fresh adapter
//! instances. A fresh instance is built for every migration — adapters are
//! never pooled or shared across concurrent operations, since they own
//! per-migration connection state.

use crate::api::{crm_source::CrmSource, devops_source::DevOpsSource};
use crate::columnar::dest::ColumnarDestination;
use crate::contracts::{DestinationAdapter, SourceAdapter};
use crate::error::ConnectorError;
use crate::sql::{
    mssql_source::MsSqlSource,
    mysql_dest::MySqlDestination,
    mysql_source::MySqlSource,
    postgres_dest::PostgresDestination,
    postgres_source::PostgresSource,
};
use std::collections::HashMap;

type SourceFactory = Box<dyn Fn() -> Box<dyn SourceAdapter> + Send + Sync>;
type DestinationFactory = Box<dyn Fn() -> Box<dyn DestinationAdapter> + Send + Sync>;

/// Keyed by the `type` tag on an `OperationConfig`'s source/destination
/// block (e.g. `"postgres-like"`, `"crm-api"`, `"columnar"`).
pub struct AdapterRegistry {
    sources: HashMap<&'static str, SourceFactory>,
    destinations: HashMap<&'static str, DestinationFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        AdapterRegistry {
            sources: HashMap::new(),
            destinations: HashMap::new(),
        }
    }

    /// Registers every adapter this crate ships (§4.1 end-to-end scenarios).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_source("postgres-like", || Box::new(PostgresSource::new()));
        registry.register_source("mysql-like", || Box::new(MySqlSource::new()));
        registry.register_source("sqlserver-like", || Box::new(MsSqlSource::new()));
        registry.register_source("crm-api", || Box::new(CrmSource::new()));
        registry.register_source("devops-api", || Box::new(DevOpsSource::new()));

        registry.register_destination("postgres-like", || Box::new(PostgresDestination::new()));
        registry.register_destination("mysql-like", || Box::new(MySqlDestination::new()));
        registry.register_destination("columnar", || Box::new(ColumnarDestination::new()));
        registry
    }

    pub fn register_source<F>(&mut self, key: &'static str, factory: F)
    where
        F: Fn() -> Box<dyn SourceAdapter> + Send + Sync + 'static,
    {
        self.sources.insert(key, Box::new(factory));
    }

    pub fn register_destination<F>(&mut self, key: &'static str, factory: F)
    where
        F: Fn() -> Box<dyn DestinationAdapter> + Send + Sync + 'static,
    {
        self.destinations.insert(key, Box::new(factory));
    }

    pub fn build_source(&self, key: &str) -> Result<Box<dyn SourceAdapter>, ConnectorError> {
        self.sources
            .get(key)
            .map(|factory| factory())
            .ok_or_else(|| ConnectorError::Unsupported(format!("no source adapter registered for '{key}'")))
    }

    pub fn build_destination(&self, key: &str) -> Result<Box<dyn DestinationAdapter>, ConnectorError> {
        self.destinations
            .get(key)
            .map(|factory| factory())
            .ok_or_else(|| {
                ConnectorError::Unsupported(format!("no destination adapter registered for '{key}'"))
            })
    }

    /// Registered source keys, for the worker's `/health` response (§6).
    pub fn source_keys(&self) -> Vec<&'static str> {
        self.sources.keys().copied().collect()
    }

    pub fn destination_keys(&self) -> Vec<&'static str> {
        self.destinations.keys().copied().collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_source_key_is_unsupported_not_a_panic() {
        let registry = AdapterRegistry::with_defaults();
        let err = registry.build_source("nonexistent").unwrap_err();
        assert!(matches!(err, ConnectorError::Unsupported(_)));
    }

    #[test]
    fn every_default_source_key_resolves() {
        let registry = AdapterRegistry::with_defaults();
        for key in ["postgres-like", "mysql-like", "sqlserver-like", "crm-api", "devops-api"] {
            assert!(registry.build_source(key).is_ok(), "missing source: {key}");
        }
    }
}
