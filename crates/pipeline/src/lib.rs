//! The Pipeline Engine (§4.2): the per-request extract/translate/load
//! algorithm that the worker's `/migrate` handler drives. Owns no state of
//! its own beyond what is created fresh for a single `run` call.

pub mod engine;
pub mod error;
pub mod event_bus;
pub mod metrics;
pub mod retry;
pub mod schema_evolver;

pub use engine::{MigrateRequest, PipelineEngine};
pub use error::PipelineError;
pub use event_bus::EventBus;
pub use metrics::{Metrics, MetricsSnapshot};
pub use retry::RetryPolicy;
pub use schema_evolver::SchemaEvolver;
