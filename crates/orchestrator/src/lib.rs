//! The orchestrator process (§2.1, §4.3): owns the Operation lifecycle, the
//! scheduler ticker, the worker supervisor, and the HTTP surface the CRUD
//! layer talks to. The pipeline engine itself lives in the `worker` process;
//! this crate never touches an adapter directly.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod supervisor;
pub mod worker_client;

pub use config::Config;
pub use error::OrchestratorError;
pub use lifecycle::Lifecycle;
pub use store::OperationStore;
pub use supervisor::Supervisor;
