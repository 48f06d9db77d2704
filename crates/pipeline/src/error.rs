//! Pipeline-level error taxonomy (§7): one layer up from `ConnectorError`.
//! `TableFailed` is recovered locally by the engine (folded into
//! `MigrationResult.tables_failed`) and never propagates past `run`.

use connectors::ConnectorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("unsupported source/destination combination: {0}")]
    UnsupportedCombination(String),

    #[error("table '{table}' failed: {cause}")]
    TableFailed { table: String, cause: String },

    #[error("operation aborted: {0}")]
    OperationAborted(String),
}

impl From<ConnectorError> for PipelineError {
    fn from(err: ConnectorError) -> Self {
        PipelineError::OperationAborted(err.to_string())
    }
}
