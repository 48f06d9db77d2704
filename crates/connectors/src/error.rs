//! Adapter error taxonomy (§7.1). Every adapter method normalises its
//! underlying driver/transport error into one of these variants rather than
//! leaking a driver-specific error type or a bare `String`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("schema introspection failed: {0}")]
    Schema(String),

    #[error("type mapping failed: {0}")]
    TypeMapping(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("constraint creation failed: {0}")]
    Constraint(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unsupported adapter combination: {0}")]
    Unsupported(String),
}

impl From<tokio_postgres::Error> for ConnectorError {
    fn from(err: tokio_postgres::Error) -> Self {
        ConnectorError::Write(err.to_string())
    }
}

impl From<mysql_async::Error> for ConnectorError {
    fn from(err: mysql_async::Error) -> Self {
        ConnectorError::Write(err.to_string())
    }
}

impl From<tiberius::error::Error> for ConnectorError {
    fn from(err: tiberius::error::Error) -> Self {
        ConnectorError::Write(err.to_string())
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ConnectorError::Connection(err.to_string())
        } else {
            ConnectorError::Read(err.to_string())
        }
    }
}

impl From<clickhouse::error::Error> for ConnectorError {
    fn from(err: clickhouse::error::Error) -> Self {
        ConnectorError::Write(err.to_string())
    }
}
