use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Process-scoped configuration for the migration worker (§6): just the bind
/// address, loaded the same way the orchestrator loads `WORKER_PORT`/
/// `WORKER_HOST` so the two processes agree without any shared config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let host = vars.get("WORKER_HOST").cloned().unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match vars.get("WORKER_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: "WORKER_PORT", value: raw.clone() })?,
            None => 7878,
        };
        Ok(Config { host, port })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
