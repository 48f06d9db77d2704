use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid env file: {0}")]
    MalformedEnvFile(String),
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Loads system environment variables plus an optional `.env` override file,
/// in the manner of the teacher's `cli::env::EnvManager`.
struct EnvSource {
    vars: HashMap<String, String>,
}

impl EnvSource {
    fn new() -> Self {
        let vars = std::env::vars().collect();
        EnvSource { vars }
    }

    fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::EnvFile {
            path: path.display().to_string(),
            source: e,
        })?;

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(eq_pos) = line.find('=') else {
                return Err(ConfigError::MalformedEnvFile(format!(
                    "malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };
            let key = line[..eq_pos].trim();
            if key.is_empty() {
                return Err(ConfigError::MalformedEnvFile(format!(
                    "empty key at line {}",
                    line_num + 1
                )));
            }
            let value = Self::unquote(line[eq_pos + 1..].trim());
            self.vars.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// Process-scoped configuration for the orchestrator (§6).
#[derive(Debug, Clone)]
pub struct Config {
    pub worker_host: String,
    pub worker_port: u16,
    pub worker_launch_command: Option<String>,
    pub orchestrator_db_url: String,
    pub scheduler_interval: Duration,
    pub migrate_http_timeout: Duration,
    pub worker_startup_timeout: Duration,
    pub orchestrator_host: String,
    pub orchestrator_port: u16,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut env = EnvSource::new();
        let _ = env.load_from_file(".env");

        let worker_host = env.get("WORKER_HOST").unwrap_or("127.0.0.1").to_string();
        let worker_port = parse_or(&env, "WORKER_PORT", 7878)?;
        let worker_launch_command = env.get("WORKER_LAUNCH_COMMAND").map(str::to_string);
        let orchestrator_db_url = env
            .get("ORCHESTRATOR_DB_URL")
            .unwrap_or("./data/orchestrator.sled")
            .to_string();
        let scheduler_interval = Duration::from_secs(parse_or(&env, "SCHEDULER_INTERVAL", 5u64)?);
        let migrate_http_timeout =
            Duration::from_secs(parse_or(&env, "MIGRATE_HTTP_TIMEOUT", 3600u64)?);
        let worker_startup_timeout =
            Duration::from_secs(parse_or(&env, "WORKER_STARTUP_TIMEOUT", 60u64)?);
        let orchestrator_host = env.get("ORCHESTRATOR_HOST").unwrap_or("0.0.0.0").to_string();
        let orchestrator_port = parse_or(&env, "ORCHESTRATOR_PORT", 8080u16)?;

        Ok(Config {
            worker_host,
            worker_port,
            worker_launch_command,
            orchestrator_db_url,
            scheduler_interval,
            migrate_http_timeout,
            worker_startup_timeout,
            orchestrator_host,
            orchestrator_port,
        })
    }

    pub fn worker_base_url(&self) -> String {
        format!("http://{}:{}", self.worker_host, self.worker_port)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.orchestrator_host, self.orchestrator_port)
    }
}

fn parse_or<T: std::str::FromStr>(
    env: &EnvSource,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env.get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw.to_string() }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        // SAFETY: test-only, single-threaded access to the var under test.
        unsafe { std::env::remove_var("SCHEDULER_INTERVAL") };
        let env = EnvSource::new();
        let interval: u64 = parse_or(&env, "SCHEDULER_INTERVAL", 5u64).unwrap();
        assert_eq!(interval, 5);
    }

    #[test]
    fn malformed_value_is_startup_fatal() {
        unsafe { std::env::set_var("WORKER_STARTUP_TIMEOUT_TEST", "not-a-number") };
        let env = EnvSource::new();
        let result: Result<u64, ConfigError> =
            parse_or(&env, "WORKER_STARTUP_TIMEOUT_TEST", 60u64);
        assert!(result.is_err());
        unsafe { std::env::remove_var("WORKER_STARTUP_TIMEOUT_TEST") };
    }
}
