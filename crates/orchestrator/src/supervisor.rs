use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use model::operation::service_process::{ProcessState, ServiceProcess};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::OrchestratorError;
use crate::worker_client::WorkerClient;

const WORKER_ID: &str = "migration-worker";
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Tracks (and, when needed, launches) the single migration worker process
/// (§4.3 Supervisor). Guarded by one mutex: single-writer, per §5.
pub struct Supervisor {
    config: Config,
    client: WorkerClient,
    processes: Mutex<HashMap<String, ServiceProcess>>,
    children: Mutex<HashMap<String, Child>>,
}

impl Supervisor {
    pub fn new(config: Config) -> Result<Self, OrchestratorError> {
        let client = WorkerClient::new(config.worker_base_url(), config.migrate_http_timeout)?;
        let mut processes = HashMap::new();
        processes.insert(
            WORKER_ID.to_string(),
            ServiceProcess::stopped(WORKER_ID, config.worker_base_url()),
        );
        Ok(Supervisor {
            config,
            client,
            processes: Mutex::new(processes),
            children: Mutex::new(HashMap::new()),
        })
    }

    pub fn client(&self) -> &WorkerClient {
        &self.client
    }

    pub async fn snapshot(&self) -> ServiceProcess {
        self.processes
            .lock()
            .await
            .get(WORKER_ID)
            .cloned()
            .unwrap_or_else(|| ServiceProcess::stopped(WORKER_ID, self.config.worker_base_url()))
    }

    /// Ensures the worker is reachable before an `execute` proceeds (§4.3).
    pub async fn ensure_worker(&self) -> Result<(), OrchestratorError> {
        if self.client.health().await.is_ok() {
            self.mark_running().await;
            return Ok(());
        }

        {
            let mut processes = self.processes.lock().await;
            let entry = processes
                .entry(WORKER_ID.to_string())
                .or_insert_with(|| ServiceProcess::stopped(WORKER_ID, self.config.worker_base_url()));
            if entry.is_starting_or_running() {
                return self.poll_until_healthy().await;
            }
            entry.state = ProcessState::Starting;
            entry.started_at = Some(Utc::now());
        }

        let Some(launch_command) = self.config.worker_launch_command.clone() else {
            self.mark_failed().await;
            return Err(OrchestratorError::WorkerUnavailable(
                "worker is unreachable and no WORKER_LAUNCH_COMMAND is configured".into(),
            ));
        };

        info!(command = %launch_command, "launching migration worker process");
        let child = spawn(&launch_command)?;
        self.children.lock().await.insert(WORKER_ID.to_string(), child);

        self.poll_until_healthy().await
    }

    async fn poll_until_healthy(&self) -> Result<(), OrchestratorError> {
        let deadline = tokio::time::Instant::now() + self.config.worker_startup_timeout;

        loop {
            if self.client.health().await.is_ok() {
                self.mark_running().await;
                return Ok(());
            }

            if let Some(output) = self.dead_child_output().await {
                self.mark_failed().await;
                return Err(OrchestratorError::WorkerUnavailable(format!(
                    "worker process exited before becoming healthy: {output}"
                )));
            }

            if tokio::time::Instant::now() >= deadline {
                self.mark_failed().await;
                return Err(OrchestratorError::WorkerUnavailable(
                    "worker did not become healthy within the startup timeout".into(),
                ));
            }

            sleep(HEALTH_POLL_INTERVAL).await;
        }
    }

    /// Returns captured stdout/stderr if the spawned child has exited.
    async fn dead_child_output(&self) -> Option<String> {
        let mut children = self.children.lock().await;
        let child = children.get_mut(WORKER_ID)?;
        match child.try_wait() {
            Ok(Some(status)) => {
                use tokio::io::AsyncReadExt;
                let mut out = format!("exit status: {status}");
                if let Some(mut stdout) = child.stdout.take() {
                    let mut buf = String::new();
                    let _ = stdout.read_to_string(&mut buf).await;
                    if !buf.is_empty() {
                        out.push_str(&format!("\nstdout: {buf}"));
                    }
                }
                if let Some(mut stderr) = child.stderr.take() {
                    let mut buf = String::new();
                    let _ = stderr.read_to_string(&mut buf).await;
                    if !buf.is_empty() {
                        out.push_str(&format!("\nstderr: {buf}"));
                    }
                }
                Some(out)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "failed to poll worker child process");
                None
            }
        }
    }

    async fn mark_running(&self) {
        let mut processes = self.processes.lock().await;
        if let Some(entry) = processes.get_mut(WORKER_ID) {
            entry.state = ProcessState::Running;
            entry.last_health_ok_at = Some(Utc::now());
        }
    }

    async fn mark_failed(&self) {
        let mut processes = self.processes.lock().await;
        if let Some(entry) = processes.get_mut(WORKER_ID) {
            entry.state = ProcessState::Failed;
        }
    }
}

fn spawn(launch_command: &str) -> Result<Child, OrchestratorError> {
    let mut parts = launch_command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| OrchestratorError::Config("WORKER_LAUNCH_COMMAND is empty".into()))?;
    let mut command = Command::new(program);
    command
        .args(parts)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command
        .spawn()
        .map_err(|e| OrchestratorError::WorkerUnavailable(format!("failed to spawn worker: {e}")))
}
