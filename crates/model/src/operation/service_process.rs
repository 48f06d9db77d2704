use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supervisor-owned record tracking the migration worker's liveness (§3
/// ServiceProcess). Lives only in the orchestrator's in-memory process
/// table, guarded by a single mutex — it is never persisted, since it
/// describes the state of a process on this node, not a durable fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceProcess {
    pub worker_id: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_health_ok_at: Option<DateTime<Utc>>,
    pub required: bool,
    pub endpoint: String,
}

impl ServiceProcess {
    pub fn stopped(worker_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        ServiceProcess {
            worker_id: worker_id.into(),
            state: ProcessState::Stopped,
            pid: None,
            started_at: None,
            last_health_ok_at: None,
            required: true,
            endpoint: endpoint.into(),
        }
    }

    pub fn is_starting_or_running(&self) -> bool {
        matches!(self.state, ProcessState::Starting | ProcessState::Running)
    }
}
