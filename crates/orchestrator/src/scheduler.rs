use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use model::operation::types::OperationStatus;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::lifecycle::Lifecycle;
use crate::store::OperationStore;

/// Single logical ticker (§4.3 Scheduler), not a cron parser: on every tick
/// it claims due operations with a compare-and-set so that multiple
/// orchestrator replicas racing on the same tick never double-dispatch.
pub async fn run(
    store: Arc<dyn OperationStore>,
    lifecycle: Arc<Lifecycle>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("scheduler shutting down");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = tick(&store, &lifecycle).await {
                    warn!(error = %e, "scheduler tick failed to scan due operations");
                }
            }
        }
    }
}

async fn tick(
    store: &Arc<dyn OperationStore>,
    lifecycle: &Arc<Lifecycle>,
) -> Result<(), crate::error::OrchestratorError> {
    let due = store.due_pending(Utc::now()).await?;
    for op in due {
        let Some(claimed) = store
            .cas_status(op.id, OperationStatus::Pending, OperationStatus::Running)
            .await?
        else {
            // Another replica (or a concurrent explicit execute) already won
            // the race for this operation.
            continue;
        };

        info!(operation_id = %claimed.id, "scheduler claimed due operation");
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            if let Err(e) = lifecycle.dispatch(claimed.clone()).await {
                warn!(operation_id = %claimed.id, error = %e, "scheduled dispatch failed");
            }
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::sled_store::SledOperationStore;
    use crate::supervisor::Supervisor;
    use model::operation::types::{Operation, OperationConfig, OperationType};
    use tempfile::tempdir;

    fn mk_config() -> OperationConfig {
        OperationConfig {
            source_type: "postgres-like".into(),
            dest_type: "columnar".into(),
            source: serde_json::json!({}),
            destination: serde_json::json!({}),
            operation_type: OperationType::Full,
            last_sync_time: None,
        }
    }

    #[tokio::test]
    async fn tick_claims_a_due_operation_and_leaves_a_future_one_pending() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn OperationStore> = Arc::new(SledOperationStore::open(dir.path()).unwrap());

        let mut due_op = Operation::new("owner".into(), "registry".into(), mk_config());
        due_op.scheduled_at = Utc::now() - chrono::Duration::seconds(5);
        let due_op = store.insert(due_op).await.unwrap();

        let mut future_op = Operation::new("owner".into(), "registry".into(), mk_config());
        future_op.scheduled_at = Utc::now() + chrono::Duration::hours(1);
        let future_op = store.insert(future_op).await.unwrap();

        let supervisor_config = Config {
            worker_host: "127.0.0.1".into(),
            worker_port: 1,
            worker_launch_command: None,
            orchestrator_db_url: dir.path().display().to_string(),
            scheduler_interval: Duration::from_secs(5),
            migrate_http_timeout: Duration::from_millis(200),
            worker_startup_timeout: Duration::from_millis(50),
            orchestrator_host: "127.0.0.1".into(),
            orchestrator_port: 0,
        };
        let supervisor = Arc::new(Supervisor::new(supervisor_config).unwrap());
        let lifecycle = Arc::new(Lifecycle::new(store.clone(), supervisor));

        tick(&store, &lifecycle).await.unwrap();

        // tick claims synchronously (cas_status) but dispatches on a spawned
        // task; give it a moment to reach the terminal transition.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let reloaded_due = store.get(due_op.id).await.unwrap().unwrap();
        assert_ne!(reloaded_due.status, OperationStatus::Pending);

        let reloaded_future = store.get(future_op.id).await.unwrap().unwrap();
        assert_eq!(reloaded_future.status, OperationStatus::Pending);
    }
}
