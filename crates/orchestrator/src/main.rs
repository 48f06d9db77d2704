use std::sync::Arc;

use orchestrator::config::Config;
use orchestrator::http::{self, AppState};
use orchestrator::lifecycle::Lifecycle;
use orchestrator::scheduler;
use orchestrator::shutdown::ShutdownCoordinator;
use orchestrator::store::sled_store::SledOperationStore;
use orchestrator::store::OperationStore;
use orchestrator::supervisor::Supervisor;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };

    let store: Arc<dyn OperationStore> = match SledOperationStore::open(&config.orchestrator_db_url)
    {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("fatal: failed to open operations store: {e}");
            std::process::exit(1);
        }
    };

    let supervisor = match Supervisor::new(config.clone()) {
        Ok(supervisor) => Arc::new(supervisor),
        Err(e) => {
            eprintln!("fatal: failed to initialize worker supervisor: {e}");
            std::process::exit(1);
        }
    };

    let lifecycle = Arc::new(Lifecycle::new(store.clone(), supervisor.clone()));

    let cancel = CancellationToken::new();
    let shutdown = ShutdownCoordinator::new(cancel.clone());
    shutdown.register_handlers();

    let scheduler_handle = tokio::spawn(scheduler::run(
        store.clone(),
        lifecycle.clone(),
        config.scheduler_interval,
        cancel.clone(),
    ));

    let state = AppState { store, lifecycle };
    let app = http::router(state);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind orchestrator http listener on {addr}: {e}"));

    info!(%addr, "orchestrator listening");
    let server_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await
        .unwrap_or_else(|e| eprintln!("http server exited with error: {e}"));

    let _ = scheduler_handle.await;
    info!("orchestrator shut down");
}
