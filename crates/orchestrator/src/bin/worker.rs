use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nimbus_orchestrator::cluster::ClusterOrchestrator;
use nimbus_orchestrator::job::JobOrchestrator;
use nimbus_orchestrator::runner::TaskRunner;
use nimbus_orchestrator::settings::Settings;
use nimbus_orchestrator::tasks::InProcessQueue;
use nimbus_orchestrator::worker::ClusterWorker;
use nimbus_store::memory::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nimbus_orchestrator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Arc::new(Settings::from_env());
    let store = Arc::new(MemoryStore::new());
    let (queue, rx) = InProcessQueue::new();

    let clusters = Arc::new(ClusterOrchestrator::new(
        store.clone(),
        queue.clone(),
        settings.clone(),
    ));
    let jobs = Arc::new(JobOrchestrator::new(store, queue, settings.clone()));
    let worker = Arc::new(ClusterWorker::new(clusters, jobs, settings));

    let cancel = CancellationToken::new();
    let runner = tokio::spawn(TaskRunner::new(worker, rx).run(cancel.clone()));

    tracing::info!("Worker started, waiting for tasks");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    cancel.cancel();
    runner.await?;

    Ok(())
}
