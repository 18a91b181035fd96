//! Shared fixtures for orchestrator integration tests.

use std::sync::Arc;

use tokio::sync::mpsc;

use nimbus_orchestrator::cluster::ClusterOrchestrator;
use nimbus_orchestrator::job::JobOrchestrator;
use nimbus_orchestrator::settings::{GatewaySettings, Settings, TokenConfig};
use nimbus_orchestrator::tasks::{InProcessQueue, TaskDescriptor};
use nimbus_store::memory::MemoryStore;

pub struct Stack {
    pub store: Arc<MemoryStore>,
    pub clusters: Arc<ClusterOrchestrator>,
    pub jobs: Arc<JobOrchestrator>,
    pub settings: Arc<Settings>,
    pub rx: mpsc::UnboundedReceiver<TaskDescriptor>,
}

pub fn test_settings(gateway_url: Option<&str>) -> Arc<Settings> {
    Arc::new(Settings {
        base_url: "http://localhost:8080/api/v1".to_string(),
        remote_timeout_secs: 5,
        token: TokenConfig {
            secret: "integration-test-secret-long-enough".to_string(),
            expiry_mins: 60,
        },
        gateway: gateway_url.map(|url| GatewaySettings {
            base_url: url.to_string(),
            username: "alice".to_string(),
            password: "secret".to_string(),
        }),
    })
}

/// Build the full in-process stack: memory store, queue, and both
/// orchestrators. The receive side of the queue is returned so tests
/// can either inspect descriptors directly or feed them to a runner.
pub fn stack(gateway_url: Option<&str>) -> Stack {
    let settings = test_settings(gateway_url);
    let store = Arc::new(MemoryStore::new());
    let (queue, rx) = InProcessQueue::new();

    let clusters = Arc::new(ClusterOrchestrator::new(
        store.clone(),
        queue.clone(),
        settings.clone(),
    ));
    let jobs = Arc::new(JobOrchestrator::new(
        store.clone(),
        queue,
        settings.clone(),
    ));

    Stack {
        store,
        clusters,
        jobs,
        settings,
        rx,
    }
}

/// EC2 create request with one inline configuration layer.
pub fn ec2_request(name: &str) -> nimbus_store::models::CreateCluster {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "template": "default_cluster",
        "config": [
            { "cluster": [ { "name": "smp", "min": "2" } ] }
        ]
    }))
    .expect("valid create request")
}

/// Traditional create request with head-node coordinates.
pub fn trad_request(name: &str) -> nimbus_store::models::CreateCluster {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "type": "trad",
        "config": { "username": "alice", "hostname": "head.example.org" }
    }))
    .expect("valid create request")
}
