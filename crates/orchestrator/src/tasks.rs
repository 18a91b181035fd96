//! Task descriptors and the queue boundary.
//!
//! A task descriptor is self-contained and fully serializable: entity
//! snapshots, a bearer token, and a log-sink address. A handler needs
//! nothing else to perform the work and report back, so descriptors can
//! cross process boundaries when the in-process queue is replaced by an
//! external one.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use nimbus_core::error::CoreError;
use nimbus_core::types::EntityId;
use nimbus_store::models::{Cluster, Job};

/// The asynchronous operation a task performs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOp {
    /// Provision/verify the cluster and move it to `running`.
    StartCluster {
        cluster: Cluster,
        /// Job to submit once the cluster reaches `running`.
        #[serde(skip_serializing_if = "Option::is_none")]
        on_start_submit: Option<EntityId>,
    },
    /// Tear the cluster down and move it to `terminated`.
    TerminateCluster { cluster: Cluster },
    /// Stage and run a job's commands on its cluster.
    SubmitJob {
        cluster: Cluster,
        job: Job,
        /// Address of the cluster's merged configuration, rendered for
        /// remote-side resolution (EC2 clusters only).
        #[serde(skip_serializing_if = "Option::is_none")]
        config_url: Option<String>,
    },
}

/// A self-contained unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: EntityId,
    /// Task-scoped bearer token the handler resolves back to an identity.
    pub token: String,
    /// Address of the log sink progress records are appended to.
    pub log_url: String,
    pub op: TaskOp,
}

impl TaskDescriptor {
    pub fn new(token: String, log_url: String, op: TaskOp) -> Self {
        Self {
            id: nimbus_core::types::new_entity_id(),
            token,
            log_url,
            op,
        }
    }
}

/// The enqueue side of the task runtime. `enqueue` returns as soon as
/// the descriptor is accepted; no remote work happens on the caller's
/// path.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: TaskDescriptor) -> Result<(), CoreError>;
}

/// In-process queue over an unbounded channel. The receive side is
/// handed to a [`TaskRunner`](crate::runner::TaskRunner).
pub struct InProcessQueue {
    tx: mpsc::UnboundedSender<TaskDescriptor>,
}

impl InProcessQueue {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TaskDescriptor>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl TaskQueue for InProcessQueue {
    async fn enqueue(&self, task: TaskDescriptor) -> Result<(), CoreError> {
        tracing::debug!(task_id = %task.id, "Task enqueued");
        self.tx
            .send(task)
            .map_err(|_| CoreError::Internal("task queue receiver dropped".to_string()))
    }
}
