//! In-process task runner.
//!
//! A single long-lived Tokio task that drains the queue's receive side
//! and hands each descriptor to the handler. A handler error means the
//! handler could not even report its own failure through the entity
//! store; it is logged here and the loop moves on. Affected entities
//! are left in whatever stable state the handler reached.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use nimbus_core::error::CoreError;

use crate::tasks::TaskDescriptor;

/// Executes one task descriptor to completion.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: TaskDescriptor) -> Result<(), CoreError>;
}

/// Receive loop pairing an [`InProcessQueue`](crate::tasks::InProcessQueue)
/// with a handler.
pub struct TaskRunner {
    handler: Arc<dyn TaskHandler>,
    rx: mpsc::UnboundedReceiver<TaskDescriptor>,
}

impl TaskRunner {
    pub fn new(handler: Arc<dyn TaskHandler>, rx: mpsc::UnboundedReceiver<TaskDescriptor>) -> Self {
        Self { handler, rx }
    }

    /// Run until the cancellation token fires or every queue sender is
    /// dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Task runner started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Task runner shutting down");
                    break;
                }
                task = self.rx.recv() => {
                    let Some(task) = task else {
                        tracing::info!("Task queue closed, runner stopping");
                        break;
                    };
                    let task_id = task.id;
                    tracing::debug!(%task_id, "Task picked up");
                    if let Err(e) = self.handler.handle(task).await {
                        tracing::error!(%task_id, error = %e, "Task handler failed");
                    }
                }
            }
        }
    }
}
