//! Cluster lifecycle orchestration.
//!
//! All status movement goes through the store's atomic check-then-set,
//! so concurrent lifecycle calls race safely: of two concurrent starts
//! exactly one enqueues a task, and a terminate during any phase either
//! wins the transition or observes that termination is already underway
//! and does nothing.

use std::sync::Arc;

use nimbus_core::config::{self, ConfigContent, ConfigLayer};
use nimbus_core::error::CoreError;
use nimbus_core::identity::{AccessLevel, Identity};
use nimbus_core::log::LogRecord;
use nimbus_core::status::{ClusterStatus, ClusterType};
use nimbus_core::types::EntityId;
use nimbus_store::models::{Cluster, CreateCluster, SshHost, UpdateCluster};
use nimbus_store::store::EntityStore;

use crate::auth;
use crate::settings::Settings;
use crate::tasks::{TaskDescriptor, TaskOp, TaskQueue};

/// Cluster state machine over the entity store and task queue.
pub struct ClusterOrchestrator {
    store: Arc<dyn EntityStore>,
    queue: Arc<dyn TaskQueue>,
    settings: Arc<Settings>,
}

impl ClusterOrchestrator {
    pub fn new(
        store: Arc<dyn EntityStore>,
        queue: Arc<dyn TaskQueue>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            store,
            queue,
            settings,
        }
    }

    /// Create a cluster in `created`.
    ///
    /// EC2 clusters require `name`, `template`, and a configuration
    /// layer list, which is resolved and merged here; the merged result
    /// is persisted as a config document owned by the new cluster.
    /// Traditional clusters require `name` plus `username`/`hostname`
    /// connection coordinates in `config`.
    pub async fn create(
        &self,
        caller: &Identity,
        request: CreateCluster,
    ) -> Result<Cluster, CoreError> {
        let name = required(request.name, "name")?;

        let cluster = match request.cluster_type {
            ClusterType::Ec2 => {
                let template = required(request.template, "template")?;
                let config = request
                    .config
                    .ok_or_else(|| missing_param("config"))?;
                let layers: Vec<ConfigLayer> = serde_json::from_value(config).map_err(|e| {
                    CoreError::Validation(format!("invalid configuration layer list: {e}"))
                })?;

                let merged = self.resolve_and_merge(layers).await?;
                let config = self.store.create_config(caller, merged).await?;
                Cluster::new_ec2(name, template, config.id)
            }
            ClusterType::Traditional => {
                let config = request
                    .config
                    .ok_or_else(|| missing_param("config"))?;
                let host: SshHost = serde_json::from_value(config).map_err(|_| {
                    CoreError::Validation(
                        "traditional cluster config requires 'username' and 'hostname'"
                            .to_string(),
                    )
                })?;
                Cluster::new_traditional(name, host)
            }
        };

        let cluster = self.store.create_cluster(caller, cluster).await?;
        tracing::info!(
            cluster_id = %cluster.id,
            cluster_type = %cluster.cluster_type,
            "Cluster created",
        );
        Ok(cluster)
    }

    /// Resolve configuration layers in order and merge them, last layer
    /// winning.
    async fn resolve_and_merge(
        &self,
        layers: Vec<ConfigLayer>,
    ) -> Result<ConfigContent, CoreError> {
        let mut resolved = Vec::with_capacity(layers.len());
        for layer in layers {
            match layer {
                ConfigLayer::Inline(content) => resolved.push(content),
                ConfigLayer::Reference { id } => {
                    if id.trim().is_empty() {
                        return Err(CoreError::Validation(
                            "configuration reference id must not be empty".to_string(),
                        ));
                    }
                    let config_id: EntityId = id.parse().map_err(|_| {
                        CoreError::Validation(format!(
                            "malformed configuration reference id: {id:?}"
                        ))
                    })?;
                    let config = self
                        .store
                        .load_config(config_id)
                        .await
                        .map_err(|_| CoreError::InvalidReference(id))?;
                    resolved.push(config.content);
                }
            }
        }
        Ok(config::merge(resolved))
    }

    /// Begin starting a cluster.
    ///
    /// Only a cluster in `created` can start; the check-then-set means
    /// that of two concurrent calls exactly one wins and enqueues. When
    /// `on_start_submit` names a job, the start task submits it as soon
    /// as the cluster reaches `running`.
    pub async fn start(
        &self,
        caller: &Identity,
        id: EntityId,
        on_start_submit: Option<EntityId>,
    ) -> Result<Cluster, CoreError> {
        let cluster = self
            .store
            .transition_cluster(caller, id, &[ClusterStatus::Created], ClusterStatus::Starting)
            .await?;

        self.enqueue(
            caller,
            id,
            TaskOp::StartCluster {
                cluster: cluster.clone(),
                on_start_submit,
            },
        )
        .await?;
        tracing::info!(cluster_id = %id, "Cluster start requested");
        Ok(cluster)
    }

    /// Begin terminating a cluster.
    ///
    /// A no-op success when termination is already underway or done; of
    /// two concurrent calls on the same cluster, exactly one enqueues a
    /// task.
    pub async fn terminate(&self, caller: &Identity, id: EntityId) -> Result<(), CoreError> {
        let from = [
            ClusterStatus::Created,
            ClusterStatus::Starting,
            ClusterStatus::Running,
        ];
        let cluster = match self
            .store
            .transition_cluster(caller, id, &from, ClusterStatus::Terminating)
            .await
        {
            Ok(cluster) => cluster,
            // Already terminating or terminated.
            Err(CoreError::PreconditionFailed(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        self.enqueue(caller, id, TaskOp::TerminateCluster { cluster })
            .await?;
        tracing::info!(cluster_id = %id, "Cluster termination requested");
        Ok(())
    }

    /// Task-callback update: optional status move plus a timing delta.
    ///
    /// Only task-scoped callers may update; the status change is
    /// validated against the transition graph, and timings merge into
    /// the cumulative map.
    pub async fn update(
        &self,
        caller: &Identity,
        id: EntityId,
        update: UpdateCluster,
    ) -> Result<Cluster, CoreError> {
        if !caller.is_task() {
            return Err(CoreError::Unauthorized(
                "cluster updates are reserved for task callbacks".to_string(),
            ));
        }
        let cluster = self.store.update_cluster(caller, id, update).await?;
        tracing::debug!(cluster_id = %id, status = %cluster.status, "Cluster updated");
        Ok(cluster)
    }

    pub async fn append_log_record(
        &self,
        caller: &Identity,
        id: EntityId,
        record: LogRecord,
    ) -> Result<(), CoreError> {
        self.store.append_log(caller, id, record).await
    }

    pub async fn read_log(
        &self,
        caller: &Identity,
        id: EntityId,
        offset: usize,
    ) -> Result<Vec<LogRecord>, CoreError> {
        self.store.read_log(caller, id, offset).await
    }

    /// Read-level status projection.
    pub async fn status(
        &self,
        caller: &Identity,
        id: EntityId,
    ) -> Result<ClusterStatus, CoreError> {
        Ok(self
            .store
            .load_cluster(caller, id, AccessLevel::Read)
            .await?
            .status)
    }

    pub async fn get(&self, caller: &Identity, id: EntityId) -> Result<Cluster, CoreError> {
        self.store.load_cluster(caller, id, AccessLevel::Read).await
    }

    /// Delete a cluster along with its owned config document.
    pub async fn delete(&self, caller: &Identity, id: EntityId) -> Result<(), CoreError> {
        let cluster = self.store.load_cluster(caller, id, AccessLevel::Admin).await?;
        self.store.delete_cluster(caller, id).await?;
        if let Some(config_id) = cluster.config_id {
            match self.store.delete_config(config_id).await {
                Ok(()) | Err(CoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::info!(cluster_id = %id, "Cluster deleted");
        Ok(())
    }

    /// Address of the cluster's log sink, handed to tasks.
    pub fn log_url(&self, id: EntityId) -> String {
        format!("{}/clusters/{}/log", self.settings.base_url, id)
    }

    async fn enqueue(
        &self,
        caller: &Identity,
        cluster_id: EntityId,
        op: TaskOp,
    ) -> Result<(), CoreError> {
        let token = auth::issue_task_token(&caller.user, &self.settings.token)?;
        let task = TaskDescriptor::new(token, self.log_url(cluster_id), op);
        self.queue.enqueue(task).await
    }
}

fn missing_param(name: &str) -> CoreError {
    CoreError::Validation(format!("Parameter '{name}' is required."))
}

fn required(value: Option<String>, name: &str) -> Result<String, CoreError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(missing_param(name)),
    }
}
