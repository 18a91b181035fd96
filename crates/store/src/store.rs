//! The persistence contract consumed by the orchestrators.

use async_trait::async_trait;

use nimbus_core::config::ConfigContent;
use nimbus_core::error::CoreError;
use nimbus_core::identity::{AccessLevel, Identity};
use nimbus_core::log::LogRecord;
use nimbus_core::status::ClusterStatus;
use nimbus_core::types::EntityId;

use crate::models::{Cluster, Config, Job, UpdateCluster};

/// Storage boundary for clusters, jobs, and config documents.
///
/// Loads fail with [`CoreError::NotFound`] both when an entity is absent
/// and when the caller lacks the required access level, so callers
/// cannot distinguish the two. Status-changing operations perform their
/// check-then-set atomically: of two racing [`transition_cluster`]
/// calls, exactly one succeeds.
///
/// [`transition_cluster`]: EntityStore::transition_cluster
#[async_trait]
pub trait EntityStore: Send + Sync {
    // ---- clusters ----

    async fn create_cluster(
        &self,
        owner: &Identity,
        cluster: Cluster,
    ) -> Result<Cluster, CoreError>;

    async fn load_cluster(
        &self,
        caller: &Identity,
        id: EntityId,
        level: AccessLevel,
    ) -> Result<Cluster, CoreError>;

    /// Atomically move a cluster from one of `allowed_from` to `to`.
    ///
    /// Fails with [`CoreError::PreconditionFailed`] when the current
    /// status is not in `allowed_from`. Requires admin access.
    async fn transition_cluster(
        &self,
        caller: &Identity,
        id: EntityId,
        allowed_from: &[ClusterStatus],
        to: ClusterStatus,
    ) -> Result<Cluster, CoreError>;

    /// Apply a task-callback update: optional status change (validated
    /// against the transition graph) plus a timing delta merged into the
    /// cumulative map. Requires write access.
    async fn update_cluster(
        &self,
        caller: &Identity,
        id: EntityId,
        update: UpdateCluster,
    ) -> Result<Cluster, CoreError>;

    /// Delete a cluster. The owned config document is removed separately
    /// via [`delete_config`](EntityStore::delete_config).
    async fn delete_cluster(&self, caller: &Identity, id: EntityId) -> Result<(), CoreError>;

    // ---- cluster log ----

    /// Append one record to the cluster's log. Appends are atomic and
    /// strictly ordered; records from concurrent tasks never interleave
    /// partially.
    async fn append_log(
        &self,
        caller: &Identity,
        id: EntityId,
        record: LogRecord,
    ) -> Result<(), CoreError>;

    /// Read log records from `offset` to the end, in append order. An
    /// offset past the end yields an empty vector, never an error.
    async fn read_log(
        &self,
        caller: &Identity,
        id: EntityId,
        offset: usize,
    ) -> Result<Vec<LogRecord>, CoreError>;

    // ---- config documents ----

    async fn create_config(
        &self,
        owner: &Identity,
        content: ConfigContent,
    ) -> Result<Config, CoreError>;

    /// Load a config document by id. Reference resolution is not
    /// access-checked; config documents carry no secrets and the ids are
    /// only reachable through an accessible cluster.
    async fn load_config(&self, id: EntityId) -> Result<Config, CoreError>;

    async fn delete_config(&self, id: EntityId) -> Result<(), CoreError>;

    // ---- jobs ----

    async fn create_job(&self, owner: &Identity, job: Job) -> Result<Job, CoreError>;

    async fn load_job(
        &self,
        caller: &Identity,
        id: EntityId,
        level: AccessLevel,
    ) -> Result<Job, CoreError>;

    async fn save_job(&self, caller: &Identity, job: Job) -> Result<Job, CoreError>;
}
