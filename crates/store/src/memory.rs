//! In-process [`EntityStore`] implementation.
//!
//! All state lives behind a single `RwLock`, which is what gives
//! check-then-set operations their atomicity: a transition loads,
//! checks, and saves under one write guard.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use nimbus_core::config::ConfigContent;
use nimbus_core::error::CoreError;
use nimbus_core::identity::{AccessLevel, Identity};
use nimbus_core::log::LogRecord;
use nimbus_core::status::ClusterStatus;
use nimbus_core::types::EntityId;

use crate::models::{Cluster, Config, Job, UpdateCluster};
use crate::store::EntityStore;

#[derive(Debug)]
struct ClusterRecord {
    cluster: Cluster,
    owner: String,
    log: Vec<LogRecord>,
}

#[derive(Debug)]
struct JobRecord {
    job: Job,
    owner: String,
}

#[derive(Debug, Default)]
struct State {
    clusters: HashMap<EntityId, ClusterRecord>,
    configs: HashMap<EntityId, Config>,
    jobs: HashMap<EntityId, JobRecord>,
}

/// In-memory entity store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Ownership check. Access is granted at every level to the owning user
/// (task-scoped identities resolve to the owner), and denied as
/// `NotFound` otherwise so callers cannot probe for existence.
fn check_access(
    owner: &str,
    caller: &Identity,
    _level: AccessLevel,
    entity: &'static str,
    id: EntityId,
) -> Result<(), CoreError> {
    if owner == caller.user {
        Ok(())
    } else {
        Err(CoreError::NotFound { entity, id })
    }
}

fn cluster_not_found(id: EntityId) -> CoreError {
    CoreError::NotFound {
        entity: "cluster",
        id,
    }
}

fn job_not_found(id: EntityId) -> CoreError {
    CoreError::NotFound { entity: "job", id }
}

impl State {
    fn cluster_record(
        &mut self,
        caller: &Identity,
        id: EntityId,
        level: AccessLevel,
    ) -> Result<&mut ClusterRecord, CoreError> {
        let record = self.clusters.get_mut(&id).ok_or_else(|| cluster_not_found(id))?;
        check_access(&record.owner, caller, level, "cluster", id)?;
        Ok(record)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn create_cluster(
        &self,
        owner: &Identity,
        cluster: Cluster,
    ) -> Result<Cluster, CoreError> {
        let mut state = self.state.write().await;
        let record = ClusterRecord {
            cluster: cluster.clone(),
            owner: owner.user.clone(),
            log: Vec::new(),
        };
        state.clusters.insert(cluster.id, record);
        tracing::debug!(cluster_id = %cluster.id, owner = %owner.user, "Cluster stored");
        Ok(cluster)
    }

    async fn load_cluster(
        &self,
        caller: &Identity,
        id: EntityId,
        level: AccessLevel,
    ) -> Result<Cluster, CoreError> {
        let state = self.state.read().await;
        let record = state.clusters.get(&id).ok_or_else(|| cluster_not_found(id))?;
        check_access(&record.owner, caller, level, "cluster", id)?;
        Ok(record.cluster.clone())
    }

    async fn transition_cluster(
        &self,
        caller: &Identity,
        id: EntityId,
        allowed_from: &[ClusterStatus],
        to: ClusterStatus,
    ) -> Result<Cluster, CoreError> {
        let mut state = self.state.write().await;
        let record = state.cluster_record(caller, id, AccessLevel::Admin)?;

        let current = record.cluster.status;
        if !allowed_from.contains(&current) {
            return Err(CoreError::PreconditionFailed(format!(
                "cluster is {current}, cannot move to {to}"
            )));
        }

        record.cluster.status = to;
        record.cluster.updated_at = chrono::Utc::now();
        Ok(record.cluster.clone())
    }

    async fn update_cluster(
        &self,
        caller: &Identity,
        id: EntityId,
        update: UpdateCluster,
    ) -> Result<Cluster, CoreError> {
        let mut state = self.state.write().await;
        let record = state.cluster_record(caller, id, AccessLevel::Write)?;

        if let Some(status) = update.status {
            let current = record.cluster.status;
            if !current.can_transition_to(status) {
                return Err(CoreError::PreconditionFailed(format!(
                    "cluster is {current}, cannot move to {status}"
                )));
            }
            record.cluster.status = status;
        }

        if let Some(timings) = update.timings {
            // Merge keys into the cumulative map, never replace it.
            record.cluster.timings.extend(timings);
        }

        record.cluster.updated_at = chrono::Utc::now();
        Ok(record.cluster.clone())
    }

    async fn delete_cluster(&self, caller: &Identity, id: EntityId) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        {
            let record = state.clusters.get(&id).ok_or_else(|| cluster_not_found(id))?;
            check_access(&record.owner, caller, AccessLevel::Admin, "cluster", id)?;
        }
        state.clusters.remove(&id);
        tracing::debug!(cluster_id = %id, "Cluster deleted");
        Ok(())
    }

    async fn append_log(
        &self,
        caller: &Identity,
        id: EntityId,
        record: LogRecord,
    ) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        let cluster = state.cluster_record(caller, id, AccessLevel::Admin)?;
        cluster.log.push(record);
        Ok(())
    }

    async fn read_log(
        &self,
        caller: &Identity,
        id: EntityId,
        offset: usize,
    ) -> Result<Vec<LogRecord>, CoreError> {
        let state = self.state.read().await;
        let record = state.clusters.get(&id).ok_or_else(|| cluster_not_found(id))?;
        check_access(&record.owner, caller, AccessLevel::Read, "cluster", id)?;
        Ok(record.log.get(offset..).unwrap_or_default().to_vec())
    }

    async fn create_config(
        &self,
        _owner: &Identity,
        content: ConfigContent,
    ) -> Result<Config, CoreError> {
        let mut state = self.state.write().await;
        let config = Config::new(content);
        state.configs.insert(config.id, config.clone());
        Ok(config)
    }

    async fn load_config(&self, id: EntityId) -> Result<Config, CoreError> {
        let state = self.state.read().await;
        state
            .configs
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: "config",
                id,
            })
    }

    async fn delete_config(&self, id: EntityId) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        state
            .configs
            .remove(&id)
            .map(|_| ())
            .ok_or(CoreError::NotFound {
                entity: "config",
                id,
            })
    }

    async fn create_job(&self, owner: &Identity, job: Job) -> Result<Job, CoreError> {
        let mut state = self.state.write().await;
        let record = JobRecord {
            job: job.clone(),
            owner: owner.user.clone(),
        };
        state.jobs.insert(job.id, record);
        Ok(job)
    }

    async fn load_job(
        &self,
        caller: &Identity,
        id: EntityId,
        level: AccessLevel,
    ) -> Result<Job, CoreError> {
        let state = self.state.read().await;
        let record = state.jobs.get(&id).ok_or_else(|| job_not_found(id))?;
        check_access(&record.owner, caller, level, "job", id)?;
        Ok(record.job.clone())
    }

    async fn save_job(&self, caller: &Identity, job: Job) -> Result<Job, CoreError> {
        let mut state = self.state.write().await;
        let record = state.jobs.get_mut(&job.id).ok_or_else(|| job_not_found(job.id))?;
        check_access(&record.owner, caller, AccessLevel::Write, "job", job.id)?;
        let mut job = job;
        job.updated_at = chrono::Utc::now();
        record.job = job.clone();
        Ok(job)
    }
}
