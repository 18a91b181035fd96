//! Job lifecycle orchestration.
//!
//! Unlike cluster status, job status updates are unconditional
//! overwrites: the submission task owns the job's progression and the
//! orchestrator does not second-guess it.

use std::sync::Arc;

use nimbus_core::error::CoreError;
use nimbus_core::identity::{AccessLevel, Identity};
use nimbus_core::status::JobStatus;
use nimbus_core::types::EntityId;
use nimbus_store::models::{CreateJob, Job};
use nimbus_store::store::EntityStore;

use crate::auth;
use crate::settings::Settings;
use crate::tasks::{TaskDescriptor, TaskOp, TaskQueue};

/// Job state machine over the entity store and task queue.
pub struct JobOrchestrator {
    store: Arc<dyn EntityStore>,
    queue: Arc<dyn TaskQueue>,
    settings: Arc<Settings>,
}

impl JobOrchestrator {
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

    /// Create a job in `created`, not yet bound to any cluster.
    pub async fn create(&self, caller: &Identity, request: CreateJob) -> Result<Job, CoreError> {
        if request.name.trim().is_empty() {
            return Err(CoreError::Validation(
                "Parameter 'name' is required.".to_string(),
            ));
        }
        if request.commands.is_empty() {
            return Err(CoreError::Validation(
                "Parameter 'commands' is required.".to_string(),
            ));
        }

        let job = Job::new(request.name, request.commands, request.output_collection_id);
        let job = self.store.create_job(caller, job).await?;
        tracing::info!(job_id = %job.id, "Job created");
        Ok(job)
    }

    /// Submit a job to a running cluster.
    ///
    /// Fails `PreconditionFailed` unless the cluster is `running`;
    /// records the cluster binding and templating params on the job,
    /// marks it `submitted`, and enqueues the submission task.
    pub async fn submit(
        &self,
        caller: &Identity,
        cluster_id: EntityId,
        job_id: EntityId,
        params: Option<serde_json::Value>,
    ) -> Result<Job, CoreError> {
        let cluster = self
            .store
            .load_cluster(caller, cluster_id, AccessLevel::Write)
            .await?;
        if !cluster.status.accepts_jobs() {
            return Err(CoreError::PreconditionFailed(format!(
                "cluster is {}, jobs can only be submitted to a running cluster",
                cluster.status
            )));
        }

        let mut job = self.store.load_job(caller, job_id, AccessLevel::Write).await?;
        job.cluster_id = Some(cluster_id);
        job.params = params;
        job.status = JobStatus::Submitted;
        let job = self.store.save_job(caller, job).await?;

        // EC2 clusters carry a merged config document; hand the task an
        // address the remote side can resolve it from. Traditional
        // clusters have none.
        let config_url = cluster.config_id.map(|config_id| {
            format!(
                "{}/configs/{}?format=ini",
                self.settings.base_url, config_id
            )
        });

        let token = auth::issue_task_token(&caller.user, &self.settings.token)?;
        let log_url = format!("{}/clusters/{}/log", self.settings.base_url, cluster_id);
        let task = TaskDescriptor::new(
            token,
            log_url,
            TaskOp::SubmitJob {
                cluster,
                job: job.clone(),
                config_url,
            },
        );
        self.queue.enqueue(task).await?;

        tracing::info!(job_id = %job_id, cluster_id = %cluster_id, "Job submitted");
        Ok(job)
    }

    /// Read-level status projection.
    pub async fn status(&self, caller: &Identity, id: EntityId) -> Result<JobStatus, CoreError> {
        Ok(self
            .store
            .load_job(caller, id, AccessLevel::Read)
            .await?
            .status)
    }

    pub async fn get(&self, caller: &Identity, id: EntityId) -> Result<Job, CoreError> {
        self.store.load_job(caller, id, AccessLevel::Read).await
    }

    /// Unconditionally overwrite the job's status.
    pub async fn update_status(
        &self,
        caller: &Identity,
        id: EntityId,
        status: JobStatus,
    ) -> Result<Job, CoreError> {
        let mut job = self.store.load_job(caller, id, AccessLevel::Write).await?;
        job.status = status;
        let job = self.store.save_job(caller, job).await?;
        tracing::debug!(job_id = %id, status = %status, "Job status updated");
        Ok(job)
    }

    /// Record the identifier the remote scheduler assigned to this job,
    /// so it can later be terminated out-of-band.
    pub async fn set_remote_scheduler_id(
        &self,
        caller: &Identity,
        id: EntityId,
        remote_id: String,
    ) -> Result<Job, CoreError> {
        let mut job = self.store.load_job(caller, id, AccessLevel::Write).await?;
        job.remote_scheduler_id = Some(remote_id);
        self.store.save_job(caller, job).await
    }
}
