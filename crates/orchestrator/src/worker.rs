//! Built-in task handler driving cluster and job tasks to completion.
//!
//! The worker is the only component that touches the transport. It
//! resolves each task's bearer token back to a task-scoped identity and
//! reports progress exclusively through the orchestrators' update and
//! log operations, so a remote failure never propagates to the caller
//! that enqueued the task; it lands as a terminal status plus an error
//! record in the cluster log.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use nimbus_core::error::CoreError;
use nimbus_core::identity::Identity;
use nimbus_core::log::LogRecord;
use nimbus_core::status::{ClusterStatus, ClusterType, JobStatus};
use nimbus_core::template;
use nimbus_core::types::EntityId;
use nimbus_store::models::{Cluster, Job, UpdateCluster};
use nimbus_transport::{with_connection, ConnectionProfile, TransportError};

use crate::auth;
use crate::cluster::ClusterOrchestrator;
use crate::job::JobOrchestrator;
use crate::runner::TaskHandler;
use crate::settings::Settings;
use crate::tasks::{TaskDescriptor, TaskOp};

/// Remote directory a job's script is staged under.
fn job_dir(job_id: EntityId) -> String {
    format!("nimbus/jobs/{job_id}")
}

/// Task handler for cluster lifecycle and job submission.
pub struct ClusterWorker {
    clusters: Arc<ClusterOrchestrator>,
    jobs: Arc<JobOrchestrator>,
    settings: Arc<Settings>,
}

impl ClusterWorker {
    pub fn new(
        clusters: Arc<ClusterOrchestrator>,
        jobs: Arc<JobOrchestrator>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            clusters,
            jobs,
            settings,
        }
    }

    /// Connection profile for a cluster, selected from its declared type.
    fn profile_for(&self, cluster: &Cluster) -> Result<ConnectionProfile, CoreError> {
        match cluster.cluster_type {
            ClusterType::Traditional => {
                let host = cluster.host.as_ref().ok_or_else(|| {
                    CoreError::Internal("traditional cluster has no host record".to_string())
                })?;
                Ok(ConnectionProfile::ssh(&host.username, &host.hostname))
            }
            ClusterType::Ec2 => {
                let gateway = self.settings.gateway.as_ref().ok_or_else(|| {
                    CoreError::Internal("gateway settings are not configured".to_string())
                })?;
                Ok(ConnectionProfile::Gateway {
                    base_url: gateway.base_url.clone(),
                    host: cluster.name.clone(),
                    username: gateway.username.clone(),
                    password: gateway.password.clone(),
                })
            }
        }
    }

    /// Verify the cluster backend is reachable and responsive.
    async fn check_connectivity(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<(), TransportError> {
        with_connection(profile, self.settings.remote_timeout(), |conn| {
            Box::pin(async move { conn.execute("true").await.map(|_| ()) })
        })
        .await
    }

    async fn start_cluster(
        &self,
        identity: &Identity,
        cluster: Cluster,
        on_start_submit: Option<EntityId>,
    ) -> Result<(), CoreError> {
        let started = Instant::now();
        let profile = self.profile_for(&cluster)?;

        match self.check_connectivity(&profile).await {
            Ok(()) => {
                self.clusters
                    .update(
                        identity,
                        cluster.id,
                        UpdateCluster {
                            status: Some(ClusterStatus::Running),
                            timings: Some(timing("start", started)),
                        },
                    )
                    .await?;
                self.clusters
                    .append_log_record(
                        identity,
                        cluster.id,
                        LogRecord::info("cluster is running"),
                    )
                    .await?;
                tracing::info!(cluster_id = %cluster.id, "Cluster started");

                if let Some(job_id) = on_start_submit {
                    if let Err(e) = self.jobs.submit(identity, cluster.id, job_id, None).await {
                        tracing::error!(
                            cluster_id = %cluster.id,
                            job_id = %job_id,
                            error = %e,
                            "On-start job submission failed",
                        );
                        self.clusters
                            .append_log_record(
                                identity,
                                cluster.id,
                                LogRecord::error(format!(
                                    "failed to submit job {job_id} on start: {e}"
                                )),
                            )
                            .await?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(cluster_id = %cluster.id, error = %e, "Cluster start failed");
                self.clusters
                    .append_log_record(
                        identity,
                        cluster.id,
                        LogRecord::error(format!("cluster start failed: {e}")),
                    )
                    .await?;
                // Provisioning-failure edge: starting -> terminated.
                self.clusters
                    .update(
                        identity,
                        cluster.id,
                        UpdateCluster {
                            status: Some(ClusterStatus::Terminated),
                            timings: Some(timing("start", started)),
                        },
                    )
                    .await?;
                Ok(())
            }
        }
    }

    async fn terminate_cluster(
        &self,
        identity: &Identity,
        cluster: Cluster,
    ) -> Result<(), CoreError> {
        let started = Instant::now();

        // Remote teardown is best effort; the entity reaches
        // `terminated` either way.
        if cluster.status == ClusterStatus::Terminating {
            if let Ok(profile) = self.profile_for(&cluster) {
                if let Err(e) = self.check_connectivity(&profile).await {
                    tracing::warn!(
                        cluster_id = %cluster.id,
                        error = %e,
                        "Cluster backend unreachable during termination",
                    );
                    self.clusters
                        .append_log_record(
                            identity,
                            cluster.id,
                            LogRecord::error(format!(
                                "backend unreachable during termination: {e}"
                            )),
                        )
                        .await?;
                }
            }
        }

        self.clusters
            .update(
                identity,
                cluster.id,
                UpdateCluster {
                    status: Some(ClusterStatus::Terminated),
                    timings: Some(timing("terminate", started)),
                },
            )
            .await?;
        self.clusters
            .append_log_record(identity, cluster.id, LogRecord::info("cluster terminated"))
            .await?;
        tracing::info!(cluster_id = %cluster.id, "Cluster terminated");
        Ok(())
    }

    async fn submit_job(
        &self,
        identity: &Identity,
        cluster: Cluster,
        job: Job,
        config_url: Option<String>,
    ) -> Result<(), CoreError> {
        let profile = self.profile_for(&cluster)?;
        let script = render_script(&job, config_url.as_deref());
        let dir = job_dir(job.id);

        self.jobs
            .update_status(identity, job.id, JobStatus::Running)
            .await?;
        self.clusters
            .append_log_record(
                identity,
                cluster.id,
                LogRecord::info(format!("running job '{}'", job.name)),
            )
            .await?;

        let script_path = format!("{dir}/run.sh");
        let command = format!("cd {dir} && sh run.sh");
        let result = with_connection(&profile, self.settings.remote_timeout(), |conn| {
            Box::pin(async move {
                conn.mkdir(&dir).await?;
                conn.put(script.as_bytes(), &script_path).await?;
                conn.execute(&command).await
            })
        })
        .await;

        match result {
            Ok(output) => {
                // Schedulers print the identifier they assigned on the
                // first line; record it for out-of-band termination.
                if let Some(remote_id) = output.lines().next().filter(|l| !l.trim().is_empty()) {
                    self.jobs
                        .set_remote_scheduler_id(identity, job.id, remote_id.trim().to_string())
                        .await?;
                }
                self.jobs
                    .update_status(identity, job.id, JobStatus::Completed)
                    .await?;
                self.clusters
                    .append_log_record(
                        identity,
                        cluster.id,
                        LogRecord::info(format!("job '{}' completed", job.name)),
                    )
                    .await?;
                tracing::info!(job_id = %job.id, "Job completed");
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Job failed");
                self.jobs
                    .update_status(identity, job.id, JobStatus::Error)
                    .await?;
                self.clusters
                    .append_log_record(
                        identity,
                        cluster.id,
                        LogRecord::error(format!("job '{}' failed: {e}", job.name)),
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for ClusterWorker {
    async fn handle(&self, task: TaskDescriptor) -> Result<(), CoreError> {
        let identity = auth::validate_task_token(&task.token, &self.settings.token)?;

        match task.op {
            TaskOp::StartCluster {
                cluster,
                on_start_submit,
            } => self.start_cluster(&identity, cluster, on_start_submit).await,
            TaskOp::TerminateCluster { cluster } => {
                self.terminate_cluster(&identity, cluster).await
            }
            TaskOp::SubmitJob {
                cluster,
                job,
                config_url,
            } => self.submit_job(&identity, cluster, job, config_url).await,
        }
    }
}

fn timing(phase: &str, since: Instant) -> BTreeMap<String, i64> {
    let mut timings = BTreeMap::new();
    timings.insert(phase.to_string(), since.elapsed().as_millis() as i64);
    timings
}

/// Render a job's commands into a runnable shell script, resolving
/// `{{key}}` placeholders from the job's params.
fn render_script(job: &Job, config_url: Option<&str>) -> String {
    let params = job.params.clone().unwrap_or(serde_json::Value::Null);
    let mut script = String::from("#!/bin/sh\n");
    if let Some(url) = config_url {
        script.push_str(&format!("NIMBUS_CONFIG_URL='{url}'\nexport NIMBUS_CONFIG_URL\n"));
    }
    for command in &job.commands {
        script.push_str(&template::render(command, &params));
        script.push('\n');
    }
    script
}
