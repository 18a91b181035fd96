//! Job entity and its request DTO.

use serde::{Deserialize, Serialize};

use nimbus_core::status::JobStatus;
use nimbus_core::types::{EntityId, Timestamp};

/// A unit of work executed on a cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: EntityId,
    pub name: String,
    /// Shell commands run in order by the submission task. May embed
    /// `{{key}}` placeholders resolved from `params`.
    pub commands: Vec<String>,
    /// Collection the job's output artifacts are registered under.
    pub output_collection_id: String,
    /// Set when the job is submitted to a running cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<EntityId>,
    pub status: JobStatus,
    /// Identifier assigned by the remote scheduler, recorded once known
    /// so the job can later be terminated out-of-band.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_scheduler_id: Option<String>,
    /// Caller-supplied templating values attached at submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    pub fn new(name: String, commands: Vec<String>, output_collection_id: String) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: nimbus_core::types::new_entity_id(),
            name,
            commands,
            output_collection_id,
            cluster_id: None,
            status: JobStatus::Created,
            remote_scheduler_id: None,
            params: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// DTO for creating a job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJob {
    pub name: String,
    pub commands: Vec<String>,
    #[serde(rename = "outputCollectionId")]
    pub output_collection_id: String,
}
