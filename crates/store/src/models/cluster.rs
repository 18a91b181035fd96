//! Cluster entity and its request DTOs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use nimbus_core::status::{ClusterStatus, ClusterType};
use nimbus_core::types::{EntityId, Timestamp};

/// Connection coordinates for a traditional (pre-existing) cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshHost {
    pub username: String,
    pub hostname: String,
}

/// A managed compute cluster.
///
/// The append-only log and the ownership record are kept by the store,
/// not embedded here, so entities returned from orchestrator operations
/// never carry internal fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    pub status: ClusterStatus,
    /// Merged configuration document owned by this cluster (EC2 only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<EntityId>,
    /// Provisioning template name (EC2 only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Head-node coordinates (traditional only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<SshHost>,
    /// Cumulative phase name to duration in milliseconds. Updates merge
    /// into this map; they never replace it wholesale.
    #[serde(default)]
    pub timings: BTreeMap<String, i64>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Cluster {
    /// A new EC2 cluster in `created`, owning the given config document.
    pub fn new_ec2(name: String, template: String, config_id: EntityId) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: nimbus_core::types::new_entity_id(),
            name,
            cluster_type: ClusterType::Ec2,
            status: ClusterStatus::Created,
            config_id: Some(config_id),
            template: Some(template),
            host: None,
            timings: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A new traditional cluster in `created`.
    pub fn new_traditional(name: String, host: SshHost) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: nimbus_core::types::new_entity_id(),
            name,
            cluster_type: ClusterType::Traditional,
            status: ClusterStatus::Created,
            config_id: None,
            template: None,
            host: None,
            timings: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
        .with_host(host)
    }

    fn with_host(mut self, host: SshHost) -> Self {
        self.host = Some(host);
        self
    }
}

/// DTO for creating a cluster.
///
/// The `config` shape depends on the cluster type: EC2 takes a list of
/// configuration layers, traditional takes an object carrying
/// `username` and `hostname`. Validation happens in the orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCluster {
    pub name: Option<String>,
    /// Defaults to `ec2` when unspecified.
    #[serde(rename = "type", default)]
    pub cluster_type: ClusterType,
    pub template: Option<String>,
    pub config: Option<serde_json::Value>,
}

/// DTO for the task-callback update operation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCluster {
    pub status: Option<ClusterStatus>,
    /// Merged key-by-key into the cluster's cumulative timing map.
    pub timings: Option<BTreeMap<String, i64>>,
}
