//! Stored configuration document.

use serde::{Deserialize, Serialize};

use nimbus_core::config::ConfigContent;
use nimbus_core::types::{EntityId, Timestamp};

/// A merged configuration document owned by a single cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub id: EntityId,
    pub content: ConfigContent,
    pub created_at: Timestamp,
}

impl Config {
    pub fn new(content: ConfigContent) -> Self {
        Self {
            id: nimbus_core::types::new_entity_id(),
            content,
            created_at: chrono::Utc::now(),
        }
    }
}
