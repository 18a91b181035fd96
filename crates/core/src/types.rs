//! Shared identifier and timestamp aliases.

/// Unique identifier for a stored entity (cluster, job, config document).
pub type EntityId = uuid::Uuid;

/// UTC timestamp used on all entities and log records.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh entity id.
pub fn new_entity_id() -> EntityId {
    uuid::Uuid::new_v4()
}
