//! Entity models and the persistence contract for the Nimbus cluster
//! manager.
//!
//! The [`store::EntityStore`] trait is the boundary the orchestrators
//! persist through; [`memory::MemoryStore`] is the in-process
//! implementation, providing the atomic check-then-set semantics state
//! transitions rely on.

pub mod memory;
pub mod models;
pub mod store;
