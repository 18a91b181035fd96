//! Cluster and job lifecycle orchestration.
//!
//! The orchestrators are thin state machines over the entity store:
//! every synchronous operation validates, persists, and (for lifecycle
//! operations) enqueues a self-contained task descriptor before
//! returning. All remote work happens later, in a task runner driving
//! [`worker::ClusterWorker`], which reports back exclusively through the
//! orchestrators' update and log operations.

pub mod auth;
pub mod cluster;
pub mod job;
pub mod runner;
pub mod settings;
pub mod tasks;
pub mod worker;
