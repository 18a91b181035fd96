//! Core domain types and pure logic for the Nimbus cluster manager.
//!
//! This crate has no internal dependencies and performs no I/O. It holds
//! the error taxonomy, caller identity and access levels, the cluster and
//! job state machines, log record types, the layered-configuration model
//! with its merge engine, and command templating.

pub mod config;
pub mod error;
pub mod identity;
pub mod log;
pub mod status;
pub mod template;
pub mod types;
