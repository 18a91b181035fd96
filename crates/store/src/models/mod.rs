pub mod cluster;
pub mod config;
pub mod job;

pub use cluster::{Cluster, CreateCluster, SshHost, UpdateCluster};
pub use config::Config;
pub use job::{CreateJob, Job};
