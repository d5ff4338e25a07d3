//! Configuration Management
//!
//! This module provides configuration structures and builders for fixture setup.

pub mod builder;
pub mod cluster;

// Re-export main types
pub use builder::ClusterConfigBuilder;
pub use cluster::{ApiServerConfig, ClusterConfig, EtcdConfig, ProcessConfig, flatten_args};
