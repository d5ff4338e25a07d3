//! Cluster Configuration
//!
//! Plain configuration values for the fixtures. Every field is optional;
//! anything left unset is filled in when the fixture starts.

use crate::runtime::output::OutputSink;
use shared::SharedError;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Environment variable overriding the start timeout of every process
pub const START_TIMEOUT_ENV: &str = "CONTROLPLANE_START_TIMEOUT_SECS";

/// Environment variable overriding the stop timeout of every process
pub const STOP_TIMEOUT_ENV: &str = "CONTROLPLANE_STOP_TIMEOUT_SECS";

/// Settings common to every managed binary
#[derive(Debug, Clone, Default)]
pub struct ProcessConfig {
    /// Path to the binary; looked up from the asset locations when unset
    pub path: Option<PathBuf>,
    pub start_timeout: Option<Duration>,
    pub stop_timeout: Option<Duration>,
    /// Where the child's stdout goes, in addition to readiness scanning
    pub stdout: OutputSink,
    /// Where the child's stderr goes, in addition to readiness scanning
    pub stderr: OutputSink,
    /// Poll this HTTP path on the bound URL instead of scanning for the marker
    pub health_check: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EtcdConfig {
    pub bind_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    /// Extra `key=value` argument templates, appended after the defaults
    pub extra_args: Vec<(String, String)>,
    pub process: ProcessConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ApiServerConfig {
    pub bind_url: Option<String>,
    pub cert_dir: Option<PathBuf>,
    pub secure_port: Option<u16>,
    /// Store endpoint; filled in by the control plane once etcd is ready
    pub etcd_url: Option<Url>,
    /// Extra `key=value` argument templates, appended after the defaults
    pub extra_args: Vec<(String, String)>,
    pub process: ProcessConfig,
}

/// Configuration for a whole control plane
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    pub etcd: EtcdConfig,
    pub api_server: ApiServerConfig,
}

impl ClusterConfig {
    /// Create a new builder
    pub fn builder() -> crate::config::builder::ClusterConfigBuilder {
        crate::config::builder::ClusterConfigBuilder::new()
    }

    /// Default configuration with timeouts taken from the environment
    pub fn from_env() -> Result<Self, SharedError> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply timeout overrides from `lookup` to fields the caller left unset
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, SharedError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(start) = parse_secs(START_TIMEOUT_ENV, lookup(START_TIMEOUT_ENV))? {
            self.etcd.process.start_timeout.get_or_insert(start);
            self.api_server.process.start_timeout.get_or_insert(start);
        }
        if let Some(stop) = parse_secs(STOP_TIMEOUT_ENV, lookup(STOP_TIMEOUT_ENV))? {
            self.etcd.process.stop_timeout.get_or_insert(stop);
            self.api_server.process.stop_timeout.get_or_insert(stop);
        }
        Ok(self)
    }
}

fn parse_secs(field: &str, value: Option<String>) -> Result<Option<Duration>, SharedError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|_| SharedError::InvalidConfig {
            field: field.to_string(),
            value,
        })
}

/// Turn `(key, value)` pairs into `key=value` arguments, keeping order
///
/// A pair with an empty value becomes a bare flag.
pub fn flatten_args(args: &[(String, String)]) -> Vec<String> {
    args.iter()
        .map(|(key, value)| if value.is_empty() { key.clone() } else { format!("{key}={value}") })
        .collect()
}
