//! Cluster Configuration Builder
//!
//! Provides a builder pattern for constructing cluster configurations

use super::ClusterConfig;
use crate::runtime::output::OutputSink;
use std::path::PathBuf;
use std::time::Duration;

pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClusterConfig::default(),
        }
    }

    /// Set the URL etcd serves clients on
    pub fn etcd_bind_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.etcd.bind_url = Some(url.into());
        self
    }

    /// Use an existing etcd data directory (never deleted by the fixture)
    pub fn etcd_data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.etcd.data_dir = Some(dir.into());
        self
    }

    /// Set the etcd binary path
    pub fn etcd_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.etcd.process.path = Some(path.into());
        self
    }

    /// Append an etcd argument template
    pub fn etcd_arg<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.config.etcd.extra_args.push((key.into(), value.into()));
        self
    }

    pub fn etcd_health_check<S: Into<String>>(mut self, path: S) -> Self {
        self.config.etcd.process.health_check = Some(path.into());
        self
    }

    /// Set the URL the API server serves insecure traffic on
    pub fn api_server_bind_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.api_server.bind_url = Some(url.into());
        self
    }

    /// Use an existing certificate directory (never deleted by the fixture)
    pub fn cert_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.api_server.cert_dir = Some(dir.into());
        self
    }

    /// Set the kube-apiserver binary path
    pub fn api_server_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.api_server.process.path = Some(path.into());
        self
    }

    /// Append an API server argument template
    pub fn api_server_arg<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.config.api_server.extra_args.push((key.into(), value.into()));
        self
    }

    /// Set the API server secure port (0 disables secure serving)
    pub fn secure_port(mut self, port: u16) -> Self {
        self.config.api_server.secure_port = Some(port);
        self
    }

    /// Confirm API server readiness by polling this path instead of scanning output
    pub fn api_server_health_check<S: Into<String>>(mut self, path: S) -> Self {
        self.config.api_server.process.health_check = Some(path.into());
        self
    }

    /// Set the start timeout for both processes
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.config.etcd.process.start_timeout = Some(timeout);
        self.config.api_server.process.start_timeout = Some(timeout);
        self
    }

    /// Set the stop timeout for both processes
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.etcd.process.stop_timeout = Some(timeout);
        self.config.api_server.process.stop_timeout = Some(timeout);
        self
    }

    /// Send the stdout of both processes to `sink`
    pub fn stdout(mut self, sink: OutputSink) -> Self {
        self.config.etcd.process.stdout = sink.clone();
        self.config.api_server.process.stdout = sink;
        self
    }

    /// Send the stderr of both processes to `sink`
    pub fn stderr(mut self, sink: OutputSink) -> Self {
        self.config.etcd.process.stderr = sink.clone();
        self.config.api_server.process.stderr = sink;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ClusterConfig {
        self.config
    }
}

impl Default for ClusterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
