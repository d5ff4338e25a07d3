//! Standard configurations pointing at the stand-in binary

use controlplane::{ApiServerConfig, ClusterConfig, EtcdConfig, ProcessConfig};
use std::path::PathBuf;
use std::time::Duration;

pub struct TestFixtures;

impl TestFixtures {
    pub const STANDIN: &'static str = env!("CARGO_BIN_EXE_controlplane-standin");

    pub const START_TIMEOUT: Duration = Duration::from_secs(10);
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn standin_path() -> PathBuf {
        PathBuf::from(Self::STANDIN)
    }

    pub fn process_config() -> ProcessConfig {
        ProcessConfig {
            path: Some(Self::standin_path()),
            start_timeout: Some(Self::START_TIMEOUT),
            stop_timeout: Some(Self::STOP_TIMEOUT),
            ..Default::default()
        }
    }

    pub fn etcd_config() -> EtcdConfig {
        EtcdConfig {
            process: Self::process_config(),
            ..Default::default()
        }
    }

    /// etcd stand-in told to misbehave in the given way
    pub fn etcd_with_behavior(behavior: &str) -> EtcdConfig {
        let mut config = Self::etcd_config();
        config
            .extra_args
            .push(("--standin-behavior".to_string(), behavior.to_string()));
        config
    }

    pub fn api_server_config() -> ApiServerConfig {
        ApiServerConfig {
            process: Self::process_config(),
            ..Default::default()
        }
    }

    pub fn cluster_config() -> ClusterConfig {
        ClusterConfig::builder()
            .etcd_path(Self::standin_path())
            .api_server_path(Self::standin_path())
            .start_timeout(Self::START_TIMEOUT)
            .stop_timeout(Self::STOP_TIMEOUT)
            .build()
    }
}
