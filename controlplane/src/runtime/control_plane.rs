//! Composite control plane: etcd plus an API server wired to it

use crate::config::ClusterConfig;
use crate::error::{FixtureError, FixtureResult};
use crate::runtime::apiserver::ApiServer;
use crate::runtime::defaulting::bin_path_finder;
use crate::runtime::etcd::Etcd;
use crate::runtime::process::ProcessStatus;
use crate::runtime::templates::url_string;
use crate::testing::KubeCtl;
use async_trait::async_trait;
use shared::logging::{log_error, log_shutdown, log_startup};
use shared::{ComponentId, component_debug, component_info, component_warn};
use std::path::PathBuf;
use url::Url;

/// Lifecycle every cluster fixture exposes to a test suite
#[async_trait]
pub trait ClusterFixture: Send {
    /// Replace the configuration and bring the fixture up
    async fn setup(&mut self, config: ClusterConfig) -> FixtureResult<()>;

    /// Bring the fixture down; safe to call repeatedly
    async fn teardown(&mut self) -> FixtureResult<()>;

    /// Endpoint clients should talk to, once the fixture is up
    fn client_url(&self) -> Option<Url>;
}

pub struct ControlPlane {
    etcd: Etcd,
    api_server: ApiServer,
}

impl ControlPlane {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            etcd: Etcd::new(config.etcd),
            api_server: ApiServer::new(config.api_server),
        }
    }

    /// Start etcd, then an API server pointed at it
    ///
    /// If the API server fails to come up, etcd is stopped again before the
    /// error is returned.
    pub async fn start(&mut self) -> FixtureResult<()> {
        log_startup(&ComponentId::ControlPlane, "etcd and API server");

        self.etcd.start().await?;
        let etcd_url = self.etcd.url().cloned().ok_or(FixtureError::NotReady {
            component: ComponentId::Etcd,
        })?;
        self.api_server.set_etcd_url(etcd_url);

        if let Err(e) = self.api_server.start().await {
            log_error(&ComponentId::ControlPlane, "API server start", &e);
            if let Err(stop_err) = self.etcd.stop().await {
                component_warn!(ComponentId::ControlPlane, "⚠️ Failed to stop etcd after API server failure: {}", stop_err);
            }
            return Err(e);
        }

        component_info!(
            ComponentId::ControlPlane,
            "✅ Control plane ready (API server {:?}, etcd {:?})",
            self.api_server.url().map(Url::as_str),
            self.etcd.url().map(Url::as_str)
        );
        Ok(())
    }

    /// Stop the API server, then etcd; both are attempted and the first error wins
    pub async fn stop(&mut self) -> FixtureResult<()> {
        log_shutdown(&ComponentId::ControlPlane, "stopping API server, then etcd");
        let api_result = self.api_server.stop().await;
        let etcd_result = self.etcd.stop().await;
        component_info!(ComponentId::ControlPlane, "✅ Control plane stopped");
        api_result.and(etcd_result)
    }

    pub fn etcd(&self) -> &Etcd {
        &self.etcd
    }

    pub fn etcd_mut(&mut self) -> &mut Etcd {
        &mut self.etcd
    }

    pub fn api_server(&self) -> &ApiServer {
        &self.api_server
    }

    pub fn api_server_mut(&mut self) -> &mut ApiServer {
        &mut self.api_server
    }

    /// API server endpoint, once ready
    pub fn api_url(&self) -> Option<&Url> {
        self.api_server.url()
    }

    pub fn is_running(&self) -> bool {
        self.api_server.status() == ProcessStatus::Ready
    }

    /// A client wired to this control plane's API server
    ///
    /// The binary is looked up like every other asset; when none is found the
    /// bare name is used and left to `PATH` at run time.
    pub fn kubectl(&self) -> FixtureResult<KubeCtl> {
        let url = self.api_url().ok_or(FixtureError::NotReady {
            component: ComponentId::ApiServer,
        })?;

        let name = ComponentId::KubeCtl.binary_name();
        let path = bin_path_finder(name).unwrap_or_else(|e| {
            component_debug!(ComponentId::KubeCtl, "falling back to {} on PATH: {}", name, e);
            PathBuf::from(name)
        });

        Ok(KubeCtl::new(path).with_server(url_string(url)))
    }
}

#[async_trait]
impl ClusterFixture for ControlPlane {
    async fn setup(&mut self, config: ClusterConfig) -> FixtureResult<()> {
        if self.is_running() {
            return Err(FixtureError::AlreadyStarted {
                binary: ComponentId::ControlPlane.to_string(),
            });
        }
        *self = ControlPlane::new(config);
        self.start().await
    }

    async fn teardown(&mut self) -> FixtureResult<()> {
        self.stop().await
    }

    fn client_url(&self) -> Option<Url> {
        self.api_url().cloned()
    }
}
