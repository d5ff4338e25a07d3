//! kube-apiserver fixture
//!
//! The API server keeps generated serving certificates in its data
//! directory, so `DataDir` and `CertDir` name the same path.

use crate::config::{ApiServerConfig, flatten_args};
use crate::error::FixtureResult;
use crate::runtime::defaulting::do_defaulting;
use crate::runtime::process::{ProcessState, ProcessStatus, Readiness};
use crate::runtime::templates::TemplateContext;
use crate::runtime::{ensure_startable, render_args};
use shared::{ComponentId, component_info};
use std::path::Path;
use url::Url;

pub const API_SERVER_DEFAULT_ARGS: &[&str] = &[
    "--advertise-address=127.0.0.1",
    "--etcd-servers={{ .EtcdURL }}",
    "--cert-dir={{ .CertDir }}",
    "--insecure-port={{ .URL.Port }}",
    "--insecure-bind-address={{ .URL.Hostname }}",
    "--secure-port={{ .SecurePort }}",
    "--admission-control=AlwaysAdmit",
    "--service-cluster-ip-range=10.0.0.0/24",
];

/// Line prefix the API server logs once its insecure listener is up
pub const API_SERVER_START_MESSAGE: &str = "Serving insecurely on ";

pub struct ApiServer {
    config: ApiServerConfig,
    state: Option<ProcessState>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self { config, state: None }
    }

    pub fn config(&self) -> &ApiServerConfig {
        &self.config
    }

    /// Point the API server at its store; takes effect on the next start
    pub fn set_etcd_url(&mut self, url: Url) {
        self.config.etcd_url = Some(url);
    }

    pub fn etcd_url(&self) -> Option<&Url> {
        self.config.etcd_url.as_ref()
    }

    pub async fn start(&mut self) -> FixtureResult<()> {
        let component = ComponentId::ApiServer;
        ensure_startable(self.state.as_ref())?;

        let mut input = do_defaulting(
            component.binary_name(),
            self.config.bind_url.as_deref(),
            self.config.cert_dir.as_deref(),
            self.config.process.path.as_deref(),
            self.config.process.start_timeout,
            self.config.process.stop_timeout,
        )?;

        let secure_port = self.config.secure_port.unwrap_or(0);
        let context = TemplateContext::new()
            .with_url("URL", &input.url)
            .with_path("DataDir", input.dir.path())
            .with_path("CertDir", input.dir.path())
            .with_optional_url("EtcdURL", self.config.etcd_url.as_ref())
            .with_text("SecurePort", secure_port.to_string());

        let mut templates: Vec<String> = API_SERVER_DEFAULT_ARGS.iter().map(|arg| arg.to_string()).collect();
        templates.extend(flatten_args(&self.config.extra_args));
        let args = render_args(component, &mut input, &templates, &context)?;

        let readiness = match &self.config.process.health_check {
            Some(path) => Readiness::HealthCheck(path.clone()),
            None => Readiness::Marker(API_SERVER_START_MESSAGE.to_string()),
        };

        let state = self.state.insert(ProcessState::new(component, input, args, readiness));
        state
            .start(self.config.process.stdout.clone(), self.config.process.stderr.clone())
            .await
    }

    pub async fn stop(&mut self) -> FixtureResult<()> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        state.stop().await?;
        component_info!(ComponentId::ApiServer, "✅ API server stopped");
        Ok(())
    }

    /// Insecure endpoint clients talk to, once ready
    pub fn url(&self) -> Option<&Url> {
        self.state.as_ref().and_then(ProcessState::url)
    }

    /// Certificate directory, once ready
    pub fn data_dir(&self) -> Option<&Path> {
        self.state.as_ref().and_then(ProcessState::data_dir)
    }

    pub fn status(&self) -> ProcessStatus {
        self.state.as_ref().map_or(ProcessStatus::NotStarted, ProcessState::status)
    }

    pub fn pid(&self) -> Option<u32> {
        self.state.as_ref().and_then(ProcessState::pid)
    }

    pub fn ready_line(&self) -> Option<&str> {
        self.state.as_ref().and_then(ProcessState::ready_line)
    }

    pub fn args(&self) -> &[String] {
        self.state.as_ref().map(ProcessState::args).unwrap_or_default()
    }

    pub fn output(&self) -> String {
        self.state.as_ref().map(ProcessState::output).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FixtureError;
    use assert_matches::assert_matches;
    use std::path::PathBuf;

    #[test]
    fn test_default_args_render_with_absent_etcd_url() {
        let url = Url::parse("http://127.0.0.1:8080").unwrap();
        let context = TemplateContext::new()
            .with_url("URL", &url)
            .with_path("DataDir", Path::new("/tmp/certs"))
            .with_path("CertDir", Path::new("/tmp/certs"))
            .with_optional_url("EtcdURL", None)
            .with_text("SecurePort", "0");

        let rendered = crate::runtime::templates::render_templates(API_SERVER_DEFAULT_ARGS, &context).unwrap();
        assert_eq!(
            rendered,
            vec![
                "--advertise-address=127.0.0.1",
                "--etcd-servers=",
                "--cert-dir=/tmp/certs",
                "--insecure-port=8080",
                "--insecure-bind-address=127.0.0.1",
                "--secure-port=0",
                "--admission-control=AlwaysAdmit",
                "--service-cluster-ip-range=10.0.0.0/24",
            ]
        );
    }

    #[test]
    fn test_set_etcd_url() {
        let mut server = ApiServer::new(ApiServerConfig::default());
        assert!(server.etcd_url().is_none());

        let url = Url::parse("http://127.0.0.1:2379").unwrap();
        server.set_etcd_url(url.clone());
        assert_eq!(server.etcd_url(), Some(&url));
    }

    #[tokio::test]
    async fn test_invalid_bind_url_is_configuration_error() {
        let config = ApiServerConfig {
            bind_url: Some("not a url".to_string()),
            ..Default::default()
        };
        let mut server = ApiServer::new(config);

        let err = server.start().await.unwrap_err();
        assert_matches!(err, FixtureError::InvalidBindUrl { .. });
        assert!(err.is_configuration());
        assert!(server.url().is_none());
    }

    #[tokio::test]
    async fn test_caller_cert_dir_is_not_removed_on_failed_render() {
        let certs = tempfile::tempdir().unwrap();
        let mut config = ApiServerConfig {
            cert_dir: Some(certs.path().to_path_buf()),
            ..Default::default()
        };
        config.process.path = Some(PathBuf::from("/bin/sh"));
        config.extra_args.push(("--bogus".into(), "{{ .Nope }}".into()));
        let mut server = ApiServer::new(config);

        assert_matches!(server.start().await, Err(FixtureError::TemplateResolution { .. }));
        assert!(certs.path().exists());
    }
}
