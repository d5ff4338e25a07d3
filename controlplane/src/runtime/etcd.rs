//! etcd fixture

use crate::config::{EtcdConfig, flatten_args};
use crate::error::FixtureResult;
use crate::runtime::defaulting::do_defaulting;
use crate::runtime::process::{ProcessState, ProcessStatus, Readiness};
use crate::runtime::templates::TemplateContext;
use crate::runtime::{ensure_startable, render_args};
use shared::{ComponentId, component_info};
use std::path::Path;
use url::Url;

/// Arguments every etcd is started with, before caller extras
pub const ETCD_DEFAULT_ARGS: &[&str] = &[
    "--listen-peer-urls=http://localhost:0",
    "--advertise-client-urls={{ .URL }}",
    "--listen-client-urls={{ .URL }}",
    "--data-dir={{ .DataDir }}",
];

/// Readiness marker etcd logs for the given client URL
///
/// Only the prefix is matched; etcd appends the address and, for plain
/// listeners, a warning about insecure use.
pub fn etcd_start_message(url: &Url) -> &'static str {
    match url.scheme() {
        "https" | "unixs" => "serving client requests on ",
        _ => "serving insecure client requests on ",
    }
}

/// A single etcd member bound to a local URL
pub struct Etcd {
    config: EtcdConfig,
    state: Option<ProcessState>,
}

impl Etcd {
    pub fn new(config: EtcdConfig) -> Self {
        Self { config, state: None }
    }

    pub fn config(&self) -> &EtcdConfig {
        &self.config
    }

    /// Resolve defaults, render arguments and block until etcd serves clients
    pub async fn start(&mut self) -> FixtureResult<()> {
        let component = ComponentId::Etcd;
        ensure_startable(self.state.as_ref())?;

        let mut input = do_defaulting(
            component.binary_name(),
            self.config.bind_url.as_deref(),
            self.config.data_dir.as_deref(),
            self.config.process.path.as_deref(),
            self.config.process.start_timeout,
            self.config.process.stop_timeout,
        )?;

        let context = TemplateContext::new()
            .with_url("URL", &input.url)
            .with_path("DataDir", input.dir.path());

        let mut templates: Vec<String> = ETCD_DEFAULT_ARGS.iter().map(|arg| arg.to_string()).collect();
        templates.extend(flatten_args(&self.config.extra_args));
        let args = render_args(component, &mut input, &templates, &context)?;

        let readiness = match &self.config.process.health_check {
            Some(path) => Readiness::HealthCheck(path.clone()),
            None => Readiness::Marker(etcd_start_message(&input.url).to_string()),
        };

        let state = self.state.insert(ProcessState::new(component, input, args, readiness));
        state
            .start(self.config.process.stdout.clone(), self.config.process.stderr.clone())
            .await
    }

    pub async fn stop(&mut self) -> FixtureResult<()> {
        match self.state.as_mut() {
            Some(state) => {
                state.stop().await?;
                component_info!(ComponentId::Etcd, "✅ etcd stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Client URL, once ready
    pub fn url(&self) -> Option<&Url> {
        self.state.as_ref().and_then(ProcessState::url)
    }

    /// Data directory in use, once ready
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

    /// Rendered command line of the last start attempt
    pub fn args(&self) -> &[String] {
        self.state.as_ref().map(ProcessState::args).unwrap_or_default()
    }

    pub fn output(&self) -> String {
        self.state.as_ref().map(ProcessState::output).unwrap_or_default()
    }
}
