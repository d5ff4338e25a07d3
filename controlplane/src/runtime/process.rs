//! Process state machine
//!
//! Owns one external process from spawn to teardown:
//!
//! ```text
//! NotStarted -> Starting -> Ready -> Stopping -> Stopped
//!                   \
//!                    -> Failed
//! ```
//!
//! `start` blocks until the readiness signal, the start timeout or the
//! child's exit, whichever comes first. `stop` terminates gracefully,
//! escalates to a kill after the stop timeout and always cleans up.

use crate::error::{FixtureError, FixtureResult};
use crate::runtime::defaulting::DefaultedProcessInput;
use crate::runtime::health;
use crate::runtime::output::{self, OutputBuffer, OutputSink, SharedOutput, Stream, TAIL_LEN};
use shared::{ComponentId, component_debug, component_error, component_info, component_warn};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use url::Url;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// How long pump tasks get to drain after the child is gone
const PUMP_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    NotStarted,
    Starting,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

/// Signal that a process has finished initialising
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Literal text in stdout or stderr
    Marker(String),
    /// HTTP path on the bound URL answering with a success status
    HealthCheck(String),
}

enum StartOutcome {
    Ready(FixtureResult<()>),
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
}

pub struct ProcessState {
    component: ComponentId,
    input: DefaultedProcessInput,
    args: Vec<String>,
    readiness: Readiness,
    status: ProcessStatus,
    child: Option<Child>,
    pumps: Vec<JoinHandle<()>>,
    sinks: Vec<OutputSink>,
    output: SharedOutput,
    ready_line: Option<String>,
}

impl ProcessState {
    pub fn new(component: ComponentId, input: DefaultedProcessInput, args: Vec<String>, readiness: Readiness) -> Self {
        Self {
            component,
            input,
            args,
            readiness,
            status: ProcessStatus::NotStarted,
            child: None,
            pumps: Vec::new(),
            sinks: Vec::new(),
            output: Arc::new(Mutex::new(OutputBuffer::new(None))),
            ready_line: None,
        }
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    /// Rendered arguments the binary is (or will be) launched with
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn input(&self) -> &DefaultedProcessInput {
        &self.input
    }

    /// Endpoint of the process, available once ready
    pub fn url(&self) -> Option<&Url> {
        (self.status == ProcessStatus::Ready).then_some(&self.input.url)
    }

    /// Data directory of the process, available once ready
    pub fn data_dir(&self) -> Option<&Path> {
        (self.status == ProcessStatus::Ready).then(|| self.input.dir.path())
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// The output line carrying the readiness marker
    pub fn ready_line(&self) -> Option<&str> {
        self.ready_line.as_deref()
    }

    /// Snapshot of the retained combined output
    pub fn output(&self) -> String {
        output::lock(&self.output).contents()
    }

    /// File name of the binary, used in errors and logs
    pub fn binary_name(&self) -> String {
        self.input
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.path.display().to_string())
    }

    /// Launch the binary and wait until it is ready
    pub async fn start(&mut self, stdout: OutputSink, stderr: OutputSink) -> FixtureResult<()> {
        if self.status != ProcessStatus::NotStarted {
            return Err(FixtureError::AlreadyStarted {
                binary: self.binary_name(),
            });
        }
        self.status = ProcessStatus::Starting;

        component_info!(
            self.component,
            "🚀 Starting {} on {} (timeout {:?})",
            self.input.path.display(),
            self.input.url,
            self.input.start_timeout
        );
        component_debug!(self.component, "args: {:?}", self.args);

        let mut command = Command::new(&self.input.path);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.abandon(None).await;
                return Err(FixtureError::Spawn {
                    binary: self.input.path.clone(),
                    source,
                });
            }
        };

        let marker = match &self.readiness {
            Readiness::Marker(marker) => Some(marker.as_str()),
            Readiness::HealthCheck(_) => None,
        };
        self.output = Arc::new(Mutex::new(OutputBuffer::new(marker)));
        self.sinks = vec![stdout.clone(), stderr.clone()];

        let (ready_tx, ready_rx) = watch::channel(false);
        let ready_tx = Arc::new(ready_tx);
        if let Some(out) = child.stdout.take() {
            self.pumps
                .push(output::spawn_pump(out, Stream::Stdout, stdout, self.output.clone(), ready_tx.clone()));
        }
        if let Some(err) = child.stderr.take() {
            self.pumps
                .push(output::spawn_pump(err, Stream::Stderr, stderr, self.output.clone(), ready_tx));
        }

        let outcome = {
            let url = &self.input.url;
            let start_timeout = self.input.start_timeout;
            let kind = &self.readiness;
            let readiness = async move {
                match kind {
                    Readiness::Marker(_) => {
                        output::marker_seen(ready_rx).await;
                        Ok(())
                    }
                    Readiness::HealthCheck(path) => health::wait_until_healthy(url, path, health::POLL_INTERVAL).await,
                }
            };

            tokio::select! {
                biased;
                result = readiness => StartOutcome::Ready(result),
                status = child.wait() => StartOutcome::Exited(status),
                _ = sleep(start_timeout) => StartOutcome::TimedOut,
            }
        };

        match outcome {
            StartOutcome::Ready(Ok(())) => {
                self.ready_line = output::lock(&self.output).ready_line().map(str::to_string);
                self.child = Some(child);
                self.status = ProcessStatus::Ready;
                component_info!(
                    self.component,
                    "✅ {} ready on {} (pid {:?})",
                    self.binary_name(),
                    self.input.url,
                    self.pid()
                );
                Ok(())
            }
            StartOutcome::Ready(Err(e)) => {
                self.abandon(Some(child)).await;
                Err(e)
            }
            StartOutcome::Exited(Ok(status)) => {
                self.abandon(None).await;
                let output_tail = output::lock(&self.output).tail(TAIL_LEN);
                component_warn!(
                    self.component,
                    "⚠️ {} exited before becoming ready: {}",
                    self.binary_name(),
                    status
                );
                Err(FixtureError::EarlyExit {
                    binary: self.binary_name(),
                    code: status.code(),
                    output_tail,
                })
            }
            StartOutcome::Exited(Err(e)) => {
                self.abandon(Some(child)).await;
                Err(FixtureError::IoError(e))
            }
            StartOutcome::TimedOut => {
                component_warn!(
                    self.component,
                    "⏰ {} not ready after {:?}, killing it",
                    self.binary_name(),
                    self.input.start_timeout
                );
                self.abandon(Some(child)).await;
                Err(FixtureError::StartTimeout {
                    binary: self.binary_name(),
                    timeout: self.input.start_timeout,
                })
            }
        }
    }

    /// Terminate the process and release everything it owns
    ///
    /// A no-op unless the process is ready, so calling it twice is fine.
    pub async fn stop(&mut self) -> FixtureResult<()> {
        if self.status != ProcessStatus::Ready {
            return Ok(());
        }
        self.status = ProcessStatus::Stopping;
        component_info!(self.component, "🛑 Stopping {}", self.binary_name());

        let result = match self.child.take() {
            Some(mut child) => self.terminate(&mut child).await,
            None => Ok(()),
        };

        if let Err(e) = &result {
            component_error!(self.component, "❌ {}", e);
        }

        self.release().await;
        self.status = ProcessStatus::Stopped;
        result
    }

    async fn terminate(&self, child: &mut Child) -> FixtureResult<()> {
        self.send_terminate(child);

        match timeout(self.input.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                component_debug!(self.component, "{} exited with {}", self.binary_name(), status);
                Ok(())
            }
            Ok(Err(e)) => Err(FixtureError::Stop {
                binary: self.binary_name(),
                message: e.to_string(),
            }),
            Err(_) => {
                component_warn!(
                    self.component,
                    "⚠️ {} still running after {:?}, sending SIGKILL",
                    self.binary_name(),
                    self.input.stop_timeout
                );
                let kill_failed = |e: std::io::Error| FixtureError::Stop {
                    binary: self.binary_name(),
                    message: e.to_string(),
                };
                child.start_kill().map_err(kill_failed)?;
                child.wait().await.map_err(kill_failed)?;
                Ok(())
            }
        }
    }

    #[cfg(unix)]
    fn send_terminate(&self, child: &mut Child) {
        if let Some(pid) = child.id() {
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                component_warn!(self.component, "⚠️ Failed to send SIGTERM to {}: {}", pid, e);
            }
        }
    }

    #[cfg(not(unix))]
    fn send_terminate(&self, child: &mut Child) {
        if let Err(e) = child.start_kill() {
            component_warn!(self.component, "⚠️ Failed to terminate {}: {}", self.binary_name(), e);
        }
    }

    /// Clean up after a failed start; kills the child if it is still around
    async fn abandon(&mut self, child: Option<Child>) {
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                component_debug!(self.component, "kill after failed start: {}", e);
            }
            if let Err(e) = child.wait().await {
                component_warn!(self.component, "⚠️ Failed to reap {}: {}", self.binary_name(), e);
            }
        }
        self.release().await;
        self.status = ProcessStatus::Failed;
    }

    /// Join pumps, close sinks and remove a self-created data directory
    async fn release(&mut self) {
        for mut pump in self.pumps.drain(..) {
            if timeout(PUMP_JOIN_TIMEOUT, &mut pump).await.is_err() {
                // Something else still holds the pipe open (a grandchild, usually).
                pump.abort();
            }
        }

        for sink in self.sinks.drain(..) {
            sink.flush();
        }

        if let Err(e) = self.input.dir.cleanup() {
            component_warn!(self.component, "⚠️ Best-effort cleanup failed: {}", e);
        }
    }
}

impl Drop for ProcessState {
    fn drop(&mut self) {
        // kill_on_drop takes care of the child; this only makes the leak visible.
        if self.child.is_some() {
            component_warn!(self.component, "🚨 {} dropped while running, killing it", self.binary_name());
        }
    }
}
