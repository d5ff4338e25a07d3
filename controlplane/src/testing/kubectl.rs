//! kubectl invocation builder
//!
//! Every `with_*` method returns a new `KubeCtl`, so a base invocation can be
//! shared between tests and specialised without interference.

use crate::error::{FixtureError, FixtureResult};
use shared::{ComponentId, component_debug};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeCtl {
    path: PathBuf,
    kubeconfig: Option<PathBuf>,
    server: Option<String>,
    args: Vec<String>,
    namespace: Option<String>,
    output_format: Option<String>,
}

impl Default for KubeCtl {
    fn default() -> Self {
        Self::new(ComponentId::KubeCtl.binary_name())
    }
}

impl KubeCtl {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            kubeconfig: None,
            server: None,
            args: Vec::new(),
            namespace: None,
            output_format: None,
        }
    }

    pub fn with_path<P: Into<PathBuf>>(&self, path: P) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }

    pub fn with_kubeconfig<P: Into<PathBuf>>(&self, kubeconfig: P) -> Self {
        Self {
            kubeconfig: Some(kubeconfig.into()),
            ..self.clone()
        }
    }

    pub fn with_server<S: Into<String>>(&self, server: S) -> Self {
        Self {
            server: Some(server.into()),
            ..self.clone()
        }
    }

    /// Append arguments after any already present
    pub fn with_args<I, S>(&self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.args.extend(args.into_iter().map(Into::into));
        next
    }

    pub fn with_namespace<S: Into<String>>(&self, namespace: S) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..self.clone()
        }
    }

    /// Passed as `-o <format>`, e.g. `jsonpath={.items[*].metadata.name}`
    pub fn with_output_format<S: Into<String>>(&self, format: S) -> Self {
        Self {
            output_format: Some(format.into()),
            ..self.clone()
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Arguments in the order they are passed to the binary
    pub fn command_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 6);
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.display().to_string());
        }
        if let Some(server) = &self.server {
            args.push("--server".to_string());
            args.push(server.clone());
        }
        args.extend(self.args.iter().cloned());
        if let Some(namespace) = &self.namespace {
            args.push("--namespace".to_string());
            args.push(namespace.clone());
        }
        if let Some(format) = &self.output_format {
            args.push("-o".to_string());
            args.push(format.clone());
        }
        args
    }

    /// Run to completion and capture both output streams
    pub async fn run(&self) -> FixtureResult<CommandOutput> {
        let args = self.command_args();
        component_debug!(ComponentId::KubeCtl, "running {} {:?}", self.path.display(), args);

        let output = Command::new(&self.path)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| FixtureError::Spawn {
                binary: self.path.clone(),
                source,
            })?;

        Ok(CommandOutput {
            command: format!("{} {}", self.path.display(), args.join(" ")),
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Captured result of one invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: String,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Turn a non-zero exit into [`FixtureError::CommandFailed`]
    pub fn ensure_success(self) -> FixtureResult<Self> {
        if self.status.success() {
            return Ok(self);
        }
        Err(FixtureError::CommandFailed {
            command: self.command,
            code: self.status.code(),
            stdout: self.stdout,
            stderr: self.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_argument_order() {
        let kubectl = KubeCtl::new("kubectl")
            .with_output_format("jsonpath={.items}")
            .with_namespace("kube-system")
            .with_args(["get", "pods"])
            .with_server("http://127.0.0.1:8080")
            .with_kubeconfig("/tmp/kubeconfig");

        assert_eq!(
            kubectl.command_args(),
            vec![
                "--kubeconfig",
                "/tmp/kubeconfig",
                "--server",
                "http://127.0.0.1:8080",
                "get",
                "pods",
                "--namespace",
                "kube-system",
                "-o",
                "jsonpath={.items}",
            ]
        );
    }

    #[test]
    fn test_with_methods_leave_original_untouched() {
        let base = KubeCtl::default().with_server("http://127.0.0.1:8080");
        let pods = base.with_args(["get", "pods"]);
        let nodes = base.with_args(["get", "nodes"]).with_namespace("default");

        assert_eq!(base.command_args(), vec!["--server", "http://127.0.0.1:8080"]);
        assert_eq!(pods.command_args().last().map(String::as_str), Some("pods"));
        assert!(!pods.command_args().contains(&"--namespace".to_string()));
        assert_eq!(nodes.command_args()[3], "nodes");
        assert_eq!(base.path(), &PathBuf::from("kubectl"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_output() {
        let output = KubeCtl::new("/bin/echo")
            .with_server("http://127.0.0.1:8080")
            .with_args(["get", "pods"])
            .run()
            .await
            .unwrap()
            .ensure_success()
            .unwrap();

        assert_eq!(output.stdout, "--server http://127.0.0.1:8080 get pods\n");
        assert!(output.stderr.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_becomes_command_failed() {
        let output = KubeCtl::new("/bin/sh")
            .with_args(["-c", "echo nope >&2; exit 4"])
            .run()
            .await
            .unwrap();
        assert!(!output.success());

        let err = output.ensure_success().unwrap_err();
        assert_matches!(err, FixtureError::CommandFailed { code: Some(4), ref stderr, .. } if stderr == "nope\n");
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let err = KubeCtl::new("/nonexistent/kubectl").run().await.unwrap_err();
        assert_matches!(err, FixtureError::Spawn { .. });
    }
}
