//! Fixture-specific error types

use shared::{ComponentId, SharedError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Invalid bind URL for {component}: {url} ({reason})")]
    InvalidBindUrl { component: String, url: String, reason: String },

    #[error("Binary not found for {component}: {details}")]
    BinaryNotFound { component: String, details: String },

    #[error("Must have at least one of a component name or a binary path")]
    MissingBinaryName,

    #[error("Data directory operation failed: {operation} on {path}")]
    DataDir {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template resolution failed for '{template}': {reason}")]
    TemplateResolution { template: String, reason: String },

    #[error("Failed to spawn {binary}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout waiting for process {binary} to start after {timeout:?}")]
    StartTimeout { binary: String, timeout: Duration },

    #[error("Process {binary} exited before becoming ready (exit code {code:?})\n{output_tail}")]
    EarlyExit {
        binary: String,
        code: Option<i32>,
        output_tail: String,
    },

    #[error("Failed to stop process {binary}: {message}")]
    Stop { binary: String, message: String },

    #[error("Command {command} failed with exit code {code:?}\n---[ stdout ]---\n{stdout}\n---[ stderr ]---\n{stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("{component} is not ready")]
    NotReady { component: ComponentId },

    #[error("Process {binary} was already started")]
    AlreadyStarted { binary: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FixtureError {
    /// Errors caused by the supplied configuration rather than the managed process
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FixtureError::InvalidBindUrl { .. }
                | FixtureError::BinaryNotFound { .. }
                | FixtureError::MissingBinaryName
                | FixtureError::DataDir { .. }
                | FixtureError::TemplateResolution { .. }
                | FixtureError::SharedError(_)
        )
    }
}

pub type FixtureResult<T> = Result<T, FixtureError>;
