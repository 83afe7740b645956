//! Error types emitted by the gisbatch CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use gisbatch_core::AppendError;
use gisbatch_data::{ClientBuildError, ServiceUrlError, SourceError};
use thiserror::Error;

/// Errors emitted by the gisbatch CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Opening the task file failed.
    #[error("failed to open task file at {path:?}")]
    OpenTaskFile {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Task file JSON could not be decoded.
    #[error("failed to parse task file at {path:?}")]
    ParseTaskFile {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The run log file could not be created.
    #[error("failed to create log file {path:?}")]
    CreateLogFile {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A global logger was already installed.
    #[error("failed to install logger")]
    InstallLogger(#[source] log::SetLoggerError),
    /// Constructing the portal client failed.
    #[error("failed to build portal client")]
    BuildClient(#[from] ClientBuildError),
    /// A task names an unusable service URL.
    #[error("task {task:?} has an invalid target")]
    InvalidTarget {
        task: String,
        #[source]
        source: ServiceUrlError,
    },
    /// Loading a task's source dataset failed.
    #[error("task {task:?} could not load its source")]
    LoadSource {
        task: String,
        #[source]
        source: SourceError,
    },
    /// An append task aborted.
    #[error("task {task:?} failed")]
    Append {
        task: String,
        #[source]
        source: AppendError,
    },
    /// Serialising the last-run record failed.
    #[error("failed to serialise last-run record")]
    SerialiseLastRun(#[source] serde_json::Error),
    /// Writing the last-run record failed.
    #[error("failed to write last-run record to {path:?}")]
    WriteLastRun {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error message followed by each `caused by` link.
#[must_use]
pub fn describe_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    message
}
