//! Error types for import, checkpoint, drift and rollback operations.
//!
//! Errors are categorised so callers can tell a batch-level abort apart
//! from a best-effort persistence failure. Per-job and per-rollback-step
//! failures are never returned through this type; they are recorded in
//! [`ImportSummary`](crate::ImportSummary) and
//! [`RollbackSummary`](crate::RollbackSummary) instead.

use crate::context::CancelReason;
use crate::rollback::RollbackSummary;
use crate::types::ImportSummary;
use std::path::PathBuf;
use thiserror::Error;

/// Categories of errors, used to decide whether a batch must stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The batch was cancelled or ran past its deadline
    Aborted,
    /// The external tool is missing or the directory is not initialized
    Precondition,
    /// The external tool ran and reported a failure
    Tool,
    /// Checkpoint or import log could not be read or written
    Persistence,
    /// Drift was found and the caller asked to abort on drift
    Drift,
    /// The user declined a confirmation prompt
    Declined,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether errors of this category stop the current batch.
    pub fn is_fatal_to_batch(&self) -> bool {
        matches!(self, Self::Aborted | Self::Precondition | Self::Drift | Self::Declined)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Aborted => "Batch aborted",
            Self::Precondition => "Precondition not met",
            Self::Tool => "Terraform command failed",
            Self::Persistence => "Could not persist progress",
            Self::Drift => "Configuration drift detected",
            Self::Declined => "Cancelled by user",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors that can occur while importing, checking drift or rolling back.
#[derive(Debug, Error)]
pub enum Error {
    /// The tool binary could not be located in PATH
    #[error("{binary} command not found in PATH")]
    ToolNotFound {
        /// Name of the binary that was looked up
        binary: String,
    },

    /// The working directory does not look like an initialized tool directory
    #[error("not in a Terraform directory (no .terraform or terraform.tfstate found in {})", .0.display())]
    NotInitialized(PathBuf),

    /// The tool could not be launched at all
    #[error("failed to execute {command}: {source}")]
    Launch {
        /// The command line that failed to start
        command: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and exited unsuccessfully
    #[error("{command} failed with exit code {}", .exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    CommandFailed {
        /// The command line that failed
        command: String,
        /// Exit code, if the process exited normally
        exit_code: Option<i32>,
        /// Combined stdout and stderr
        output: String,
    },

    /// The batch stopped early
    #[error("import batch aborted: {reason}")]
    Aborted {
        /// Why the batch stopped
        reason: CancelReason,
        /// Everything that was processed before the abort
        summary: Box<ImportSummary>,
    },

    /// The operation was cancelled before it could do anything
    #[error("operation {0}")]
    Cancelled(CancelReason),

    /// Import log file is missing
    #[error("import log not found: {}", .0.display())]
    ImportLogNotFound(PathBuf),

    /// Checkpoint file is missing
    #[error("no checkpoint found at {}", .0.display())]
    CheckpointNotFound(PathBuf),

    /// One or more rollback steps failed; the import log is kept
    #[error("rollback completed with {failed} error(s)")]
    RollbackIncomplete {
        /// Number of state removals that failed
        failed: usize,
        /// Every step that ran
        summary: Box<RollbackSummary>,
    },

    /// The rollback stopped early; the import log is kept
    #[error("rollback {reason} with {} removal(s) not attempted", .summary.not_attempted)]
    RollbackInterrupted {
        reason: CancelReason,
        summary: Box<RollbackSummary>,
    },

    /// `plan -detailed-exitcode` returned something other than 0 or 2
    #[error("terraform plan failed with exit code {exit_code}")]
    PlanFailed {
        /// Exit code reported by plan
        exit_code: i32,
        /// Combined plan output
        output: String,
    },

    /// Drift was detected and the caller configured abort-on-drift
    #[error("aborting due to detected drift in {count} resource(s)")]
    DriftDetected {
        /// Number of drifted resources parsed from plan output
        count: usize,
    },

    /// The user answered no to a confirmation
    #[error("{0} cancelled by user")]
    Declined(String),

    /// IO error with the file it concerned
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        /// File being read or written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialisation error
    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        /// File being parsed or written
        path: PathBuf,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Aborted { .. } | Error::Cancelled(_) | Error::RollbackInterrupted { .. } => {
                ErrorCategory::Aborted
            }
            Error::ToolNotFound { .. }
            | Error::NotInitialized(_)
            | Error::ImportLogNotFound(_)
            | Error::CheckpointNotFound(_) => ErrorCategory::Precondition,
            Error::Launch { .. }
            | Error::CommandFailed { .. }
            | Error::PlanFailed { .. }
            | Error::RollbackIncomplete { .. } => ErrorCategory::Tool,
            Error::Io { .. } | Error::Json { .. } => ErrorCategory::Persistence,
            Error::DriftDetected { .. } => ErrorCategory::Drift,
            Error::Declined(_) => ErrorCategory::Declined,
            Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error stops the current batch.
    pub fn is_fatal_to_batch(&self) -> bool {
        self.category().is_fatal_to_batch()
    }

    /// The partial summary carried by an aborted batch.
    pub fn partial_summary(&self) -> Option<&ImportSummary> {
        match self {
            Error::Aborted { summary, .. } => Some(&**summary),
            _ => None,
        }
    }

    /// The steps of a rollback that did not finish cleanly.
    pub fn rollback_summary(&self) -> Option<&RollbackSummary> {
        match self {
            Error::RollbackIncomplete { summary, .. } | Error::RollbackInterrupted { summary, .. } => {
                Some(&**summary)
            }
            _ => None,
        }
    }

    /// Captured tool output, when the error came from the tool.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            Error::CommandFailed { output, .. } | Error::PlanFailed { output, .. } => {
                Some(output.as_str())
            }
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json {
            path: path.into(),
            source,
        }
    }
}

/// Result type for import operations.
pub type Result<T> = std::result::Result<T, Error>;
