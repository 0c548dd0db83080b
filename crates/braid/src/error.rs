//! Error types for braid operations.
//!
//! The taxonomy follows the boundaries the rest of the crate is built
//! around: validation and graph-integrity errors are rejected before any
//! mutation is applied, reconciliation errors name the pipeline step that
//! failed and are retried rather than escalated, and IPC errors distinguish
//! an unreachable daemon from a version-mismatched one.

use std::io;

use thiserror::Error;

use crate::domain::{DependencyType, IssueStatus};

/// Bad field values, rejected before any mutation is applied.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Title is empty or whitespace-only.
    #[error("Title must not be empty")]
    EmptyTitle,

    /// Title exceeds the maximum length.
    #[error("Title exceeds {max} characters")]
    TitleTooLong {
        /// Maximum allowed title length.
        max: usize,
    },

    /// Priority outside the 0-4 range.
    #[error("Invalid priority {0}: must be 0-4")]
    InvalidPriority(u8),

    /// Status change not permitted by the transition matrix.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        /// Current status.
        from: IssueStatus,
        /// Requested status.
        to: IssueStatus,
    },

    /// The referenced parent is not an epic.
    #[error("Issue {0} is not an epic and cannot own children")]
    NotAnEpic(String),

    /// Issue ID prefix failed format validation.
    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),
}

/// Structural violations of the dependency graph, rejected before mutation.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Adding the edge would close a cycle over `blocks` edges.
    #[error("Adding dependency {from} -> {to} would create a cycle")]
    CycleDetected {
        /// Dependent issue id.
        from: String,
        /// Blocking issue id.
        to: String,
    },

    /// An issue cannot depend on itself.
    #[error("Issue {0} cannot depend on itself")]
    SelfDependency(String),

    /// The exact `(from, to, type)` edge already exists.
    #[error("Dependency {from} -> {to} ({dep_type}) already exists")]
    DuplicateDependency {
        /// Dependent issue id.
        from: String,
        /// Target issue id.
        to: String,
        /// Edge type.
        dep_type: DependencyType,
    },

    /// Child ids nest at most three levels below the root id.
    #[error("Cannot nest below {0}: hierarchy depth exceeded (max 3 levels)")]
    HierarchyDepthExceeded(String),

    /// ID generation ran out of hash widths.
    #[error("Unable to generate a unique id for this content after widening to {max_width} chars")]
    CollisionExhausted {
        /// Widest hash length attempted.
        max_width: usize,
    },

    /// An issue cannot be merged into itself.
    #[error("Cannot merge issue {0} into itself")]
    SelfMerge(String),

    /// No `blocks` path exists between the two issues.
    #[error("No dependency path from {from} to {to}")]
    NoPath {
        /// Start issue id.
        from: String,
        /// Goal issue id.
        to: String,
    },
}

/// Steps of the reconciliation cycle, used to tag step failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// Serializing the store to the interchange file.
    Export,
    /// Committing the interchange file to git.
    Commit,
    /// Pulling/rebasing remote history.
    Pull,
    /// Re-importing the interchange file.
    Import,
    /// Pushing local history.
    Push,
}

impl std::fmt::Display for SyncStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Export => "export",
            Self::Commit => "commit",
            Self::Pull => "pull",
            Self::Import => "import",
            Self::Push => "push",
        };
        f.write_str(name)
    }
}

/// A reconciliation pipeline step failed.
///
/// Completed steps are not rolled back; the cycle is retried on the next
/// timer tick.
#[derive(Debug, Error)]
#[error("Reconciliation failed at {step}: {message}")]
pub struct ReconcileError {
    /// The step that failed.
    pub step: SyncStep,
    /// What went wrong.
    pub message: String,
}

impl ReconcileError {
    /// Tag an error message with the failing step.
    pub fn at(step: SyncStep, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

/// Transport-level failures talking to the sync daemon.
#[derive(Debug, Error)]
pub enum IpcError {
    /// No daemon is listening on the workspace socket.
    #[error("Daemon unreachable at {path}: {reason}")]
    Unreachable {
        /// Socket path that was tried.
        path: String,
        /// Underlying connect/IO failure.
        reason: String,
    },

    /// The daemon did not answer within the request deadline.
    #[error("Daemon did not respond within {timeout_secs}s")]
    Timeout {
        /// Deadline that elapsed.
        timeout_secs: u64,
    },

    /// The running daemon speaks a different protocol version.
    #[error("Daemon version mismatch: client {client}, daemon {daemon}")]
    VersionMismatch {
        /// This client's version.
        client: String,
        /// The daemon's version.
        daemon: String,
    },

    /// The daemon sent something that is not a valid response.
    #[error("Invalid daemon response: {0}")]
    Protocol(String),

    /// The daemon answered with an error status.
    #[error("Daemon error: {0}")]
    Daemon(String),
}

/// The error type for braid operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad field values.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Graph-integrity violation.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Referenced issue does not exist.
    #[error("Issue not found: {0}")]
    NotFound(String),

    /// A reconciliation step failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// IPC transport failure.
    #[error(transparent)]
    Ipc(#[from] IpcError),

    /// Configuration problem (missing workspace, bad config file).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another process holds the store lock.
    #[error("Workspace is locked by process {pid} ({path})")]
    Locked {
        /// Pid recorded in the lock file.
        pid: u32,
        /// Lock file path.
        path: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSONL file error.
    #[error("Interchange file error: {0}")]
    Jsonl(#[from] braid_jsonl::Error),
}

impl Error {
    /// Whether this error is the caller's fault (CLI exit code 1) rather
    /// than an internal failure (exit code 2).
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Graph(_) | Self::NotFound(_) | Self::Config(_)
        )
    }
}

/// A specialized Result type for braid operations.
pub type Result<T> = std::result::Result<T, Error>;
