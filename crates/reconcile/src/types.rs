//! Core types for resumable reconciliation

use crate::context::CallbackContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Canonical failure taxonomy exposed to the invoking scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The resource (or a dependency being created) already exists
    AlreadyExists,
    /// The resource or a referenced dependency does not exist
    NotFound,
    /// The operation is invalid given the current remote state
    ResourceConflict,
    /// A provider quota or capacity limit was hit
    ServiceLimitExceeded,
    /// The request was rejected as malformed
    InvalidRequest,
    /// The caller lacks permission
    AccessDenied,
    /// Stabilization timed out or hit a terminal resource status
    NotStabilized,
    /// The provider throttled the request
    Throttling,
    /// Unclassified or unexpected failure
    InternalFailure,
}

impl ErrorKind {
    /// Stable outcome code, as surfaced by the host
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyExists => "AlreadyExists",
            Self::NotFound => "NotFound",
            Self::ResourceConflict => "ResourceConflict",
            Self::ServiceLimitExceeded => "ServiceLimitExceeded",
            Self::InvalidRequest => "InvalidRequest",
            Self::AccessDenied => "AccessDenied",
            Self::NotStabilized => "NotStabilized",
            Self::Throttling => "Throttling",
            Self::InternalFailure => "InternalFailure",
        }
    }

    /// Whether the scheduler may reasonably retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttling)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle operation a pipeline is composed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating a single step or stage
///
/// The resumable context is threaded separately by `&mut`, so a step's
/// progress carries only the verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The step achieved its effect
    Done,
    /// The step is waiting; re-invoke after `retry_after`
    InProgress { retry_after: Duration },
    /// The step failed terminally
    Failed { kind: ErrorKind, message: String },
}

impl Progress {
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn in_progress(retry_after: Duration) -> Self {
        Self::InProgress { retry_after }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// The failure kind, if this progress is a failure
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Value handed back to the invoking scheduler after a pipeline run
///
/// `M` is the desired model, `O` what a successful run observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressEvent<M, O = M> {
    /// Re-invoke with the same model and this context after `retry_after`
    InProgress {
        model: M,
        context: CallbackContext,
        retry_after: Duration,
    },
    /// Pipeline complete
    Success { observed: Option<O> },
    /// Pipeline stopped on a classified failure
    Failed {
        model: M,
        context: CallbackContext,
        kind: ErrorKind,
        message: String,
    },
}

impl<M, O> ProgressEvent<M, O> {
    /// Wrap a step-level verdict, attaching the model and context it ran with
    pub fn from_progress(progress: Progress, model: M, context: CallbackContext) -> Self {
        match progress {
            Progress::Done => Self::Success { observed: None },
            Progress::InProgress { retry_after } => Self::InProgress {
                model,
                context,
                retry_after,
            },
            Progress::Failed { kind, message } => Self::Failed {
                model,
                context,
                kind,
                message,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Whether the scheduler should stop re-invoking
    pub fn is_terminal(&self) -> bool {
        !self.is_in_progress()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The context to persist for the next invocation, if any
    pub fn context(&self) -> Option<&CallbackContext> {
        match self {
            Self::InProgress { context, .. } | Self::Failed { context, .. } => Some(context),
            Self::Success { .. } => None,
        }
    }
}
