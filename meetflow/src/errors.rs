//! Error types for the meetflow engine.
//!
//! Registry contract violations, submission validation, collaborator
//! transport failures and stage rejections each get their own type so the
//! orchestrator can tell recoverable conditions from terminal ones.

use crate::core::TaskStatus;
use std::time::Duration;
use thiserror::Error;

/// The main error type for meetflow operations.
#[derive(Debug, Error)]
pub enum MeetflowError {
    /// A task registry contract was violated.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// A submission was rejected.
    #[error("{0}")]
    Submit(#[from] SubmitError),

    /// A stage call ended fatally.
    #[error("{0}")]
    Stage(#[from] StageFailure),

    /// The result store failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stage ran without an input an earlier stage should have produced.
    #[error("Missing stage input: {0}")]
    MissingInput(&'static str),
}

/// Task registry contract violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A task with this identifier already exists.
    #[error("Duplicate task id: {id}")]
    DuplicateId {
        /// The task id.
        id: String,
    },

    /// No task with this identifier exists.
    #[error("Task not found: {id}")]
    NotFound {
        /// The task id.
        id: String,
    },

    /// The requested mutation breaks the task lifecycle rules.
    #[error("Invalid transition for task {id}: {from} -> {to} ({reason})")]
    InvalidTransition {
        /// The task id.
        id: String,
        /// Status before the mutation.
        from: TaskStatus,
        /// Status requested by the mutation.
        to: TaskStatus,
        /// Which rule was broken.
        reason: String,
    },
}

impl RegistryError {
    /// Creates a duplicate id error.
    #[must_use]
    pub fn duplicate(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates an invalid transition error.
    #[must_use]
    pub fn invalid_transition(
        id: impl Into<String>,
        from: TaskStatus,
        to: TaskStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            from,
            to,
            reason: reason.into(),
        }
    }
}

/// Reasons a submission is rejected before any task exists.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Malformed or unsupported submission.
    #[error("Invalid submission: {0}")]
    Validation(String),

    /// The upload exceeded the configured size limit.
    #[error("Upload exceeds {limit} bytes")]
    TooLarge {
        /// The configured limit in bytes.
        limit: u64,
    },

    /// Staging the upload failed.
    #[error("Upload failed: {0}")]
    Io(#[from] std::io::Error),

    /// The registry refused the new task.
    #[error("{0}")]
    Registry(#[from] RegistryError),
}

impl SubmitError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns true if the caller sent bad input.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::TooLarge { .. })
    }
}

/// Network-level failure talking to a collaborator. Always retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response within the per-call timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request failed in flight, or the collaborator answered with a
    /// transient status code.
    #[error("request failed: {0}")]
    Request(String),
}

/// A stage call that ended fatally, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageFailure {
    /// The collaborator explicitly reported failure. Never retried.
    #[error("{service} rejected the request with status {status}: {body}")]
    Rejected {
        /// Collaborator name.
        service: String,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Transport failures exhausted the retry budget.
    #[error("{service} unreachable after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Collaborator name.
        service: String,
        /// Attempts made, including the first.
        attempts: usize,
        /// The final transport error.
        last_error: TransportError,
    },

    /// The request body could not be encoded. Nothing was sent.
    #[error("{service} request could not be encoded: {reason}")]
    InvalidRequest {
        /// Collaborator name.
        service: String,
        /// Encoder error.
        reason: String,
    },

    /// The collaborator answered 2xx with a body that does not match the
    /// stage's response shape.
    #[error("{service} returned an invalid response: {reason}")]
    InvalidResponse {
        /// Collaborator name.
        service: String,
        /// What was wrong with the body.
        reason: String,
    },
}

impl StageFailure {
    /// Short machine-readable kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Exhausted { .. } => "exhausted",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidResponse { .. } => "invalid_response",
        }
    }
}

/// Result store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing storage failed.
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration loading failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable was set to a value that cannot be used.
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
