use std::fmt;

use refiner_core::Role;

use crate::PersistError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    UnknownBackend,
    HttpStatus(u16),
    Timeout,
    Network,
    InvalidResponse,
    Rejected,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::UnknownBackend => write!(f, "unknown backend"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::InvalidResponse => write!(f, "invalid response"),
            FailureKind::Rejected => write!(f, "rejected"),
        }
    }
}

/// A backend call failed. Carries the backend label so callers can say which one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("backend `{backend}` failed ({kind}): {message}")]
pub struct GenerationError {
    pub kind: FailureKind,
    pub backend: String,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: FailureKind, backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            backend: backend.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message {0} does not exist")]
    MissingMessage(usize),
    #[error("conversation store unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("a refinement is already in progress")]
    AlreadyRunning,
    #[error("invalid message id {index}; valid range is 0..{len}")]
    InvalidMessageId { index: usize, len: usize },
    #[error("message {index} is a {role} message; only assistant messages can be refined")]
    NotAssistantMessage { index: usize, role: Role },
    #[error("step `{step}` failed: {source}")]
    Generation {
        step: String,
        #[source]
        source: GenerationError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RefineError {
    /// Preconditions are rejected before any run state changes.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            RefineError::AlreadyRunning
                | RefineError::InvalidMessageId { .. }
                | RefineError::NotAssistantMessage { .. }
        )
    }
}
