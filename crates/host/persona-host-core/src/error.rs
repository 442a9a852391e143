//! Error taxonomy shared by every Persona crate.

use serde::{Deserialize, Serialize};

/// Errors reported by host, animation and lipsync operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HostError {
    /// Unknown feature, layer, state or viseme reference.
    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    /// Operation not valid in the current lifecycle state.
    #[error("invalid state for {operation}: {reason}")]
    InvalidState { operation: String, reason: String },

    /// A prior in-flight operation was superseded or stopped.
    #[error("cancelled: {reason}")]
    Cancelled { reason: String },

    /// The audio clock or speech-mark source reported an error.
    #[error("upstream failure: {reason}")]
    UpstreamFailure { reason: String },

    /// Speech marks, viseme maps or clips failed to parse.
    #[error("parse error: {reason}")]
    Parse { reason: String },

    /// A bus listener returned an error or panicked.
    #[error("listener failed: {reason}")]
    Listener { reason: String },
}

impl HostError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn invalid_state(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    pub fn upstream(reason: impl Into<String>) -> Self {
        Self::UpstreamFailure {
            reason: reason.into(),
        }
    }

    /// Short category label used in log lines and bus payloads.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::Cancelled { .. } => "cancelled",
            Self::UpstreamFailure { .. } => "upstream",
            Self::Parse { .. } => "parse",
            Self::Listener { .. } => "listener",
        }
    }
}

impl From<serde_json::Error> for HostError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            reason: err.to_string(),
        }
    }
}
