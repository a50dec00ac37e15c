//! Error types shared across the session core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the session core.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Signaling channel could not be opened or a message could not be sent.
    /// Reconnect policy is owned by the collaborator, not the core.
    #[error("transport error: {0}")]
    Transport(String),

    /// Caller violated a core invariant (removing "self", starting a session
    /// twice, commanding a room that has already been left).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A media device could not be acquired. Prior track state is untouched.
    #[error("device acquisition failed: {0}")]
    DeviceAcquisition(#[from] DeviceAcquisitionError),

    /// One or more participant recorders failed to open or close. The session
    /// proceeds degraded; the failure list is never silently dropped.
    #[error("recording degraded: {} participant(s) failed", failures.len())]
    PartialRecordingFailure { failures: Vec<RecorderFailure> },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a media device could not be acquired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceAcquisitionError {
    #[error("permission denied for device {0}")]
    PermissionDenied(String),

    #[error("device not found: {0}")]
    NotFound(String),

    #[error("no device satisfies constraints: {0}")]
    Overconstrained(String),
}

/// A single participant whose recorder failed to open or close.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecorderFailure {
    pub participant_id: String,
    pub reason: String,
}

/// Error payload returned by the HTTP control surface.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&SessionError> for ErrorResponse {
    fn from(error: &SessionError) -> Self {
        let code = match error {
            SessionError::Transport(_) => "TRANSPORT_ERROR",
            SessionError::InvalidOperation(_) => "INVALID_OPERATION",
            SessionError::DeviceAcquisition(_) => "DEVICE_ACQUISITION_ERROR",
            SessionError::PartialRecordingFailure { .. } => "PARTIAL_RECORDING_FAILURE",
            SessionError::Serialization(_) => "SERIALIZATION_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
