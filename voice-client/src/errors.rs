use thiserror::Error;

use crate::state::SessionState;

/// Errors that can occur while driving a voice session
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Token service returned error: {status} - {message}")]
    TokenServiceError { status: u16, message: String },

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Media SDK failed to load within timeout")]
    SdkUnavailable,

    #[error("Media transport error: {0}")]
    Transport(String),

    #[error("Microphone error: {0}")]
    Device(#[from] DeviceError),

    #[error("Session is already {0}")]
    AlreadyActive(SessionState),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection attempt was cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Why the capture device could not be opened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no microphone found")]
    NotFound,

    #[error("{0}")]
    Other(String),
}

impl DeviceError {
    /// Hint shown to the user for each failure cause.
    pub fn user_hint(&self) -> &'static str {
        match self {
            DeviceError::PermissionDenied => {
                "Please allow microphone access to talk with the agent."
            }
            DeviceError::NotFound => "No microphone found. Please connect a microphone.",
            DeviceError::Other(_) => "Microphone access failed. Please check permissions.",
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
