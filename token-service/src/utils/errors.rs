use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenServiceError {
    #[error("Failed to sign access token: {0}")]
    Signing(#[from] livekit_api::access_token::AccessTokenError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TokenServiceError>;
