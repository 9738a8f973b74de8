use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{ClientError, Result};

/// Default bound on waiting for the media SDK to become usable.
pub const DEFAULT_SDK_READY_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for the voice client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Token service base URL (e.g., "http://localhost:5000")
    pub token_service_url: String,
    /// Identity to request; the token service picks one when absent
    pub identity: Option<String>,
    /// Room to request; the token service picks one when absent
    pub room: Option<String>,
    /// Timeout for HTTP requests (in seconds)
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(token_service_url: String) -> Self {
        Self {
            token_service_url,
            identity: None,
            room: None,
            request_timeout_secs: 30,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.request_timeout_secs = timeout_secs;
        self
    }

    /// Reads `TOKEN_SERVICE_URL`, `VOICE_IDENTITY` and `VOICE_ROOM`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("TOKEN_SERVICE_URL").map_err(|_| {
            ClientError::ConfigurationError("TOKEN_SERVICE_URL is not set".to_string())
        })?;
        Url::parse(&url).map_err(|e| {
            ClientError::ConfigurationError(format!("Invalid TOKEN_SERVICE_URL: {}", e))
        })?;

        let mut config = Self::new(url);
        if let Ok(identity) = std::env::var("VOICE_IDENTITY") {
            config = config.with_identity(identity);
        }
        if let Ok(room) = std::env::var("VOICE_ROOM") {
            config = config.with_room(room);
        }
        Ok(config)
    }
}

/// Body of `GET /api/token`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub url: String,
    pub room: String,
    pub identity: String,
}

/// Error body returned by the token service
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Credential as seen by the client: where to connect and with what.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub identity: String,
    pub room: String,
    pub token: String,
    pub server_endpoint: Url,
}

impl TryFrom<TokenResponse> for Credential {
    type Error = ClientError;

    fn try_from(response: TokenResponse) -> Result<Self> {
        if response.token.is_empty() {
            return Err(ClientError::InvalidCredential("empty token".to_string()));
        }
        let server_endpoint = Url::parse(&response.url).map_err(|e| {
            ClientError::InvalidCredential(format!("bad server url {}: {}", response.url, e))
        })?;

        Ok(Self {
            identity: response.identity,
            room: response.room,
            token: response.token,
            server_endpoint,
        })
    }
}
