use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::{
    errors::{ClientError, Result},
    models::*,
    traits::CredentialSource,
};

/// Client for fetching session credentials from the token service
#[derive(Debug, Clone)]
pub struct TokenServiceClient {
    config: ClientConfig,
    http_client: Client,
}

impl TokenServiceClient {
    /// Create a new token service client
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(ClientError::HttpError)?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Request a fresh credential for the configured identity and room
    pub async fn request_token(&self) -> Result<TokenResponse> {
        let url = format!(
            "{}/api/token",
            self.config.token_service_url.trim_end_matches('/')
        );

        let mut query = Vec::new();
        if let Some(identity) = &self.config.identity {
            query.push(("identity", identity.as_str()));
        }
        if let Some(room) = &self.config.room {
            query.push(("room", room.as_str()));
        }

        debug!("Requesting token from {}", url);
        let response = self.http_client.get(&url).query(&query).send().await?;

        if response.status().is_success() {
            let token_response: TokenResponse = response.json().await?;
            info!(
                "Received token for {} in room {}",
                token_response.identity, token_response.room
            );
            Ok(token_response)
        } else {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let message = match serde_json::from_str::<ErrorResponse>(&error_text) {
                Ok(error_response) => error_response.error,
                Err(_) => error_text,
            };
            Err(ClientError::TokenServiceError { status, message })
        }
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl CredentialSource for TokenServiceClient {
    async fn fetch_credential(&self) -> Result<Credential> {
        let response = self.request_token().await?;
        Credential::try_from(response)
    }
}
