use chrono::{DateTime, Utc};
use livekit_api::access_token::{AccessToken, VideoGrants};

use crate::{
    config::LiveKitConfig,
    domain::{Credential, CredentialRequest},
    services::CredentialIssuer,
    utils::errors::Result,
};

/// Signs LiveKit access tokens with the configured API key pair.
#[derive(Debug, Clone)]
pub struct LiveKitService {
    config: LiveKitConfig,
}

impl LiveKitService {
    pub fn new(config: LiveKitConfig) -> Self {
        Self { config }
    }

    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    fn generate_access_token(&self, identity: &str, room_name: &str) -> Result<String> {
        // 所有权限无条件授予，不做细粒度授权
        let video_grants = VideoGrants {
            room_join: true,
            room: room_name.to_string(),
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
            ..Default::default()
        };

        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(identity)
            .with_name(identity)
            .with_grants(video_grants)
            .with_ttl(Credential::ttl())
            .to_jwt()?;

        tracing::debug!("Generated access token for identity: {}", identity);
        Ok(token)
    }
}

impl CredentialIssuer for LiveKitService {
    fn issue(&self, request: &CredentialRequest, now: DateTime<Utc>) -> Result<Credential> {
        let (identity, room_name) = request.resolve(now);
        let token = self.generate_access_token(&identity, &room_name)?;

        tracing::info!("Generated token for {} in room {}", identity, room_name);
        Ok(Credential::new(
            identity,
            room_name,
            token,
            self.config.server_url.clone(),
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use livekit_api::access_token::TokenVerifier;

    use crate::utils::errors::TokenServiceError;

    fn config() -> LiveKitConfig {
        LiveKitConfig {
            server_url: "wss://media.example.com".to_string(),
            api_key: "test-key".to_string(),
            api_secret: "test-secret-that-is-long-enough".to_string(),
        }
    }

    #[test]
    fn token_claims_carry_identity_room_and_grants() {
        let service = LiveKitService::new(config());
        let request = CredentialRequest::new(Some("caller-7".into()), Some("support".into()));
        let now = Utc::now();

        let credential = service.issue(&request, now).unwrap();
        let claims = TokenVerifier::with_api_key("test-key", "test-secret-that-is-long-enough")
            .verify(&credential.signed_token)
            .unwrap();

        assert_eq!(claims.iss, "test-key");
        assert_eq!(claims.sub, "caller-7");
        assert_eq!(claims.name, "caller-7");
        assert_eq!(claims.video.room, "support");
        assert!(claims.video.room_join);
        assert!(claims.video.can_publish);
        assert!(claims.video.can_subscribe);
        assert!(claims.video.can_publish_data);

        let expected_exp = credential.expires_at.timestamp();
        assert!((claims.exp as i64 - expected_exp).abs() <= 2);
        assert_eq!(credential.server_endpoint, "wss://media.example.com");
    }

    #[test]
    fn wrong_secret_does_not_verify() {
        let service = LiveKitService::new(config());
        let credential = service
            .issue(&CredentialRequest::default(), Utc::now())
            .unwrap();

        let result = TokenVerifier::with_api_key("test-key", "another-secret")
            .verify(&credential.signed_token);
        assert!(result.is_err());
    }

    #[test]
    fn empty_secret_is_a_signing_error() {
        let mut config = config();
        config.api_secret.clear();
        let service = LiveKitService::new(config);

        assert_matches!(
            service.issue(&CredentialRequest::default(), Utc::now()),
            Err(TokenServiceError::Signing(_))
        );
    }
}
