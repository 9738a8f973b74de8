use std::sync::Arc;
use axum::{
    http::{HeaderName, HeaderValue},
    routing::{any, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tokio::net::TcpListener;

use crate::{
    api::{dispatch::CORS_HEADERS, function, handlers},
    config::AppConfig,
    services::{CredentialIssuer, LiveKitService},
    utils::errors::{Result, TokenServiceError},
};

#[derive(Debug)]
pub struct Server {
    config: AppConfig,
    app: Router,
}

impl Server {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;

        // 创建 LiveKit 令牌签发服务
        let issuer: Arc<dyn CredentialIssuer> = Arc::new(LiveKitService::new(config.livekit.clone()));
        let app = Self::router(issuer);

        Ok(Self { config, app })
    }

    /// Builds the routes around any issuer; tests plug in their own.
    pub fn router(issuer: Arc<dyn CredentialIssuer>) -> Router {
        let app_state = handlers::AppState { issuer };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/api/token", any(handlers::token))
            .route("/api/create-room", any(handlers::create_room))
            .route("/functions/{name}", post(function::invoke))
            .fallback(handlers::not_found)
            .with_state(app_state);

        // CORS 头附加到每个响应上，包括错误和预检请求
        let [allow_origin, allow_methods, allow_headers] = CORS_HEADERS.map(|(name, value)| {
            SetResponseHeaderLayer::overriding(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            )
        });

        router.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(allow_origin)
                .layer(allow_methods)
                .layer(allow_headers),
        )
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        tracing::info!("Starting server on {}", addr);
        tracing::info!("LiveKit URL: {}", self.config.livekit.server_url);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TokenServiceError::Internal(e.into()))?;

        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        axum::serve(listener, self.app)
            .await
            .map_err(|e| TokenServiceError::Internal(e.into()))?;

        Ok(())
    }
}
