use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;

use crate::{
    api::{
        dispatch::{dispatch, parse_query, ApiResponse, Endpoint},
        models::HealthCheckResponse,
    },
    services::CredentialIssuer,
};

pub const SERVICE_NAME: &str = "token-service";

#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<dyn CredentialIssuer>,
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        match self.content_type() {
            Some(content_type) => {
                (self.status, [(header::CONTENT_TYPE, content_type)], self.body).into_response()
            }
            None => self.status.into_response(),
        }
    }
}

// 健康检查
pub async fn health_check() -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// 签发访问令牌
pub async fn token(
    State(state): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
) -> ApiResponse {
    let query = parse_query(query.as_deref());
    dispatch(&method, Endpoint::Token, &query, state.issuer.as_ref(), Utc::now())
}

// 创建房间
pub async fn create_room(
    State(state): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
) -> ApiResponse {
    let query = parse_query(query.as_deref());
    dispatch(&method, Endpoint::CreateRoom, &query, state.issuer.as_ref(), Utc::now())
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(crate::api::models::ErrorResponse::new("Not found")),
    )
}
