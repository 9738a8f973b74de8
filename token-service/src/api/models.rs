use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Credential;

// 令牌 API
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub token: String,
    pub url: String,
    pub room: String,
    pub identity: String,
}

impl From<Credential> for TokenResponse {
    fn from(credential: Credential) -> Self {
        Self {
            token: credential.signed_token,
            url: credential.server_endpoint,
            room: credential.room_name,
            identity: credential.subject_identity,
        }
    }
}

// 房间创建 API（仅名义上创建，不分配任何资源）
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CreateRoomResponse {
    pub room: String,
    pub status: String,
    pub message: String,
}

// 健康检查 API
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

// 错误响应
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
