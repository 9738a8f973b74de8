//! Transport-independent request handling shared by the HTTP and function
//! bindings. Both bindings feed a method, an endpoint and the query pairs in
//! here and copy the resulting status and body out verbatim.

use std::collections::HashMap;

use axum::http::{Method, StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    api::models::{CreateRoomResponse, ErrorResponse, TokenResponse},
    domain::{nominal_room_name, CredentialRequest},
    services::CredentialIssuer,
    utils::errors::TokenServiceError,
};

/// Cross-origin headers attached to every response, preflight and errors included.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    ("access-control-allow-methods", "GET, POST, OPTIONS"),
    ("access-control-allow-headers", "Content-Type, Authorization"),
];

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Token,
    CreateRoom,
}

impl Endpoint {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "token" => Some(Self::Token),
            "create-room" => Some(Self::CreateRoom),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::CreateRoom => "create-room",
        }
    }

    fn failure_message(&self) -> &'static str {
        match self {
            Self::Token => "Failed to generate token",
            Self::CreateRoom => "Failed to create room",
        }
    }
}

/// Status plus serialized body. An empty body means "no content-type".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }

    fn json<T: Serialize>(status: StatusCode, value: &T, endpoint: Endpoint) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self { status, body },
            Err(e) => {
                tracing::error!("Failed to serialize {} response: {}", endpoint.name(), e);
                Self::failure(endpoint)
            }
        }
    }

    fn failure(endpoint: Endpoint) -> Self {
        let body = ErrorResponse::new(endpoint.failure_message());
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: serde_json::to_string(&body)
                .unwrap_or_else(|_| format!("{{\"error\":\"{}\"}}", endpoint.failure_message())),
        }
    }

    pub fn content_type(&self) -> Option<&'static str> {
        if self.body.is_empty() {
            None
        } else {
            Some(JSON_CONTENT_TYPE)
        }
    }
}

/// Parses a raw query string; the first occurrence of a key wins.
pub fn parse_query(raw: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(raw) = raw {
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
    }
    params
}

pub fn dispatch(
    method: &Method,
    endpoint: Endpoint,
    query: &HashMap<String, String>,
    issuer: &dyn CredentialIssuer,
    now: DateTime<Utc>,
) -> ApiResponse {
    if method == Method::OPTIONS {
        return ApiResponse::empty(StatusCode::OK);
    }

    if method != Method::GET {
        return method_not_allowed(endpoint, method.as_str());
    }

    match endpoint {
        Endpoint::Token => issue_token(query, issuer, now),
        Endpoint::CreateRoom => create_room(query, now),
    }
}

pub fn method_not_allowed(endpoint: Endpoint, method: &str) -> ApiResponse {
    let err = TokenServiceError::MethodNotAllowed(method.to_string());
    tracing::debug!("Rejected {} request: {}", endpoint.name(), err);
    ApiResponse::json(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorResponse::new("Method not allowed"),
        endpoint,
    )
}

fn issue_token(
    query: &HashMap<String, String>,
    issuer: &dyn CredentialIssuer,
    now: DateTime<Utc>,
) -> ApiResponse {
    let request = CredentialRequest::new(query.get("identity").cloned(), query.get("room").cloned());

    match issuer.issue(&request, now) {
        Ok(credential) => ApiResponse::json(
            StatusCode::OK,
            &TokenResponse::from(credential),
            Endpoint::Token,
        ),
        Err(e) => {
            tracing::error!("Error generating token: {}", e);
            ApiResponse::failure(Endpoint::Token)
        }
    }
}

fn create_room(query: &HashMap<String, String>, now: DateTime<Utc>) -> ApiResponse {
    let room = nominal_room_name(query.get("room").cloned(), now);
    tracing::info!("Room endpoint called for: {}", room);

    ApiResponse::json(
        StatusCode::OK,
        &CreateRoomResponse {
            room,
            status: "created".to_string(),
            message: "Room ready for participants".to_string(),
        },
        Endpoint::CreateRoom,
    )
}
