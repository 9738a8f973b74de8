//! Event-wrapped binding: the request arrives as a serverless function event
//! and leaves as a `{ statusCode, headers, body }` record.

use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    api::{
        dispatch::{dispatch, method_not_allowed, ApiResponse, Endpoint, CORS_HEADERS},
        handlers::AppState,
        models::ErrorResponse,
    },
    services::CredentialIssuer,
    utils::errors::TokenServiceError,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionEvent {
    pub http_method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl From<ApiResponse> for FunctionResponse {
    fn from(response: ApiResponse) -> Self {
        let mut headers: BTreeMap<String, String> = CORS_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        if let Some(content_type) = response.content_type() {
            headers.insert("content-type".to_string(), content_type.to_string());
        }

        Self {
            status_code: response.status.as_u16(),
            headers,
            body: response.body,
        }
    }
}

pub fn handle_event(
    endpoint: Endpoint,
    event: &FunctionEvent,
    issuer: &dyn CredentialIssuer,
    now: DateTime<Utc>,
) -> FunctionResponse {
    let query = event.query_string_parameters.clone().unwrap_or_default();

    // 无法解析的方法一律按 405 处理
    match Method::from_bytes(event.http_method.to_ascii_uppercase().as_bytes()) {
        Ok(method) => dispatch(&method, endpoint, &query, issuer, now).into(),
        Err(_) => method_not_allowed(endpoint, &event.http_method).into(),
    }
}

/// `POST /functions/{name}`: runs the function binding over HTTP.
pub async fn invoke(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(event): Json<FunctionEvent>,
) -> Response {
    match Endpoint::from_name(&name) {
        Some(endpoint) => {
            Json(handle_event(endpoint, &event, state.issuer.as_ref(), Utc::now())).into_response()
        }
        None => {
            let err = TokenServiceError::UnknownFunction(name);
            tracing::debug!("{}", err);
            (StatusCode::NOT_FOUND, Json(ErrorResponse::new(err.to_string()))).into_response()
        }
    }
}
