use std::{collections::HashMap, sync::Arc, time::Duration};

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::{DateTime, Utc};
use livekit_api::access_token::TokenVerifier;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use token_service::{
    api::{
        dispatch::Endpoint,
        function::{handle_event, FunctionEvent, FunctionResponse},
        models::{CreateRoomResponse, ErrorResponse, TokenResponse},
    },
    config::{AppConfig, LiveKitConfig},
    domain::{Credential, CredentialRequest},
    server::Server,
    services::CredentialIssuer,
    TokenServiceError,
};
use tower::ServiceExt;

const API_KEY: &str = "devkey";
const API_SECRET: &str = "integration-test-secret-0123456789";
const LIVEKIT_URL: &str = "wss://media.example.com";

fn create_test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.livekit = LiveKitConfig {
        server_url: LIVEKIT_URL.to_string(),
        api_key: API_KEY.to_string(),
        api_secret: API_SECRET.to_string(),
    };
    config
}

async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(create_test_config()).expect("Failed to create server");

    tokio::spawn(async move {
        server.serve(listener).await.expect("Server failed to run");
    });

    format!("http://{}", addr)
}

fn assert_cors(headers: &reqwest::header::HeaderMap) {
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
    assert_eq!(
        headers["access-control-allow-headers"],
        "Content-Type, Authorization"
    );
}

#[tokio::test]
async fn test_token_echoes_inputs_and_expires_in_six_hours() {
    let base_url = spawn_server().await;
    let client = Client::new();

    let before = Utc::now();
    let response = client
        .get(format!("{}/api/token", base_url))
        .query(&[("identity", "dana.k"), ("room", "support desk #2")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(response.headers());

    let body: TokenResponse = response.json().await.unwrap();
    assert_eq!(body.identity, "dana.k");
    assert_eq!(body.room, "support desk #2");
    assert_eq!(body.url, LIVEKIT_URL);

    let claims = TokenVerifier::with_api_key(API_KEY, API_SECRET)
        .verify(&body.token)
        .expect("token should verify with the configured secret");
    assert_eq!(claims.sub, "dana.k");
    assert_eq!(claims.video.room, "support desk #2");
    assert!(claims.video.room_join && claims.video.can_publish_data);

    let expected = before.timestamp() + 6 * 3600;
    assert!((claims.exp as i64 - expected).abs() <= 5, "exp {} vs {}", claims.exp, expected);
}

#[tokio::test]
async fn test_default_identity_and_room_differ_between_calls() {
    let base_url = spawn_server().await;
    let client = Client::new();

    let first: TokenResponse = client
        .get(format!("{}/api/token", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;

    let second: TokenResponse = client
        .get(format!("{}/api/token", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(first.identity.starts_with("user_"));
    assert_eq!(first.room, format!("alex-private-{}", first.identity));
    assert_ne!(first.identity, second.identity);
    assert_ne!(first.room, second.room);
}

#[tokio::test]
async fn test_preflight_is_empty_ok_with_cors() {
    let base_url = spawn_server().await;
    let client = Client::new();

    for path in ["/api/token", "/api/create-room"] {
        let response = client
            .request(
                reqwest::Method::OPTIONS,
                format!("{}{}?identity=x&room=y&extra=1", base_url, path),
            )
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_cors(response.headers());
        assert!(response.text().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_wrong_method_is_405_json() {
    let base_url = spawn_server().await;
    let client = Client::new();

    for path in ["/api/token", "/api/create-room"] {
        let response = client
            .post(format!("{}{}", base_url, path))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_cors(response.headers());
        let body: ErrorResponse = response.json().await.unwrap();
        assert_eq!(body.error, "Method not allowed");
    }
}

#[tokio::test]
async fn test_create_room_and_health() {
    let base_url = spawn_server().await;
    let client = Client::new();

    let body: CreateRoomResponse = client
        .get(format!("{}/api/create-room?room=standup", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body.room, "standup");
    assert_eq!(body.status, "created");

    let generated: CreateRoomResponse = client
        .get(format!("{}/api/create-room", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(generated.room.starts_with("alex-room-"));

    let health: Value = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_function_binding_over_http() {
    let base_url = spawn_server().await;
    let client = Client::new();

    let response: FunctionResponse = client
        .post(format!("{}/functions/token", base_url))
        .json(&json!({
            "httpMethod": "GET",
            "path": "/.netlify/functions/token",
            "queryStringParameters": { "identity": "kiosk-3" }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.headers["access-control-allow-origin"], "*");
    assert_eq!(response.headers["content-type"], "application/json");
    let body: TokenResponse = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body.identity, "kiosk-3");
    assert_eq!(body.room, "alex-private-kiosk-3");

    let unknown = client
        .post(format!("{}/functions/unknown", base_url))
        .json(&json!({ "httpMethod": "GET" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_missing_signing_secret_fails_startup() {
    let mut config = create_test_config();
    config.livekit.api_secret = String::new();

    assert_matches!(Server::new(config), Err(TokenServiceError::Configuration(_)));
}

/// Issuer that ignores the clock so both bindings can be compared byte for byte.
struct StaticIssuer;

impl CredentialIssuer for StaticIssuer {
    fn issue(
        &self,
        request: &CredentialRequest,
        _now: DateTime<Utc>,
    ) -> token_service::Result<Credential> {
        let fixed = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let (identity, room) = request.resolve(fixed);
        Ok(Credential::new(
            identity,
            room,
            "static-token".to_string(),
            LIVEKIT_URL.to_string(),
            fixed,
        ))
    }
}

async fn http_body(method: Method, uri: &str) -> (StatusCode, String) {
    let app = Server::router(Arc::new(StaticIssuer));
    let response = app
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_both_bindings_produce_identical_bodies() {
    let cases = [
        (Method::GET, Endpoint::Token, "/api/token", "identity=ana&room=r1"),
        (Method::GET, Endpoint::CreateRoom, "/api/create-room", "room=r1"),
        (Method::OPTIONS, Endpoint::Token, "/api/token", "identity=ana"),
        (Method::DELETE, Endpoint::CreateRoom, "/api/create-room", ""),
    ];

    for (method, endpoint, path, query) in cases {
        let (status, body) = http_body(method.clone(), &format!("{}?{}", path, query)).await;

        let params: HashMap<String, String> = url_pairs(query);
        let event = FunctionEvent {
            http_method: method.to_string(),
            path: path.to_string(),
            query_string_parameters: Some(params),
            ..Default::default()
        };
        let function_response = handle_event(endpoint, &event, &StaticIssuer, Utc::now());

        assert_eq!(function_response.status_code, status.as_u16(), "{} {}", method, path);
        assert_eq!(function_response.body, body, "{} {}", method, path);
    }
}

#[test]
fn test_function_binding_rejects_garbage_method() {
    let event = FunctionEvent {
        http_method: "not a method".to_string(),
        ..Default::default()
    };
    let response = handle_event(Endpoint::Token, &event, &StaticIssuer, Utc::now());

    assert_eq!(response.status_code, 405);
    assert_eq!(response.headers["access-control-allow-headers"], "Content-Type, Authorization");
    assert_eq!(response.body, r#"{"error":"Method not allowed"}"#);
}

fn url_pairs(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
