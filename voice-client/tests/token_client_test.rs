use assert_matches::assert_matches;
use axum::{
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;
use std::collections::HashMap;
use tokio::net::TcpListener;
use voice_client::{ClientConfig, ClientError, CredentialSource, TokenServiceClient};

async fn echo_token(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    let identity = params
        .get("identity")
        .cloned()
        .unwrap_or_else(|| "user_1".to_string());
    let room = params
        .get("room")
        .cloned()
        .unwrap_or_else(|| format!("alex-private-{}", identity));
    Json(json!({
        "token": "header.payload.signature",
        "url": "wss://media.example.com",
        "room": room,
        "identity": identity,
    }))
}

async fn broken_token() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Failed to generate token" })),
    )
}

async fn bad_url_token() -> impl IntoResponse {
    Json(json!({
        "token": "header.payload.signature",
        "url": "not a url",
        "room": "r",
        "identity": "i",
    }))
}

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn fetches_credential_for_requested_identity_and_room() {
    let base = spawn(Router::new().route("/api/token", get(echo_token))).await;
    let client = TokenServiceClient::new(
        ClientConfig::new(format!("{}/", base))
            .with_identity("dana")
            .with_room("support desk"),
    )
    .unwrap();

    let credential = client.fetch_credential().await.unwrap();
    assert_eq!(credential.identity, "dana");
    assert_eq!(credential.room, "support desk");
    assert_eq!(credential.token, "header.payload.signature");
    assert_eq!(credential.server_endpoint.as_str(), "wss://media.example.com/");
}

#[tokio::test]
async fn omits_unset_parameters() {
    let base = spawn(Router::new().route("/api/token", get(echo_token))).await;
    let client = TokenServiceClient::new(ClientConfig::new(base)).unwrap();

    let response = client.request_token().await.unwrap();
    assert_eq!(response.identity, "user_1");
    assert_eq!(response.room, "alex-private-user_1");
}

#[tokio::test]
async fn service_error_body_is_surfaced() {
    let base = spawn(Router::new().route("/api/token", get(broken_token))).await;
    let client = TokenServiceClient::new(ClientConfig::new(base)).unwrap();

    assert_matches!(
        client.fetch_credential().await,
        Err(ClientError::TokenServiceError { status: 500, message }) if message == "Failed to generate token"
    );
}

#[tokio::test]
async fn unusable_server_url_is_rejected() {
    let base = spawn(Router::new().route("/api/token", get(bad_url_token))).await;
    let client = TokenServiceClient::new(ClientConfig::new(base)).unwrap();

    assert_matches!(
        client.fetch_credential().await,
        Err(ClientError::InvalidCredential(_))
    );
}

#[tokio::test]
async fn unreachable_service_is_an_http_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        TokenServiceClient::new(ClientConfig::new(format!("http://{}", addr)).with_timeout(2))
            .unwrap();
    assert_matches!(client.fetch_credential().await, Err(ClientError::HttpError(_)));
}
