mod common;

use axum::http::{HeaderName, HeaderValue};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common::test_server_with_auth;
use scim_gateway::backend::PostResourceRequest;
use scim_gateway::marshal::{JsonUnmarshaller, Unmarshaller};
use scim_gateway::schema::SchemaRegistry;
use serde_json::json;
use std::sync::Arc;

fn basic(user: &str, password: &str) -> (HeaderName, HeaderValue) {
    let token = BASE64.encode(format!("{}:{}", user, password));
    (
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&format!("Basic {}", token)).unwrap(),
    )
}

/// Seed a user straight through the backend, bypassing HTTP auth.
async fn seed_admin(backend: &Arc<dyn scim_gateway::backend::Backend>) {
    let registry = Arc::new(SchemaRegistry::core());
    let unmarshaller = JsonUnmarshaller::new(registry);
    let body = json!({ "userName": "admin", "password": "s3cret" });
    let resource = unmarshaller
        .unmarshal(&serde_json::to_vec(&body).unwrap(), "User")
        .unwrap();
    backend
        .post_resource(&PostResourceRequest {
            endpoint: "Users".to_string(),
            resource,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_request_without_credentials_is_401() {
    let (server, _) = test_server_with_auth("basic");
    let response = server.get("/v1/Users").await;
    assert_eq!(response.status_code().as_u16(), 401);
    assert!(response.headers().get("www-authenticate").is_some());
}

#[tokio::test]
async fn test_mutation_with_bad_credentials_is_401() {
    let (server, backend) = test_server_with_auth("basic");
    seed_admin(&backend).await;

    let (name, value) = basic("admin", "wrong");
    let response = server
        .post("/v1/Users")
        .add_header(name, value)
        .json(&json!({ "userName": "jdoe" }))
        .await;
    assert_eq!(response.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_mutation_with_valid_credentials_succeeds() {
    let (server, backend) = test_server_with_auth("basic");
    seed_admin(&backend).await;

    let (name, value) = basic("admin", "s3cret");
    let response = server
        .post("/v1/Users")
        .add_header(name, value)
        .json(&json!({ "userName": "jdoe" }))
        .await;
    assert_eq!(response.status_code().as_u16(), 201, "{}", response.text());
}

#[tokio::test]
async fn test_read_with_credentials_present_passes_through() {
    let (server, backend) = test_server_with_auth("basic");
    seed_admin(&backend).await;

    let (name, value) = basic("admin", "s3cret");
    let response = server.get("/v1/Users").add_header(name, value).await;
    assert_eq!(response.status_code().as_u16(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["totalResults"], 1);
}
