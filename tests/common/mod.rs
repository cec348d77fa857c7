use axum_test::TestServer;
use serde_json::json;
use std::sync::Arc;

use scim_gateway::backend::memory::InMemoryBackend;
use scim_gateway::backend::Backend;
use scim_gateway::config::AppConfig;
use scim_gateway::schema::SchemaRegistry;
use scim_gateway::server::{build_router, AppState};

/// A test server on the in-memory backend without authentication.
pub fn test_server() -> (TestServer, Arc<dyn Backend>) {
    test_server_with_auth("none")
}

/// A test server on the in-memory backend with the given authentication
/// type (`none` or `basic`). The backend handle allows direct seeding.
pub fn test_server_with_auth(auth_type: &str) -> (TestServer, Arc<dyn Backend>) {
    let mut config = AppConfig::default_config();
    config.authentication.auth_type = auth_type.to_string();

    let registry = Arc::new(SchemaRegistry::core());
    let backend: Arc<dyn Backend> = Arc::new(InMemoryBackend::new(registry.clone()));
    let state = AppState {
        backend: backend.clone(),
        registry,
        config: Arc::new(config),
    };
    let server = TestServer::new(build_router(state)).expect("router builds");
    (server, backend)
}

/// POST a minimal user; returns its server-assigned id.
pub async fn create_user(server: &TestServer, user_name: &str) -> String {
    let response = server
        .post("/v1/Users")
        .json(&json!({ "userName": user_name }))
        .await;
    assert_eq!(response.status_code().as_u16(), 201, "{}", response.text());
    let body: serde_json::Value = response.json();
    body["id"].as_str().expect("created user has an id").to_string()
}

/// POST a user with a family name, for sort and filter scenarios.
pub async fn create_user_with_family_name(
    server: &TestServer,
    user_name: &str,
    family_name: &str,
) -> String {
    let response = server
        .post("/v1/Users")
        .json(&json!({
            "userName": user_name,
            "name": { "familyName": family_name }
        }))
        .await;
    assert_eq!(response.status_code().as_u16(), 201, "{}", response.text());
    let body: serde_json::Value = response.json();
    body["id"].as_str().expect("created user has an id").to_string()
}
