use serde_json::json;
use std::sync::Arc;

use scim_gateway::backend::memory::InMemoryBackend;
use scim_gateway::client::ScimClient;
use scim_gateway::config::AppConfig;
use scim_gateway::error::ScimError;
use scim_gateway::marshal::{JsonUnmarshaller, Unmarshaller};
use scim_gateway::model::ScimObject;
use scim_gateway::schema::SchemaRegistry;
use scim_gateway::server::{build_router, AppState};
use scim_gateway::uri::QueryParams;

/// Serve the gateway on an ephemeral port and return a client for it.
async fn spawn_server() -> (ScimClient, Arc<SchemaRegistry>) {
    let mut config = AppConfig::default_config();
    config.authentication.auth_type = "none".to_string();

    let registry = Arc::new(SchemaRegistry::core());
    let backend = Arc::new(InMemoryBackend::new(registry.clone()));
    let state = AppState {
        backend,
        registry: registry.clone(),
        config: Arc::new(config),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = ScimClient::new(&format!("http://{}/v1", addr), registry.clone()).unwrap();
    (client, registry)
}

fn user_object(registry: &Arc<SchemaRegistry>, body: serde_json::Value) -> ScimObject {
    JsonUnmarshaller::new(registry.clone())
        .unmarshal(&serde_json::to_vec(&body).unwrap(), "User")
        .unwrap()
}

#[tokio::test]
async fn test_client_create_and_get() {
    let (client, registry) = spawn_server().await;
    let user = user_object(
        &registry,
        json!({ "userName": "jdoe", "name": { "formatted": "Jane Doe" } }),
    );

    let (created, location) = client.post_resource("Users", &user).await.unwrap();
    let id = created.id().unwrap().to_string();
    assert!(location.unwrap().ends_with(&format!("/v1/Users/{}", id)));

    let fetched = client.get_resource("Users", &id, None).await.unwrap();
    assert_eq!(
        fetched.simple_value("userName").unwrap().as_string().unwrap(),
        "jdoe"
    );
    assert!(fetched.simple_value("meta.created").is_some());
}

#[tokio::test]
async fn test_client_list_with_filter() {
    let (client, registry) = spawn_server().await;
    for name in ["alice", "bob"] {
        let user = user_object(&registry, json!({ "userName": name }));
        client.post_resource("Users", &user).await.unwrap();
    }

    let mut query = QueryParams::default();
    query.filter = Some("userName eq \"alice\"".to_string());
    let list = client.get_resources("Users", &query).await.unwrap();
    assert_eq!(list.total_results, 1);
    assert_eq!(
        list.resources[0]
            .simple_value("userName")
            .unwrap()
            .as_string()
            .unwrap(),
        "alice"
    );
}

#[tokio::test]
async fn test_client_xml_send_format() {
    let (client, registry) = spawn_server().await;
    let mut client = client;
    client.send_json = false;
    client.accept_json = false;

    let user = user_object(&registry, json!({ "userName": "jdoe" }));
    let (created, _) = client.post_resource("Users", &user).await.unwrap();
    let id = created.id().unwrap().to_string();

    let fetched = client.get_resource("Users", &id, None).await.unwrap();
    assert_eq!(
        fetched.simple_value("userName").unwrap().as_string().unwrap(),
        "jdoe"
    );
}

#[tokio::test]
async fn test_client_put_and_delete_with_method_override() {
    let (client, registry) = spawn_server().await;
    let mut client = client;
    client.put_uses_method_override = true;
    client.delete_uses_method_override = true;

    let user = user_object(&registry, json!({ "userName": "jdoe" }));
    let (created, _) = client.post_resource("Users", &user).await.unwrap();
    let id = created.id().unwrap().to_string();

    let updated_body = user_object(
        &registry,
        json!({ "userName": "jdoe", "displayName": "Jane" }),
    );
    let replaced = client.put_resource("Users", &id, &updated_body).await.unwrap();
    assert_eq!(
        replaced.simple_value("displayName").unwrap().as_string().unwrap(),
        "Jane"
    );

    client.delete_resource("Users", &id).await.unwrap();
    let err = client.get_resource("Users", &id, None).await.unwrap_err();
    assert!(matches!(err, ScimError::NotFound(_)));
}

#[tokio::test]
async fn test_client_maps_error_envelopes() {
    let (client, registry) = spawn_server().await;

    let err = client.get_resource("Users", "no-such-id", None).await.unwrap_err();
    assert!(matches!(err, ScimError::NotFound(_)));

    let err = client.get_resource("Devices", "1", None).await.unwrap_err();
    assert!(matches!(err, ScimError::UnknownEndpoint(_)));

    let user = user_object(&registry, json!({ "userName": "dup" }));
    client.post_resource("Users", &user).await.unwrap();
    let err = client.post_resource("Users", &user).await.unwrap_err();
    assert!(matches!(err, ScimError::Conflict(_)));
}

#[tokio::test]
async fn test_client_connection_failure_classification() {
    let registry = Arc::new(SchemaRegistry::core());
    // nothing listens on this port
    let client = ScimClient::new("http://127.0.0.1:1/v1", registry).unwrap();
    let err = client.get_resource("Users", "x", None).await.unwrap_err();
    assert!(matches!(err, ScimError::ExchangeFailure(_)));
}
