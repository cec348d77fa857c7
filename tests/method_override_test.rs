mod common;

use axum::http::{HeaderName, HeaderValue};
use common::{create_user, test_server};
use serde_json::json;

fn override_header(method: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-http-method-override"),
        HeaderValue::from_static(method),
    )
}

#[tokio::test]
async fn test_delete_tunneled_through_post() {
    let (server, _) = test_server();
    let id = create_user(&server, "jdoe").await;

    let (name, value) = override_header("DELETE");
    let response = server
        .post(&format!("/v1/Users/{}", id))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code().as_u16(), 200, "{}", response.text());

    let response = server.get(&format!("/v1/Users/{}", id)).await;
    assert_eq!(response.status_code().as_u16(), 404);
}

#[tokio::test]
async fn test_put_tunneled_through_post() {
    let (server, _) = test_server();
    let id = create_user(&server, "jdoe").await;

    let (name, value) = override_header("PUT");
    let response = server
        .post(&format!("/v1/Users/{}", id))
        .add_header(name, value)
        .json(&json!({ "userName": "jdoe", "displayName": "Jane" }))
        .await;
    assert_eq!(response.status_code().as_u16(), 200, "{}", response.text());
    let body: serde_json::Value = response.json();
    assert_eq!(body["displayName"], "Jane");
}

#[tokio::test]
async fn test_patch_override_is_not_implemented() {
    let (server, _) = test_server();
    let id = create_user(&server, "jdoe").await;

    let (name, value) = override_header("PATCH");
    let response = server
        .post(&format!("/v1/Users/{}", id))
        .add_header(name, value)
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code().as_u16(), 501);
}

#[tokio::test]
async fn test_post_to_resource_without_override_is_400() {
    let (server, _) = test_server();
    let id = create_user(&server, "jdoe").await;

    let response = server
        .post(&format!("/v1/Users/{}", id))
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code().as_u16(), 400);
}
