mod common;

use axum::http::{HeaderName, HeaderValue};
use common::{create_user, test_server};
use serde_json::json;

fn accept(value: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("accept"),
        HeaderValue::from_static(value),
    )
}

#[tokio::test]
async fn test_media_suffix_overrides_accept() {
    let (server, _) = test_server();
    let id = create_user(&server, "jdoe").await;

    let (name, value) = accept("application/json");
    let response = server
        .get(&format!("/v1/Users/{}.xml", id))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code().as_u16(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/xml"));
    let body = response.text();
    assert!(body.contains("<User xmlns=\"urn:scim:schemas:core:1.0\">"));
    assert!(body.contains("<userName>jdoe</userName>"));
}

#[tokio::test]
async fn test_accept_header_selects_xml() {
    let (server, _) = test_server();
    create_user(&server, "jdoe").await;

    let (name, value) = accept("application/xml");
    let response = server.get("/v1/Users").add_header(name, value).await;
    assert_eq!(response.status_code().as_u16(), 200);
    let body = response.text();
    assert!(body.starts_with("<Response xmlns=\"urn:scim:schemas:core:1.0\">"));
    assert!(body.contains("<totalResults>1</totalResults>"));
}

#[tokio::test]
async fn test_json_preferred_when_both_acceptable() {
    let (server, _) = test_server();
    create_user(&server, "jdoe").await;

    let (name, value) = accept("application/xml, application/json");
    let response = server.get("/v1/Users").add_header(name, value).await;
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/json"));
}

#[tokio::test]
async fn test_unsupported_accept_is_400() {
    let (server, _) = test_server();
    let (name, value) = accept("text/plain");
    let response = server.get("/v1/Users").add_header(name, value).await;
    assert_eq!(response.status_code().as_u16(), 400);
}

#[tokio::test]
async fn test_xml_body_create() {
    let (server, _) = test_server();
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<User xmlns="urn:scim:schemas:core:1.0">
  <userName>jdoe</userName>
  <name><formatted>Jane Doe</formatted></name>
</User>"#;

    let response = server
        .post("/v1/Users")
        .bytes(axum::body::Bytes::from(xml.to_string()))
        .content_type("application/xml")
        .await;
    assert_eq!(response.status_code().as_u16(), 201, "{}", response.text());
    // response negotiated from Accept, JSON by default
    let body: serde_json::Value = response.json();
    assert_eq!(body["userName"], "jdoe");
    assert_eq!(body["name"]["formatted"], "Jane Doe");
}

#[tokio::test]
async fn test_body_not_matching_content_type_is_400() {
    let (server, _) = test_server();
    let response = server
        .post("/v1/Users")
        .bytes(axum::body::Bytes::from(
            serde_json::to_vec(&json!({ "userName": "jdoe" })).unwrap(),
        ))
        .content_type("application/xml")
        .await;
    assert_eq!(response.status_code().as_u16(), 400);
}

#[tokio::test]
async fn test_same_resource_through_both_codecs() {
    let (server, _) = test_server();

    // create through XML with plural canonical types
    let xml = r#"<User xmlns="urn:scim:schemas:core:1.0">
  <userName>jdoe</userName>
  <emails>
    <email><value>a@x.example</value><type>work</type><primary>true</primary></email>
    <email><value>b@y.example</value><type>home</type></email>
  </emails>
</User>"#;
    let response = server
        .post("/v1/Users")
        .bytes(axum::body::Bytes::from(xml.to_string()))
        .content_type("application/xml")
        .await;
    assert_eq!(response.status_code().as_u16(), 201, "{}", response.text());
    let created: serde_json::Value = response.json();
    let id = created["id"].as_str().unwrap();

    // read back as JSON and as XML
    let json_body: serde_json::Value = server.get(&format!("/v1/Users/{}", id)).await.json();
    let emails = json_body["emails"].as_array().unwrap();
    assert_eq!(emails.len(), 2);
    let primaries: Vec<&serde_json::Value> = emails
        .iter()
        .filter(|e| e["primary"] == true)
        .collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0]["value"], "a@x.example");

    let xml_body = server.get(&format!("/v1/Users/{}.xml", id)).await.text();
    assert!(xml_body.contains("<value>a@x.example</value>"));
    assert!(xml_body.contains("<primary>true</primary>"));
    assert!(xml_body.contains("<value>b@y.example</value>"));
}
