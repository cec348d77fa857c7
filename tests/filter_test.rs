mod common;

use common::{create_user, create_user_with_family_name, test_server};
use serde_json::json;

#[tokio::test]
async fn test_filter_equality() {
    let (server, _) = test_server();
    create_user(&server, "alice").await;
    create_user(&server, "bob").await;

    let response = server
        .get("/v1/Users?filter=userName%20eq%20%22alice%22")
        .await;
    assert_eq!(response.status_code().as_u16(), 200, "{}", response.text());
    let body: serde_json::Value = response.json();
    assert_eq!(body["totalResults"], 1);
    assert_eq!(body["Resources"][0]["userName"], "alice");
}

#[tokio::test]
async fn test_filter_sub_attribute_and_logic() {
    let (server, _) = test_server();
    create_user_with_family_name(&server, "alice", "Doe").await;
    create_user_with_family_name(&server, "bob", "Doe").await;
    create_user_with_family_name(&server, "carol", "Smith").await;

    let response = server
        .get("/v1/Users?filter=name.familyName%20eq%20%22Doe%22%20and%20userName%20sw%20%22a%22")
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["totalResults"], 1);
    assert_eq!(body["Resources"][0]["userName"], "alice");

    let response = server
        .get("/v1/Users?filter=userName%20eq%20%22alice%22%20or%20userName%20eq%20%22carol%22")
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["totalResults"], 2);
}

#[tokio::test]
async fn test_filter_present_on_absent_attribute_is_empty() {
    let (server, _) = test_server();
    create_user(&server, "alice").await;

    let response = server.get("/v1/Users?filter=title%20pr").await;
    assert_eq!(response.status_code().as_u16(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["totalResults"], 0);
    assert_eq!(body["Resources"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_filter_on_plural_values() {
    let (server, _) = test_server();
    let response = server
        .post("/v1/Users")
        .json(&json!({
            "userName": "alice",
            "emails": [
                { "value": "alice@work.example", "type": "work", "primary": true },
                { "value": "alice@home.example", "type": "home" }
            ]
        }))
        .await;
    assert_eq!(response.status_code().as_u16(), 201);
    create_user(&server, "bob").await;

    let response = server
        .get("/v1/Users?filter=emails%20eq%20%22alice%40home.example%22")
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["totalResults"], 1);
    assert_eq!(body["Resources"][0]["userName"], "alice");

    let response = server
        .get("/v1/Users?filter=emails.type%20eq%20%22work%22")
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["totalResults"], 1);
}

#[tokio::test]
async fn test_unparseable_filter_is_400() {
    let (server, _) = test_server();
    let response = server.get("/v1/Users?filter=userName%20zz%20%22x%22").await;
    assert_eq!(response.status_code().as_u16(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["Errors"][0]["code"], "400");
}

#[tokio::test]
async fn test_attribute_selection() {
    let (server, _) = test_server();
    let response = server
        .post("/v1/Users")
        .json(&json!({
            "userName": "alice",
            "displayName": "Alice",
            "name": { "formatted": "Alice A", "familyName": "A" }
        }))
        .await;
    let id = response.json::<serde_json::Value>()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = server
        .get(&format!("/v1/Users/{}?attributes=userName,name.familyName", id))
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["userName"], "alice");
    assert!(body.get("displayName").is_none());
    assert_eq!(body["name"]["familyName"], "A");
    assert!(body["name"].get("formatted").is_none());
    // id and meta are always returned
    assert_eq!(body["id"], id.as_str());
    assert!(body.get("meta").is_some());

    // an empty attributes list returns all attributes
    let response = server.get(&format!("/v1/Users/{}?attributes=", id)).await;
    let body: serde_json::Value = response.json();
    assert!(body.get("displayName").is_some());
}
