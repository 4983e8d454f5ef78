use assert_matches::assert_matches;
use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_database::{users::fetch_user_role, DatastoreClient, DatastoreError};
use shared_models::auth::Role;

fn config_for(uri: &str) -> AppConfig {
    AppConfig {
        datastore_url: format!("{}/", uri),
        datastore_api_key: "test-api-key".to_string(),
        auth_jwt_secret: "test-secret".to_string(),
        email_api_url: uri.to_string(),
        email_api_key: String::new(),
        email_from: String::new(),
        server_port: 0,
    }
}

#[tokio::test]
async fn test_request_sends_api_key_and_bearer() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(header("apikey", "test-api-key"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "a" }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = DatastoreClient::new(&config_for(&mock_server.uri()));
    assert_eq!(client.get_base_url(), mock_server.uri());

    let rows: Vec<Value> = client
        .request(Method::GET, "/rest/v1/appointments", Some("user-token"), None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_failures_are_classified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/rejected"))
        .respond_with(ResponseTemplate::new(400).set_body_string("index required"))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/duplicate"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
        .mount(&mock_server)
        .await;

    let client = DatastoreClient::new(&config_for(&mock_server.uri()));

    let rejected: Result<Vec<Value>, _> = client.request(Method::GET, "/rest/v1/rejected", None, None).await;
    assert_matches!(rejected, Err(ref e) if e.is_query_rejected());

    let duplicate = client
        .execute(Method::POST, "/rest/v1/duplicate", None, Some(json!({ "slotKey": "k" })))
        .await;
    assert_matches!(duplicate, Err(DatastoreError::Conflict(_)));
}

#[tokio::test]
async fn test_unreachable_datastore_is_unavailable() {
    // Nothing listens on port 9 on test hosts.
    let client = DatastoreClient::new(&config_for("http://127.0.0.1:9"));
    let result: Result<Vec<Value>, _> = client.request(Method::GET, "/rest/v1/appointments", None, None).await;

    assert_matches!(result, Err(DatastoreError::Unavailable(_)));
}

#[tokio::test]
async fn test_fetch_user_role() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", "eq.user-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "role": "Doctor" }])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", "eq.user-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "role": null }])))
        .mount(&mock_server)
        .await;

    let client = DatastoreClient::new(&config_for(&mock_server.uri()));

    assert_eq!(fetch_user_role(&client, "user-1", "t").await.unwrap(), Some(Role::Doctor));
    assert_eq!(fetch_user_role(&client, "user-2", "t").await.unwrap(), None);
}

#[tokio::test]
async fn test_fetch_user_role_encodes_user_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", "eq.staff&select=id"))
        .and(query_param("select", "role"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "role": "reception" }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = DatastoreClient::new(&config_for(&mock_server.uri()));

    assert_eq!(
        fetch_user_role(&client, "staff&select=id", "t").await.unwrap(),
        Some(Role::Reception)
    );
}
