// Integration tests for `ShcClient` using wiremock.
#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use livisi_api::rest::actions::{ACTION_SET_STATE, NAMESPACE_CORE};
use livisi_api::{ActionParam, ActionRequest, Error, SessionConfig, ShcClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, ShcClient) {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "expires_in": 172800
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let client = ShcClient::with_client(
        reqwest::Client::new(),
        base,
        &TransportConfig::default(),
        SessionConfig::default(),
    )
    .unwrap();
    client
        .login(&SecretString::from("pw".to_string()))
        .await
        .unwrap();
    (server, client)
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_with_bearer() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/device"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "d1",
                "type": "PSS",
                "manufacturer": "RWE",
                "serialNumber": "914110012345",
                "config": { "name": "Kaffeemaschine" },
                "location": "/location/l1",
                "capabilities": ["/capability/c1", "/capability/c2"]
            }
        ])))
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_type, "PSS");
    assert_eq!(devices[0].serial_number.as_deref(), Some("914110012345"));
    assert_eq!(devices[0].capabilities.len(), 2);
}

#[tokio::test]
async fn test_capability_state() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/capability/c1/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "onState": { "value": true, "lastChanged": "2026-03-01T10:00:00.000Z" }
        })))
        .mount(&server)
        .await;

    let state = client.get_capability_state("c1").await.unwrap();
    assert_eq!(state["onState"].value, json!(true));
    assert!(state["onState"].last_changed.is_some());
}

#[tokio::test]
async fn test_classic_device_state_is_unwrapped() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/device/shc/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "shc",
            "state": {
                "CPULoad": { "value": 12.5 },
                "memoryLoad": { "value": 40 }
            }
        })))
        .mount(&server)
        .await;

    let state = client.get_device_state("shc").await.unwrap();
    assert!(state.contains_key("CPULoad"));
    assert!(!state.contains_key("id"));
}

#[tokio::test]
async fn test_send_action() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/action"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "resultCode": "Success" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut params = BTreeMap::new();
    params.insert("onState".to_string(), ActionParam::constant(true));
    let action = ActionRequest::for_capability("c1", ACTION_SET_STATE, NAMESPACE_CORE, params);

    let response = client.send_action(&action).await.unwrap();
    assert!(response.is_success());
}

// ── Token retry ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_rejected_token_refreshes_once_and_retries() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-2",
            "expires_in": 172800
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/location"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errorcode": 2007,
            "description": "The lifetime of the token has expired."
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/location"))
        .and(header("authorization", "Bearer tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "l1", "config": { "name": "Wohnzimmer" } }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let locations = client.list_locations().await.unwrap();
    assert_eq!(locations[0].name(), Some("Wohnzimmer"));
}

#[tokio::test]
async fn test_second_rejection_is_authentication_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-2",
            "expires_in": 172800
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/device"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "errorcode": 2004 })))
        .expect(2)
        .mount(&server)
        .await;

    let result = client.list_devices().await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication, got {result:?}"
    );
}

// ── Error tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_error_envelope_maps_to_shc_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/action"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errorcode": 5004
        })))
        .mount(&server)
        .await;

    let action = ActionRequest::for_capability("c1", ACTION_SET_STATE, NAMESPACE_CORE, BTreeMap::new());
    let err = client.send_action(&action).await.unwrap_err();

    assert_eq!(err.shc_error_code(), Some(5004));
    assert!(!err.is_auth_expired());
}

#[tokio::test]
async fn test_unreachable_controller() {
    let (server, client) = setup().await;
    drop(server);

    let err = client.list_capabilities().await.unwrap_err();
    assert!(err.is_transient(), "expected transient error, got {err:?}");
}
