// Controller and command tests against a mocked SHC.
#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use livisi_core::{
    CapabilityId, CapabilityKind, Command, Controller, ControllerConfig, CoreError, Event,
    PropertyValue, RampDirection,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn mount_get(server: &MockServer, at: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// A small SHC 2 with a dimmer, a switch, a cover, a room climate pair,
/// a motion detector and one capability type nobody models.
async fn mock_controller() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "expires_in": 172_800
        })))
        .mount(&server)
        .await;

    mount_get(&server, "/status", json!({ "controllerType": "Avatar", "serialNumber": "914110001234" })).await;
    mount_get(&server, "/message", json!([])).await;
    mount_get(&server, "/location", json!([
        { "id": "room-1", "config": { "name": "Living room" } }
    ]))
    .await;
    mount_get(&server, "/device", json!([
        { "id": "shc1", "type": "SHCA", "config": { "name": "SHC" } },
        { "id": "dev-dim", "type": "ISD2", "location": "/location/room-1", "config": { "name": "Ceiling" } },
        { "id": "dev-pss", "type": "PSS", "config": { "name": "Coffee" } },
        { "id": "dev-isr", "type": "ISR2", "config": { "name": "Blinds" } },
        { "id": "dev-vrcc", "type": "VRCC" },
        { "id": "dev-rst", "type": "RST2" },
        { "id": "dev-wmd", "type": "WMD" }
    ]))
    .await;
    mount_get(&server, "/capability", json!([
        { "id": "dimmer-17", "type": "DimmerActuator", "device": "/device/dev-dim" },
        { "id": "switch-1", "type": "SwitchActuator", "device": "/device/dev-pss" },
        { "id": "cover-1", "type": "RollerShutterActuator", "device": "/device/dev-isr" },
        {
            "id": "setpoint-1", "type": "RoomSetpoint", "device": "/device/dev-vrcc",
            "config": { "underlyingCapabilityIds": "/capability/thermo-1" }
        },
        { "id": "thermo-1", "type": "ThermostatActuator", "device": "/device/dev-rst" },
        { "id": "motion-1", "type": "MotionDetectionSensor", "device": "/device/dev-wmd" },
        { "id": "sched-1", "type": "HeatingSchedule", "device": "/device/dev-vrcc" }
    ]))
    .await;
    mount_get(&server, "/capability/dimmer-17/state", json!({
        "dimLevel": { "value": 42, "lastChanged": "2026-03-01T10:00:00.000Z" }
    }))
    .await;
    mount_get(&server, "/capability/switch-1/state", json!({
        "onState": { "value": false, "lastChanged": "2026-03-01T10:00:00.000Z" }
    }))
    .await;

    server
}

fn config_for(server: &MockServer) -> ControllerConfig {
    let mut config = ControllerConfig::new(
        Url::parse(&server.uri()).unwrap(),
        SecretString::from("hunter2".to_string()),
    );
    config.event_stream_enabled = false;
    config.refresh_interval = Duration::ZERO;
    config
}

async fn connected(server: &MockServer) -> Controller {
    let controller = Controller::new(config_for(server));
    controller.connect().await.unwrap();
    controller
}

async fn expect_no_action(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/action"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resultCode": "Success" })))
        .expect(0)
        .mount(server)
        .await;
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_loads_topology_and_values() {
    let server = mock_controller().await;
    let controller = connected(&server).await;

    let catalog = controller.catalog();
    assert_eq!(catalog.device("dev-dim").unwrap().room.as_deref(), Some("Living room"));
    assert_eq!(
        catalog.capability("sched-1").unwrap().kind,
        CapabilityKind::Unsupported("HeatingSchedule".into())
    );
    // The unknown kind did not cost anything else.
    assert_eq!(catalog.capability("cover-1").unwrap().kind, CapabilityKind::Cover);

    let dimmer = controller.get("dimmer-17").unwrap();
    assert_eq!(dimmer.get("dimLevel"), Some(&PropertyValue::Number(42.0)));
    // Motion detectors get a local off-delay.
    let duration = controller.get("dev-wmd_duration").unwrap();
    assert_eq!(duration.get("duration"), Some(&PropertyValue::Number(20.0)));
    assert_eq!(controller.is_available("dev-pss"), Some(true));

    controller.disconnect().await;
}

#[tokio::test]
async fn test_wrong_password() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errorcode": 2009,
            "description": "Invalid user credentials."
        })))
        .mount(&server)
        .await;

    let controller = Controller::new(config_for(&server));
    let err = controller.connect().await.unwrap_err();
    assert!(matches!(err, CoreError::WrongPassword), "got {err:?}");
}

#[tokio::test]
async fn test_commands_need_a_session() {
    let server = mock_controller().await;
    let controller = Controller::new(config_for(&server));

    let err = controller
        .set("dimmer-17", PropertyValue::Number(10.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ControllerDisconnected));
}

// ── Validation before the wire ──────────────────────────────────────

#[tokio::test]
async fn test_bool_against_dimmer_is_incompatible() {
    let server = mock_controller().await;
    expect_no_action(&server).await;
    let controller = connected(&server).await;

    let err = controller
        .set("dimmer-17", PropertyValue::Bool(true))
        .await
        .unwrap_err();
    assert!(
        matches!(err, CoreError::IncompatibleCapability { ref capability_id, .. } if capability_id == "dimmer-17"),
        "got {err:?}"
    );

    let err = controller
        .set("dimmer-17", PropertyValue::Number(150.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::IncompatibleCapability { .. }));
}

#[tokio::test]
async fn test_unsupported_and_unknown_capabilities() {
    let server = mock_controller().await;
    expect_no_action(&server).await;
    let controller = connected(&server).await;

    let err = controller
        .set("sched-1", PropertyValue::Bool(true))
        .await
        .unwrap_err();
    assert!(
        matches!(err, CoreError::UnsupportedCapability { ref raw_kind, .. } if raw_kind == "HeatingSchedule"),
        "got {err:?}"
    );

    let err = controller
        .set("nope", PropertyValue::Bool(true))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::CapabilityNotFound { .. }));

    let err = controller
        .execute(Command::StartRamp {
            capability_id: "dimmer-17".into(),
            direction: RampDirection::Up,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::IncompatibleCapability { .. }));
}

#[tokio::test]
async fn test_setpoint_range() {
    let server = mock_controller().await;
    expect_no_action(&server).await;
    let controller = connected(&server).await;

    let err = controller
        .set("setpoint-1", PropertyValue::Number(31.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::IncompatibleCapability { .. }));
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_sends_set_state_and_records_pending() {
    let server = mock_controller().await;
    Mock::given(method("POST"))
        .and(path("/action"))
        .and(body_partial_json(json!({
            "type": "SetState",
            "namespace": "core.RWE",
            "target": "/capability/switch-1",
            "params": { "onState": { "type": "Constant", "value": true } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resultCode": "Success" })))
        .expect(1)
        .mount(&server)
        .await;
    let controller = connected(&server).await;

    let ack = controller
        .set("switch-1", PropertyValue::Bool(true))
        .await
        .unwrap();
    assert_eq!(ack.property.as_deref(), Some("onState"));
    assert!(ack.pending);

    assert!(controller.store().is_pending("switch-1"));
    let shown = controller.get("switch-1").unwrap();
    assert_eq!(shown.get("onState"), Some(&PropertyValue::Bool(true)));
    let confirmed = controller.store().get_confirmed("switch-1").unwrap();
    assert_eq!(confirmed.get("onState"), Some(&PropertyValue::Bool(false)));
}

#[tokio::test]
async fn test_setpoint_uses_generation_property() {
    let server = mock_controller().await;
    Mock::given(method("POST"))
        .and(path("/action"))
        .and(body_partial_json(json!({
            "target": "/capability/setpoint-1",
            "params": { "setpointTemperature": { "type": "Constant", "value": 21.5 } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resultCode": "Success" })))
        .expect(1)
        .mount(&server)
        .await;
    let controller = connected(&server).await;

    controller
        .set("setpoint-1", PropertyValue::Number(21.5))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_operation_mode_goes_to_linked_thermostat() {
    let server = mock_controller().await;
    Mock::given(method("POST"))
        .and(path("/action"))
        .and(body_partial_json(json!({
            "target": "/capability/thermo-1",
            "params": { "operationMode": { "type": "Constant", "value": "Manu" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resultCode": "Success" })))
        .expect(1)
        .mount(&server)
        .await;
    let controller = connected(&server).await;

    controller
        .execute(Command::SetOperationMode {
            capability_id: "setpoint-1".into(),
            auto: false,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cover_ramp_uses_cosip_namespace() {
    let server = mock_controller().await;
    Mock::given(method("POST"))
        .and(path("/action"))
        .and(body_partial_json(json!({
            "type": "StartRamp",
            "namespace": "CosipDevices.RWE",
            "target": "/capability/cover-1",
            "params": { "rampDirection": { "type": "Constant", "value": "RampDown" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resultCode": "Success" })))
        .expect(1)
        .mount(&server)
        .await;
    let controller = connected(&server).await;

    let ack = controller
        .execute(Command::StartRamp {
            capability_id: "cover-1".into(),
            direction: RampDirection::Down,
        })
        .await
        .unwrap();
    assert_eq!(ack.action, "StartRamp");
}

#[tokio::test]
async fn test_rejected_command() {
    let server = mock_controller().await;
    Mock::given(method("POST"))
        .and(path("/action"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resultCode": "Failure" })))
        .expect(1)
        .mount(&server)
        .await;
    let controller = connected(&server).await;

    let err = controller
        .set("dimmer-17", PropertyValue::Number(10.0))
        .await
        .unwrap_err();
    assert!(
        matches!(err, CoreError::CommandRejected { ref result, .. } if result == "Failure"),
        "got {err:?}"
    );
    // Nothing optimistic is left behind.
    assert!(!controller.store().is_pending("dimmer-17"));
    let shown = controller.get("dimmer-17").unwrap();
    assert_eq!(shown.get("dimLevel"), Some(&PropertyValue::Number(42.0)));
}

#[tokio::test]
async fn test_event_during_write_is_not_masked() {
    let server = mock_controller().await;
    Mock::given(method("POST"))
        .and(path("/action"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "resultCode": "Success" }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    let controller = connected(&server).await;

    let write = controller.set("dimmer-17", PropertyValue::Number(80.0));
    let report = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut properties = BTreeMap::new();
        properties.insert("dimLevel".to_owned(), PropertyValue::Number(30.0));
        controller.store().apply(&Event::PropertyChanged {
            capability_id: CapabilityId::new("dimmer-17"),
            properties,
            timestamp: "2026-03-01T10:00:05Z".parse::<DateTime<Utc>>().unwrap(),
        });
    };
    let (ack, ()) = tokio::join!(write, report);
    ack.unwrap();

    assert!(!controller.store().is_pending("dimmer-17"));
    let shown = controller.get("dimmer-17").unwrap();
    assert_eq!(shown.get("dimLevel"), Some(&PropertyValue::Number(30.0)));
}

#[tokio::test]
async fn test_local_duration_is_confirmed_without_request() {
    let server = mock_controller().await;
    expect_no_action(&server).await;
    let controller = connected(&server).await;

    let state = controller
        .set_and_confirm(
            "dev-wmd_duration",
            PropertyValue::Number(45.0),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(state.get("duration"), Some(&PropertyValue::Number(45.0)));
}

#[tokio::test]
async fn test_restart_targets_controller_device() {
    let server = mock_controller().await;
    Mock::given(method("POST"))
        .and(path("/action"))
        .and(body_partial_json(json!({
            "type": "Restart",
            "namespace": "core.RWE",
            "target": "/device/shc1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "resultCode": "Success" })))
        .expect(1)
        .mount(&server)
        .await;
    let controller = connected(&server).await;

    controller.execute(Command::RestartController).await.unwrap();
}

#[tokio::test]
async fn test_second_connect_replaces_background_work() {
    let server = mock_controller().await;
    let mut config = config_for(&server);
    config.refresh_interval = Duration::from_secs(3600);
    let controller = Controller::new(config);

    controller.connect().await.unwrap();
    controller.connect().await.unwrap();

    // A leaked refresh task from the first session would never finish.
    tokio::time::timeout(Duration::from_secs(5), controller.disconnect())
        .await
        .unwrap();
    assert!(matches!(
        controller.set("switch-1", PropertyValue::Bool(true)).await,
        Err(CoreError::ControllerDisconnected)
    ));
}

#[tokio::test]
async fn test_oneshot_refresh_reloads_directly() {
    let server = mock_controller().await;

    let devices = Controller::oneshot(config_for(&server), |controller| async move {
        controller.full_refresh().await?;
        Ok(controller.devices().len())
    })
    .await
    .unwrap();
    assert_eq!(devices, 7);
}
