#![allow(dead_code)]

use intg_powerview::config::HubSettings;
use intg_powerview::powerview::models::encode_name;
use intg_powerview::store::HubConfig;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const GEN2_SERIAL: &str = "ABC123";

/// Mock Gen 2 hub with two shades (11 open, 12 closed) and one scene (5)
pub async fn gen2_hub() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/fwversion"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "firmware": {
                "mainProcessor": {"name": "PV Hub2.0", "revision": 2, "subRevision": 0, "build": 1056}
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/userdata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "userData": {
                "hubName": encode_name("Living Room"),
                "serialNumber": GEN2_SERIAL,
                "macAddress": "00:26:74:aa:bb:cc"
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/shades"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "shadeIds": [11, 12],
            "shadeData": [
                {"id": 11, "name": encode_name("Kitchen"), "type": 6,
                 "positions": {"posKind1": 1, "position1": 65535}},
                {"id": 12, "name": encode_name("Bedroom"), "type": 6,
                 "positions": {"posKind1": 1, "position1": 0}}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/scenes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sceneIds": [5],
            "sceneData": [{"id": 5, "name": encode_name("Evening")}]
        })))
        .mount(&server)
        .await;

    server
}

pub fn settings_for(server: &MockServer) -> HubSettings {
    HubSettings {
        port: server.address().port(),
        request_timeout_secs: 2,
        poll_interval_secs: 1,
        reconnect_min_secs: 1,
        reconnect_max_secs: 2,
    }
}

pub fn hub_config(identifier: &str) -> HubConfig {
    HubConfig {
        identifier: identifier.to_string(),
        address: "127.0.0.1".to_string(),
        name: "Living Room".to_string(),
        model: "PV Hub2.0".to_string(),
    }
}
