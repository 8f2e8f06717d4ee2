mod common;

use common::{gen2_hub, hub_config, settings_for, GEN2_SERIAL};
use futures::{SinkExt, StreamExt};
use intg_powerview::api::{router, DriverMetadata, IntegrationApi};
use intg_powerview::discovery::NoDiscovery;
use intg_powerview::driver::PowerviewDriver;
use intg_powerview::store::HubStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Harness {
    _server: MockServer,
    _dir: TempDir,
    driver: Arc<PowerviewDriver>,
    ws: Ws,
}

async fn harness() -> Harness {
    let server = gen2_hub().await;
    let dir = TempDir::new().unwrap();
    let metadata = DriverMetadata::bundled().unwrap();
    let api = Arc::new(IntegrationApi::new(metadata));
    let store = Arc::new(Mutex::new(HubStore::open(dir.path())));
    let driver = Arc::new(PowerviewDriver::new(
        api.clone(),
        settings_for(&server),
        store,
        Arc::new(NoDiscovery),
    ));

    driver.add_configured_hub(hub_config(GEN2_SERIAL)).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while api.available_entities().all().await.len() < 3 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("hub entities were not registered");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(api, driver.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    Harness {
        _server: server,
        _dir: dir,
        driver,
        ws,
    }
}

async fn next_json(ws: &mut Ws) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no message from driver")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Skip events until the response to `req_id` arrives
async fn response(ws: &mut Ws, req_id: u64) -> Value {
    loop {
        let msg = next_json(ws).await;
        if msg["kind"] == "resp" && msg["req_id"] == req_id {
            return msg;
        }
    }
}

async fn event(ws: &mut Ws, name: &str) -> Value {
    loop {
        let msg = next_json(ws).await;
        if msg["kind"] == "event" && msg["msg"] == name {
            return msg;
        }
    }
}

async fn request(ws: &mut Ws, id: u64, msg: &str, msg_data: Value) -> Value {
    let req = json!({"kind": "req", "id": id, "msg": msg, "msg_data": msg_data});
    ws.send(Message::Text(req.to_string())).await.unwrap();
    response(ws, id).await
}

#[tokio::test]
async fn handshake_and_entity_listing() {
    let mut h = harness().await;

    let auth = next_json(&mut h.ws).await;
    assert_eq!(auth["kind"], "resp");
    assert_eq!(auth["msg"], "authentication");
    assert_eq!(auth["code"], 200);
    assert_eq!(auth["req_id"], 0);

    let resp = request(&mut h.ws, 1, "get_driver_version", json!({})).await;
    assert_eq!(resp["msg"], "driver_version");
    assert_eq!(resp["msg_data"]["version"]["driver"], "0.3.0");

    let resp = request(&mut h.ws, 2, "get_available_entities", json!({})).await;
    let entities = resp["msg_data"]["available_entities"].as_array().unwrap();
    let mut ids: Vec<&str> = entities
        .iter()
        .map(|e| e["entity_id"].as_str().unwrap())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["button.ABC123.5", "cover.ABC123.11", "cover.ABC123.12"]);

    let cover = entities
        .iter()
        .find(|e| e["entity_id"] == "cover.ABC123.11")
        .unwrap();
    assert_eq!(cover["entity_type"], "cover");
    assert_eq!(cover["device_class"], "shade");
    assert_eq!(cover["name"]["en"], "Kitchen");
    assert_eq!(cover["attributes"]["state"], "OPEN");

    let resp = request(&mut h.ws, 3, "get_unknown_thing", json!({})).await;
    assert_eq!(resp["code"], 400);

    h.driver.shutdown().await;
}

#[tokio::test]
async fn subscribe_and_command_routing() {
    let mut h = harness().await;
    Mock::given(method("PUT"))
        .and(path("/api/shades/11"))
        .and(body_json(json!({"shade": {"positions": {"posKind1": 1, "position1": 0}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&h._server)
        .await;

    // not subscribed yet
    let resp = request(
        &mut h.ws,
        1,
        "entity_command",
        json!({"entity_id": "cover.ABC123.11", "cmd_id": "close"}),
    )
    .await;
    assert_eq!(resp["code"], 404);

    let req = json!({
        "kind": "req",
        "id": 2,
        "msg": "subscribe_events",
        "msg_data": {"entity_ids": ["cover.ABC123.11", "button.ABC123.5"]},
    });
    h.ws.send(Message::Text(req.to_string())).await.unwrap();
    // the ack and the refreshed button state may arrive in either order
    let (mut acked, mut refreshed) = (false, false);
    while !(acked && refreshed) {
        let msg = next_json(&mut h.ws).await;
        if msg["kind"] == "resp" && msg["req_id"] == 2 {
            assert_eq!(msg["code"], 200);
            acked = true;
        } else if msg["msg"] == "entity_change"
            && msg["msg_data"]["entity_id"] == "button.ABC123.5"
        {
            assert_eq!(msg["msg_data"]["attributes"]["state"], "AVAILABLE");
            refreshed = true;
        }
    }

    let resp = request(&mut h.ws, 3, "get_entity_states", json!({})).await;
    assert_eq!(resp["msg_data"].as_array().unwrap().len(), 2);

    let resp = request(
        &mut h.ws,
        4,
        "entity_command",
        json!({"entity_id": "cover.ABC123.11", "cmd_id": "close"}),
    )
    .await;
    assert_eq!(resp["code"], 200);

    let change = loop {
        let change = event(&mut h.ws, "entity_change").await;
        if change["msg_data"]["entity_id"] == "cover.ABC123.11"
            && change["msg_data"]["attributes"]["state"] == "CLOSED"
        {
            break change;
        }
    };
    assert_eq!(change["cat"], "ENTITY");
    assert_eq!(change["msg_data"]["attributes"]["position"], 0);

    let resp = request(
        &mut h.ws,
        5,
        "entity_command",
        json!({"entity_id": "cover.ABC123.11", "cmd_id": "position", "params": {"position": 150}}),
    )
    .await;
    assert_eq!(resp["code"], 400);

    let resp = request(
        &mut h.ws,
        6,
        "entity_command",
        json!({"entity_id": "button.ABC123.5", "cmd_id": "toggle"}),
    )
    .await;
    assert_eq!(resp["code"], 501);

    h.driver.shutdown().await;
}

#[tokio::test]
async fn remote_connect_event_reports_device_state() {
    let mut h = harness().await;

    let connect = json!({"kind": "event", "msg": "connect", "cat": "DEVICE"});
    h.ws.send(Message::Text(connect.to_string())).await.unwrap();
    let state = event(&mut h.ws, "device_state").await;
    assert_eq!(state["msg_data"]["state"], "CONNECTED");

    let resp = request(&mut h.ws, 1, "setup_driver", json!({"reconfigure": true})).await;
    assert_eq!(resp["code"], 200);
    let setup = event(&mut h.ws, "driver_setup_change").await;
    assert_eq!(setup["msg_data"]["event_type"], "START");
    let setup = event(&mut h.ws, "driver_setup_change").await;
    assert_eq!(setup["msg_data"]["state"], "WAIT_USER_ACTION");
    let settings = &setup["msg_data"]["require_user_action"]["input"]["settings"];
    assert_eq!(settings[0]["id"], "choice");

    h.driver.shutdown().await;
}
