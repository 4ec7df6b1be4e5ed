#![allow(clippy::unwrap_used)]
// End-to-end engine tests: the real HTTP transport against wiremock,
// mirrored into a `MemoryTree`.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shcsync_api::HubClient;
use shcsync_core::tree::EnumCategory;
use shcsync_core::{
    Engine, EngineConfig, HubTransport, LocalTree, MemoryTree, PollConfig, StorageValue,
};

const DEVICE: &str = "hdm:HomeMaticIP:3014F711A0001";
const SERVICE_PATH: &str = "/devices/hdm:HomeMaticIP:3014F711A0001/services/TemperatureLevel";

// ── Helpers ─────────────────────────────────────────────────────────

fn rpc_ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!([{ "result": result, "jsonrpc": "2.0" }]))
}

async fn mount_inventory(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/smarthome/rooms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "@type": "room", "id": "hz_2", "name": "Bedroom" }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/smarthome/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "@type": "device",
            "id": DEVICE,
            "rootDeviceId": "64-da-a0-00-00-01",
            "roomId": "hz_2",
            "deviceModel": "TRV",
            "name": "Radiator"
        }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/smarthome/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "@type": "DeviceServiceData",
            "id": "TemperatureLevel",
            "deviceId": DEVICE,
            "state": { "@type": "temperatureLevelState", "temperature": 20.0 },
            "path": SERVICE_PATH
        }])))
        .mount(server)
        .await;
}

async fn mount_feed(server: &MockServer, first_batch: Value) {
    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .and(body_partial_json(json!([{ "method": "RE/subscribe" }])))
        .respond_with(rpc_ok(json!("sub-1")))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .and(body_partial_json(json!([{ "method": "RE/longPoll" }])))
        .respond_with(rpc_ok(first_batch))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .and(body_partial_json(json!([{ "method": "RE/longPoll" }])))
        .respond_with(rpc_ok(json!([])).set_delay(Duration::from_millis(200)))
        .with_priority(2)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .and(body_partial_json(json!([{ "method": "RE/unsubscribe" }])))
        .respond_with(rpc_ok(json!(null)))
        .mount(server)
        .await;
}

fn engine(server: &MockServer, tree: Arc<MemoryTree>) -> Engine {
    let client = HubClient::with_client(reqwest::Client::new(), Url::parse(&server.uri()).unwrap());
    let remote = Arc::new(HubTransport::new(client));
    let config = EngineConfig {
        rate_limit: Duration::ZERO,
        poll: PollConfig {
            wait: Duration::from_secs(1),
            grace: Duration::from_secs(1),
            ..PollConfig::default()
        },
        ..EngineConfig::default()
    };
    Engine::new(config, tree, remote).unwrap()
}

/// Poll `check` until it holds or a few seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_discovery_mirrors_hub_inventory() {
    let server = MockServer::start().await;
    mount_inventory(&server).await;
    let tree = Arc::new(MemoryTree::new());

    let report = engine(&server, tree.clone()).run_discovery().await;
    assert!(report.is_complete(), "{report:?}");

    let address = format!("{DEVICE}.TemperatureLevel.temperature");
    let node = tree.get_node(&address).await.unwrap().unwrap();
    assert_eq!(node.common.role.as_deref(), Some("value.temperature"));
    assert_eq!(node.common.unit.as_deref(), Some("°C"));
    assert_eq!(
        tree.get_value(&address).await.unwrap(),
        Some(StorageValue::Number(serde_json::Number::from_f64(20.0).unwrap()))
    );
    assert_eq!(
        tree.get_node(DEVICE).await.unwrap().unwrap().common.name,
        "Radiator"
    );
    assert!(tree.get_node("64-da-a0-00-00-01").await.unwrap().is_some());
    assert!(eventually(|| async {
        !tree.enum_members(EnumCategory::Rooms, "bedroom").is_empty()
    })
    .await);
}

#[tokio::test]
async fn test_unreachable_hub_degrades_to_restored_state() {
    let server = MockServer::start().await;
    // No mocks: every fetch answers 404.
    let tree = Arc::new(MemoryTree::new());
    let report = engine(&server, tree.clone()).run_discovery().await;

    assert!(!report.is_complete());
    let failure = report.failures().next().unwrap();
    assert_eq!(failure.handler, "device");
    assert!(failure.error.as_deref().unwrap().contains("fetch_rooms"));
}

#[tokio::test]
async fn test_feed_updates_tree_and_local_changes_reach_hub() {
    let server = MockServer::start().await;
    mount_inventory(&server).await;
    mount_feed(
        &server,
        json!([{
            "@type": "DeviceServiceData",
            "id": "TemperatureLevel",
            "deviceId": DEVICE,
            "path": SERVICE_PATH,
            "state": { "@type": "temperatureLevelState", "temperature": 21.5 }
        }]),
    )
    .await;

    Mock::given(method("PUT"))
        .and(path(format!("/smarthome{SERVICE_PATH}/state")))
        .and(body_partial_json(json!({ "@type": "temperatureLevelState", "temperature": 23 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let tree = Arc::new(MemoryTree::new());
    let engine = engine(&server, tree.clone());
    engine.run_discovery().await;
    engine.start_reconnection_loop().await.unwrap();

    let address = format!("{DEVICE}.TemperatureLevel.temperature");
    let expected = StorageValue::Number(serde_json::Number::from_f64(21.5).unwrap());
    assert!(
        eventually(|| async { tree.get_value(&address).await.unwrap() == Some(expected.clone()) })
            .await,
        "feed update never applied"
    );
    assert_eq!(
        tree.get_value("info.connection").await.unwrap(),
        Some(StorageValue::Bool(true))
    );

    engine
        .on_local_change(format!("shcsync.0.{address}"), StorageValue::from(23_i64))
        .unwrap();
    assert!(
        eventually(|| async {
            server
                .received_requests()
                .await
                .unwrap_or_default()
                .iter()
                .any(|r| r.method == wiremock::http::Method::PUT)
        })
        .await,
        "command never sent"
    );

    engine.stop().await;
    assert_eq!(
        tree.get_value("info.connection").await.unwrap(),
        Some(StorageValue::Bool(false))
    );
}
