use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use domain::ConfigMap;
use edge_cecolla::auth::SignMethod;
use edge_cecolla::httpapi::fetch_schema;
use edge_cecolla::{
    CecollaError, GatewayCore, GatewayMode, ITHINGS_IOTHUB, IThingsConfig, Uplink, register_types,
};
use edge_runtime::{InterCache, NoopRuleHook, RuntimeError, Runtimes};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Recorder {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl Uplink for Recorder {
    async fn subscribe(&self, _topic: &str) -> Result<(), CecollaError> {
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), CecollaError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

fn config_map(value: Value) -> ConfigMap {
    match value {
        Value::Object(map) => map,
        _ => panic!("config must be an object"),
    }
}

fn ithings_config() -> IThingsConfig {
    IThingsConfig {
        server_endpoint: "tcp://127.0.0.1:1883".to_string(),
        mode: GatewayMode::Device,
        sub_product: String::new(),
        product_id: "pid".to_string(),
        device_name: "dev".to_string(),
        device_psk: "psk".to_string(),
        sign_method: SignMethod::HmacSha256,
        schema_api_host: String::new(),
    }
}

#[tokio::test]
async fn property_report_publishes_one_message() {
    let recorder = Arc::new(Recorder::default());
    let core = GatewayCore::new(
        "c1",
        ithings_config(),
        recorder.clone(),
        Arc::new(NoopRuleHook),
        Arc::new(InterCache::new()),
    );

    core.on_ctrl("PropertyReport", br#"{"temp":25}"#).await.unwrap();

    let published = recorder.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    let (topic, payload) = &published[0];
    assert_eq!(topic, "$thing/up/property/pid/dev");
    let body: Value = serde_json::from_slice(payload).unwrap();
    assert_eq!(body["method"], "report");
    assert_eq!(body["params"]["temp"], 25);
    assert!(!body["msgToken"].as_str().unwrap().is_empty());
    assert!(body["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn get_schema_before_any_reply() {
    let core = GatewayCore::new(
        "c2",
        ithings_config(),
        Arc::new(Recorder::default()),
        Arc::new(NoopRuleHook),
        Arc::new(InterCache::new()),
    );
    let reply: Value = serde_json::from_slice(&core.on_ctrl("GetSchema", b"").await.unwrap()).unwrap();
    assert_eq!(reply, json!({"gatewaySchema": null, "subDeviceSchema": null}));
}

#[tokio::test]
async fn runtime_rejects_ctrl_before_connect() {
    let runtimes = Runtimes::new(Arc::new(InterCache::new()));
    register_types(&runtimes.cecollas, Arc::new(NoopRuleHook));

    runtimes
        .cecollas
        .load(
            "cec1",
            "ithings",
            ITHINGS_IOTHUB,
            config_map(json!({"productId": "pid", "deviceName": "dev", "devicePsk": "psk"})),
            "",
        )
        .await
        .unwrap();
    let err = runtimes
        .cecollas
        .on_ctrl("cec1", "PropertyReport", br#"{"temp":25}"#)
        .await
        .unwrap_err();
    assert_eq!(err, RuntimeError::Worker("invalid mqtt connection".to_string()));

    let bad = runtimes
        .cecollas
        .load(
            "cec2",
            "ithings",
            ITHINGS_IOTHUB,
            config_map(json!({"productId": "pid", "deviceName": "dev", "devicePsk": "psk", "mode": "GATEWAY"})),
            "",
        )
        .await;
    assert!(matches!(bad, Err(RuntimeError::Config(_))));
}

#[tokio::test]
async fn start_fails_without_broker() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let runtimes = Runtimes::new(Arc::new(InterCache::new()));
    register_types(&runtimes.cecollas, Arc::new(NoopRuleHook));
    runtimes
        .cecollas
        .load(
            "cec3",
            "ithings",
            ITHINGS_IOTHUB,
            config_map(json!({
                "serverEndpoint": format!("tcp://127.0.0.1:{}", port),
                "productId": "pid",
                "deviceName": "dev",
                "devicePsk": "psk"
            })),
            "",
        )
        .await
        .unwrap();
    assert!(runtimes.cecollas.restart("cec3").await.is_err());
}

#[tokio::test]
async fn fetch_schema_over_http() {
    async fn schema(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        // "user:pass"
        if auth != "Basic dXNlcjpwYXNz" || body["method"] != "getSchema" {
            return (StatusCode::UNAUTHORIZED, Json(json!({})));
        }
        (
            StatusCode::OK,
            Json(json!({
                "code": 200,
                "msg": "success",
                "data": {"code": 200, "msg": "success", "data": {
                    "properties": [{"id": "temp", "name": "温度", "mode": "r", "type": "float"}]
                }}
            })),
        )
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route(
        "/api/v1/things/device/edge/send/thing/property/pid/dev",
        post(schema),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let fetched = fetch_schema(&client, &addr.to_string(), "pid", "dev", "user", "pass")
        .await
        .unwrap();
    assert_eq!(fetched.properties.len(), 1);
    assert_eq!(fetched.properties[0].identifier, "temp");

    assert!(
        fetch_schema(&client, &addr.to_string(), "pid", "dev", "user", "wrong")
            .await
            .is_err()
    );
}
