use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use edge_config::AppConfig;
use edge_gateway::{Gateway, ResourceFile, Stores, build_app};
use edge_runtime::{HardwarePort, OccupyBy};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::UdpSocket;
use tower::ServiceExt;

fn gateway() -> Gateway {
    let config = AppConfig::from_lookup(|_| None).unwrap();
    let stores = Stores::in_memory(&config);
    Gateway::build(config, stores)
}

async fn call(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_sets_request_ids() {
    let gateway = gateway();
    let app = build_app(gateway.state());

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("x-trace-id"));

    let response = app
        .oneshot(
            Request::get("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["ok"], true);
    gateway.shutdown().await;
}

#[tokio::test]
async fn resource_lifecycle() {
    let gateway = gateway();
    let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sink.local_addr().unwrap().port();
    let file = ResourceFile::parse(
        &json!([
            {"uuid": "t1", "name": "sink", "type": "UDP_TARGET", "kind": "target",
             "config": {"host": "127.0.0.1", "port": port}},
            {"uuid": "bad", "name": "x", "type": "NO_SUCH_TYPE", "kind": "target"}
        ])
        .to_string(),
    )
    .unwrap();
    assert_eq!(gateway.load(&file).await, 1);
    let app = build_app(gateway.state());

    let (status, body) = call(&app, Method::GET, "/api/v1/targets", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["uuid"], "t1");
    assert_eq!(body["data"][0]["kind"], "target");
    assert_eq!(body["data"][0]["state"], "PENDING");

    let (status, body) = call(&app, Method::POST, "/api/v1/targets/t1/restart", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "UP");
    assert_eq!(body["data"]["type"], "UDP_TARGET");

    let (status, body) = call(&app, Method::GET, "/api/v1/target/t1", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["config"]["port"], port);

    let (status, _) = call(&app, Method::DELETE, "/api/v1/targets/t1", "").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, Method::GET, "/api/v1/targets/t1", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "RESOURCE.NOT_FOUND");

    let (status, body) = call(&app, Method::GET, "/api/v1/plugins", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    gateway.shutdown().await;
}

#[tokio::test]
async fn disabled_resource_removed_on_next_tick() {
    let gateway = gateway();
    let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sink.local_addr().unwrap().port();
    let file = ResourceFile::parse(
        &json!([
            {"uuid": "t1", "name": "sink", "type": "UDP_TARGET", "kind": "target",
             "config": {"host": "127.0.0.1", "port": port}}
        ])
        .to_string(),
    )
    .unwrap();
    assert_eq!(gateway.load(&file).await, 1);
    let app = build_app(gateway.state());
    gateway.runtimes.targets.manager().supervise_once().await;

    let (status, body) = call(&app, Method::GET, "/api/v1/targets/t1", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "UP");

    let (status, body) = call(&app, Method::POST, "/api/v1/targets/t1/disable", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "DISABLE");
    let (_, body) = call(&app, Method::GET, "/api/v1/targets", "").await;
    assert_eq!(body["data"][0]["state"], "DISABLE");

    gateway.runtimes.targets.manager().supervise_once().await;
    let (status, body) = call(&app, Method::GET, "/api/v1/targets/t1", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "RESOURCE.NOT_FOUND");
    let (_, body) = call(&app, Method::GET, "/api/v1/targets", "").await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = call(&app, Method::POST, "/api/v1/targets/t1/disable", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    gateway.shutdown().await;
}

#[tokio::test]
async fn alarm_logs_are_served() {
    let gateway = gateway();
    let file = ResourceFile::parse(
        r#"{"alarmRules": [{"uuid": "r1", "exprDefines": [{"expr": "temp > 50", "eventType": "OVERHEAT"}]}]}"#,
    )
    .unwrap();
    gateway.load(&file).await;
    let data = json!({"temp": 80});
    let queued = gateway
        .alarm
        .input("r1", "dev1", data.as_object().unwrap())
        .unwrap();
    assert_eq!(queued, 1);

    let app = build_app(gateway.state());
    let mut logs = Value::Null;
    for _ in 0..30 {
        let (_, body) = call(&app, Method::GET, "/api/v1/alarm/logs?limit=5", "").await;
        logs = body["data"].clone();
        if logs.as_array().is_some_and(|l| !l.is_empty()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(logs[0]["ruleId"], "r1");
    assert_eq!(logs[0]["eventType"], "OVERHEAT");
    assert_eq!(logs[0]["summary"], "EventType:[ OVERHEAT ] | Source:[ dev1 ]");

    let (status, body) = call(&app, Method::GET, "/api/v1/metrics", "").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["alarmsFired"].as_u64().unwrap() >= 1);
    gateway.shutdown().await;
}

#[tokio::test]
async fn internal_kv() {
    let gateway = gateway();
    let app = build_app(gateway.state());

    let (status, _) = call(&app, Method::PUT, "/api/v1/kv/site", "plant-7").await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, Method::GET, "/api/v1/kv/site", "").await;
    assert_eq!(body["data"]["value"], "plant-7");
    let (_, body) = call(&app, Method::GET, "/api/v1/kv", "").await;
    assert_eq!(body["data"], json!(["site"]));

    let (status, _) = call(&app, Method::DELETE, "/api/v1/kv/site", "").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, "/api/v1/kv/site", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    gateway.shutdown().await;
}

#[tokio::test]
async fn ports_are_listed() {
    let gateway = gateway();
    let ports = gateway.runtimes.devices.ports().clone();
    ports.register(HardwarePort::new("COM1", "UART"));
    ports
        .occupy("COM1", OccupyBy::new("d1", "DEVICE", "meter"))
        .unwrap();
    let app = build_app(gateway.state());

    let (status, body) = call(&app, Method::GET, "/api/v1/ports", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["name"], "COM1");
    assert_eq!(body["data"][0]["busy"], true);
    assert_eq!(body["data"][0]["occupyBy"]["uuid"], "d1");
    gateway.shutdown().await;
}
