use domain::{ConfigMap, ResourceState};
use edge_ingest::{GENERIC_MQTT, GENERIC_TCP, GENERIC_UDP, HTTP, register_types};
use edge_runtime::{ChannelRuleHook, InterCache, RuleEvent, RuleEventKind, Runtimes};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc::Receiver;

fn config(value: Value) -> ConfigMap {
    match value {
        Value::Object(map) => map,
        _ => panic!("config must be an object"),
    }
}

fn setup() -> (Runtimes, Receiver<RuleEvent>) {
    let runtimes = Runtimes::new(Arc::new(InterCache::new()));
    let (hook, rx) = ChannelRuleHook::new(16);
    register_types(&runtimes.sources, Arc::new(hook));
    (runtimes, rx)
}

async fn free_tcp_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn next_event(rx: &mut Receiver<RuleEvent>) -> RuleEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn http_source_forwards_data() {
    let (runtimes, mut rx) = setup();
    let port = free_tcp_port().await;
    runtimes
        .sources
        .load(
            "in1",
            "http",
            HTTP,
            config(json!({"host": "127.0.0.1", "port": port})),
            "",
        )
        .await
        .unwrap();
    runtimes.sources.restart("in1").await.unwrap();
    assert_eq!(runtimes.sources.get_status("in1").await.unwrap(), ResourceState::Up);

    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/in", port);
    let reply: Value = client
        .post(&url)
        .json(&json!({"data": "hello"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply, json!({"code": 200, "message": "success"}));

    let event = next_event(&mut rx).await;
    assert_eq!(event.kind, RuleEventKind::InEnd);
    assert_eq!(event.uuid, "in1");
    assert_eq!(event.data, "hello");

    let bad = client
        .post(&url)
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status().as_u16(), 500);

    runtimes.sources.stop("in1").await.unwrap();
}

#[tokio::test]
async fn tcp_source_frames_and_acks() {
    let (runtimes, mut rx) = setup();
    let port = free_tcp_port().await;
    runtimes
        .sources
        .load(
            "in2",
            "tcp",
            GENERIC_TCP,
            config(json!({"host": "127.0.0.1", "port": port})),
            "",
        )
        .await
        .unwrap();
    runtimes.sources.restart("in2").await.unwrap();

    let mut conn = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let local = conn.local_addr().unwrap().to_string();
    conn.write_all(&[0, 0, 0, 5]).await.unwrap();
    conn.write_all(b"hello").await.unwrap();
    let mut ack = [0u8; 2];
    tokio::time::timeout(Duration::from_secs(2), conn.read_exact(&mut ack))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&ack, b"ok");

    let event = next_event(&mut rx).await;
    let data: Value = serde_json::from_str(&event.data).unwrap();
    assert_eq!(data, json!({"clientAddr": local, "data": "hello"}));

    // 非 UTF-8 数据按十六进制上送
    conn.write_all(&[0, 0, 0, 2, 0xff, 0xfe]).await.unwrap();
    let event = next_event(&mut rx).await;
    let data: Value = serde_json::from_str(&event.data).unwrap();
    assert_eq!(data["data"], "fffe");
}

#[tokio::test]
async fn tcp_source_rejects_oversized_frame() {
    let (runtimes, mut rx) = setup();
    let port = free_tcp_port().await;
    runtimes
        .sources
        .load(
            "in3",
            "tcp",
            GENERIC_TCP,
            config(json!({"host": "127.0.0.1", "port": port, "maxDataLength": 4})),
            "",
        )
        .await
        .unwrap();
    runtimes.sources.restart("in3").await.unwrap();

    let mut conn = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    conn.write_all(&[0, 0, 0, 8]).await.unwrap();
    conn.write_all(b"12345678").await.unwrap();
    let mut buf = [0u8; 8];
    let read = tokio::time::timeout(Duration::from_secs(2), conn.read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn udp_source_forwards_and_replies() {
    let (runtimes, mut rx) = setup();
    let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    runtimes
        .sources
        .load(
            "in4",
            "udp",
            GENERIC_UDP,
            config(json!({"host": "127.0.0.1", "port": port})),
            "",
        )
        .await
        .unwrap();
    runtimes.sources.restart("in4").await.unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"ping", ("127.0.0.1", port)).await.unwrap();
    let mut buf = [0u8; 16];
    let (n, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"ok");

    let event = next_event(&mut rx).await;
    let data: Value = serde_json::from_str(&event.data).unwrap();
    assert_eq!(data["data"], "ping");
    assert_eq!(
        data["clientAddr"],
        client.local_addr().unwrap().to_string()
    );
}

#[tokio::test]
async fn source_start_fails_when_port_taken() {
    let (runtimes, _rx) = setup();
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();
    runtimes
        .sources
        .load(
            "in5",
            "tcp",
            GENERIC_TCP,
            config(json!({"host": "127.0.0.1", "port": port})),
            "",
        )
        .await
        .unwrap();
    assert!(runtimes.sources.restart("in5").await.is_err());
}

#[tokio::test]
async fn mqtt_source_requires_broker() {
    let (runtimes, _rx) = setup();
    let port = free_tcp_port().await;
    runtimes
        .sources
        .load(
            "in6",
            "mqtt",
            GENERIC_MQTT,
            config(json!({"host": "127.0.0.1", "port": port, "subTopics": ["a/#"]})),
            "",
        )
        .await
        .unwrap();
    assert!(runtimes.sources.restart("in6").await.is_err());
    assert!(
        runtimes
            .sources
            .load("in7", "mqtt", GENERIC_MQTT, config(json!({"qos": 5})), "")
            .await
            .is_err()
    );
}
