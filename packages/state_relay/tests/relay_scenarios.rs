//! End-to-end relay tests: a real axum server on a random port driven by
//! tokio-tungstenite clients.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use state_relay::{RelayConfig, RelayState, create_routes};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Timeout for each async operation in tests.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to listen before concluding nothing is coming.
const QUIET_PERIOD: Duration = Duration::from_millis(300);

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (SocketAddr, RelayState) {
    start_server_with(None).await
}

async fn start_server_with(static_dir: Option<&Path>) -> (SocketAddr, RelayState) {
    let state = RelayState::new(RelayConfig {
        handshake_timeout: Duration::from_secs(2),
        client_buffer: 64,
    });
    let app = create_routes(state.clone(), static_dir);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server error");
    });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = timeout(
        TEST_TIMEOUT,
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws")),
    )
    .await
    .expect("timed out connecting")
    .expect("failed to connect");
    ws
}

async fn send_text(ws: &mut Ws, text: &str) {
    timeout(TEST_TIMEOUT, ws.send(Message::Text(text.to_owned().into())))
        .await
        .expect("timed out sending")
        .expect("send failed");
}

async fn join(addr: SocketAddr, role: &str) -> Ws {
    let mut ws = connect(addr).await;
    send_text(&mut ws, &json!({ "role": role }).to_string()).await;
    ws
}

/// Next text frame, skipping control frames. `None` once the server closes.
async fn next_text(ws: &mut Ws, wait: Duration) -> Option<String> {
    timeout(wait, async {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    })
    .await
    .unwrap_or(None)
}

async fn recv_json(ws: &mut Ws) -> Value {
    let text = next_text(ws, TEST_TIMEOUT)
        .await
        .expect("connection closed while waiting for a frame");
    serde_json::from_str(&text).expect("frame is not JSON")
}

async fn assert_quiet(ws: &mut Ws) {
    if let Ok(Some(Ok(frame))) = timeout(QUIET_PERIOD, ws.next()).await {
        panic!("expected no frame, got {:?}", frame);
    }
}

async fn assert_closed(ws: &mut Ws) {
    assert!(
        next_text(ws, TEST_TIMEOUT).await.is_none(),
        "expected the server to close the connection"
    );
}

async fn wait_for_clients(state: &RelayState, n: usize) {
    timeout(TEST_TIMEOUT, async {
        while state.registry.client_count().await != n {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("client count never reached {n}"));
}

async fn wait_for_host(state: &RelayState, present: bool) {
    timeout(TEST_TIMEOUT, async {
        while state.registry.host().await.is_some() != present {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("host slot never settled");
}

async fn wait_for_state(state: &RelayState) {
    timeout(TEST_TIMEOUT, async {
        while state.registry.state().await.is_none() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("host update never stored");
}

#[tokio::test]
async fn late_client_gets_snapshot_then_updates() {
    let (addr, state) = start_server().await;

    let mut host = join(addr, "host").await;
    send_text(&mut host, r#"{"score":1}"#).await;
    wait_for_state(&state).await;

    let mut client = join(addr, "client").await;
    assert_eq!(recv_json(&mut client).await, json!({"score": 1}));

    send_text(&mut host, r#"{"score":2}"#).await;
    assert_eq!(recv_json(&mut client).await, json!({"score": 2}));
}

#[tokio::test]
async fn second_host_is_rejected_and_first_keeps_relaying() {
    let (addr, state) = start_server().await;

    let mut host_a = join(addr, "host").await;
    wait_for_host(&state, true).await;

    let mut host_b = join(addr, "host").await;
    assert_eq!(
        recv_json(&mut host_b).await,
        json!({"type": "ERROR", "message": "HostAlreadyExists"})
    );
    assert_closed(&mut host_b).await;

    let mut client = join(addr, "client").await;
    wait_for_clients(&state, 1).await;
    send_text(&mut host_a, r#"{"turn":"a"}"#).await;
    assert_eq!(recv_json(&mut client).await, json!({"turn": "a"}));
}

#[tokio::test]
async fn host_departure_notifies_and_resets() {
    let (addr, state) = start_server().await;

    let mut client = join(addr, "client").await;
    wait_for_clients(&state, 1).await;

    let mut host = join(addr, "host").await;
    send_text(&mut host, r#"{"score":1}"#).await;
    assert_eq!(recv_json(&mut client).await, json!({"score": 1}));

    host.close(None).await.expect("close failed");
    assert_eq!(
        recv_json(&mut client).await,
        json!({"type": "HOST_DISCONNECTED"})
    );
    wait_for_host(&state, false).await;
    assert!(state.registry.state().await.is_none());

    let mut late = join(addr, "client").await;
    wait_for_clients(&state, 2).await;
    assert_quiet(&mut late).await;

    // The slot is free again for a new host.
    let mut next_host = join(addr, "host").await;
    wait_for_host(&state, true).await;
    send_text(&mut next_host, r#"{"score":0}"#).await;
    assert_eq!(recv_json(&mut late).await, json!({"score": 0}));
}

/// Whether the dead client is removed by its own session or pruned by the
/// relay mid-broadcast depends on timing; either way the others keep going.
#[tokio::test]
async fn disconnected_client_does_not_block_others() {
    let (addr, state) = start_server().await;

    let mut a = join(addr, "client").await;
    let b = join(addr, "client").await;
    let mut c = join(addr, "client").await;
    wait_for_clients(&state, 3).await;

    drop(b);

    let mut host = join(addr, "host").await;
    wait_for_host(&state, true).await;
    send_text(&mut host, r#"{"round":1}"#).await;
    assert_eq!(recv_json(&mut a).await, json!({"round": 1}));
    assert_eq!(recv_json(&mut c).await, json!({"round": 1}));

    wait_for_clients(&state, 2).await;
    send_text(&mut host, r#"{"round":2}"#).await;
    assert_eq!(recv_json(&mut a).await, json!({"round": 2}));
    assert_eq!(recv_json(&mut c).await, json!({"round": 2}));
}

#[tokio::test]
async fn updates_arrive_in_host_order() {
    let (addr, state) = start_server().await;

    let mut a = join(addr, "client").await;
    let mut b = join(addr, "client").await;
    wait_for_clients(&state, 2).await;

    let mut host = join(addr, "host").await;
    for i in 0..40 {
        send_text(&mut host, &json!({ "tick": i }).to_string()).await;
    }
    for i in 0..40 {
        assert_eq!(recv_json(&mut a).await, json!({ "tick": i }));
        assert_eq!(recv_json(&mut b).await, json!({ "tick": i }));
    }
}

#[tokio::test]
async fn concurrent_hosts_admit_exactly_one() {
    let (addr, state) = start_server().await;

    let mut attempts = Vec::new();
    for _ in 0..6 {
        attempts.push(tokio::spawn(async move {
            let mut ws = join(addr, "host").await;
            let rejected = match next_text(&mut ws, Duration::from_secs(2)).await {
                Some(text) => {
                    let v: Value = serde_json::from_str(&text).unwrap();
                    assert_eq!(v, json!({"type": "ERROR", "message": "HostAlreadyExists"}));
                    true
                }
                None => false,
            };
            (rejected, ws)
        }));
    }

    let mut accepted = Vec::new();
    let mut rejected = 0;
    for attempt in attempts {
        let (was_rejected, ws) = attempt.await.unwrap();
        if was_rejected {
            rejected += 1;
        } else {
            accepted.push(ws);
        }
    }
    assert_eq!(accepted.len(), 1);
    assert_eq!(rejected, 5);
    assert!(state.registry.host().await.is_some());
}

#[tokio::test]
async fn invalid_handshakes_are_closed_without_reply() {
    let (addr, state) = start_server().await;

    for opening in ["hello", r#"{"role":"admin"}"#, r#"{"name":"x"}"#] {
        let mut ws = connect(addr).await;
        send_text(&mut ws, opening).await;
        assert_closed(&mut ws).await;
    }

    assert!(state.registry.host().await.is_none());
    assert_eq!(state.registry.client_count().await, 0);
    assert_eq!(state.metrics.snapshot().roles.handshake_failures, 3);
}

#[tokio::test]
async fn malformed_host_update_ends_host_session() {
    let (addr, state) = start_server().await;

    let mut client = join(addr, "client").await;
    wait_for_clients(&state, 1).await;

    let mut host = join(addr, "host").await;
    send_text(&mut host, r#"{"score":1}"#).await;
    assert_eq!(recv_json(&mut client).await, json!({"score": 1}));

    send_text(&mut host, "score = 2").await;
    assert_eq!(
        recv_json(&mut client).await,
        json!({"type": "HOST_DISCONNECTED"})
    );
    assert_closed(&mut host).await;
    wait_for_host(&state, false).await;
}

#[tokio::test]
async fn health_reports_relay_status() {
    let (addr, state) = start_server().await;

    let _host = join(addr, "host").await;
    let _client = join(addr, "client").await;
    wait_for_host(&state, true).await;
    wait_for_clients(&state, 1).await;

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .expect("health request failed")
        .json()
        .await
        .expect("health body is not JSON");
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["host_connected"], true);
    assert_eq!(health["clients"], 1);

    let metrics: Value = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .expect("metrics request failed")
        .json()
        .await
        .expect("metrics body is not JSON");
    assert_eq!(metrics["roles"]["hosts_accepted"], 1);
    assert_eq!(metrics["roles"]["clients_joined"], 1);
}

#[tokio::test]
async fn status_page_served_without_static_dir() {
    let (addr, _state) = start_server().await;

    let body = reqwest::get(format!("http://{addr}/"))
        .await
        .expect("index request failed")
        .text()
        .await
        .unwrap();
    assert!(body.contains("State Relay"));
}

#[tokio::test]
async fn static_assets_served_alongside_ws() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("index.html"), "<h1>board</h1>").unwrap();
    std::fs::write(tmp.path().join("app.js"), "console.log('relay');").unwrap();
    let (addr, state) = start_server_with(Some(tmp.path())).await;

    let index = reqwest::get(format!("http://{addr}/"))
        .await
        .expect("index request failed");
    assert!(index.status().is_success());
    assert_eq!(index.text().await.unwrap(), "<h1>board</h1>");

    let script = reqwest::get(format!("http://{addr}/app.js"))
        .await
        .expect("asset request failed");
    assert!(script.status().is_success());
    assert_eq!(script.text().await.unwrap(), "console.log('relay');");

    let missing = reqwest::get(format!("http://{addr}/nope.css"))
        .await
        .expect("missing asset request failed");
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    let _host = join(addr, "host").await;
    wait_for_host(&state, true).await;
}
