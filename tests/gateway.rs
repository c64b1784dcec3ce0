//! End-to-end tests against a gateway bound to an ephemeral local port.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, accept_async, connect_async,
    connect_async_tls_with_config,
};

use echo_gateway::app_state::AppState;
use echo_gateway::probe::{CLOSE_TIMEOUT, RttProbe, RttReply, TrustPolicy, client_config};
use echo_gateway::server::Gateway;
use echo_gateway::timestamp::{now_millis, parse_millis};
use echo_gateway::tls::load_tls_acceptor;
use echo_gateway::ws::rtt::RttMode;
use echo_gateway::ws::session::CLOSE_GRACE;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_gateway(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(Gateway::new(state).serve_plain(listener));
    addr
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn test_ca() -> TrustPolicy {
    TrustPolicy::CustomCa(fixture("ca.crt"))
}

async fn spawn_tls_gateway(state: AppState) -> SocketAddr {
    let acceptor =
        load_tls_acceptor(&fixture("websocket.crt"), &fixture("websocket.key")).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(Gateway::new(state).serve_tls(listener, acceptor));
    addr
}

async fn connect_tls(addr: SocketAddr, path: &str) -> Client {
    let connector = Connector::Rustls(Arc::new(client_config(&test_ca()).unwrap()));
    let (stream, _) =
        connect_async_tls_with_config(format!("wss://{addr}{path}"), None, false, Some(connector))
            .await
            .unwrap();
    stream
}

async fn read_head(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    let mut byte = [0_u8; 1];
    while !received.ends_with(b"\r\n\r\n") {
        match tokio::time::timeout(WAIT, stream.read(&mut byte)).await {
            Ok(Ok(1)) => received.push(byte[0]),
            _ => break,
        }
    }
    received
}

fn masked_text_frame(payload: &[u8]) -> Vec<u8> {
    let mask = [0x12_u8, 0x34, 0x56, 0x78];
    let mut frame = vec![0x81, 0x80 | u8::try_from(payload.len()).unwrap()];
    frame.extend_from_slice(&mask);
    frame.extend(payload.iter().zip(mask.iter().cycle()).map(|(b, m)| b ^ m));
    frame
}

async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (stream, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
    stream
}

async fn next(client: &mut Client) -> Option<Message> {
    tokio::time::timeout(WAIT, client.next())
        .await
        .expect("timed out waiting for a frame")
        .map(|frame| frame.unwrap())
}

async fn raw_exchange(addr: SocketAddr, request: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut received = Vec::new();
    let mut buf = [0_u8; 1024];
    loop {
        match tokio::time::timeout(WAIT, stream.read(&mut buf)).await {
            Ok(Ok(0) | Err(_)) | Err(_) => break,
            Ok(Ok(n)) => {
                received.extend_from_slice(&buf[..n]);
                if received.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    received
}

#[tokio::test]
async fn foo_greets_then_echoes_text() {
    let addr = spawn_gateway(AppState::default()).await;
    let mut client = connect(addr, "/foo").await;

    assert_eq!(
        next(&mut client).await,
        Some(Message::text("Connected to \"/foo\"..."))
    );

    for _ in 0..3 {
        client.send(Message::text("hello")).await.unwrap();
        assert_eq!(next(&mut client).await, Some(Message::text("hello")));
    }
}

#[tokio::test]
async fn echo_preserves_binary_frames() {
    let addr = spawn_gateway(AppState::default()).await;
    let mut client = connect(addr, "/bar").await;

    assert_eq!(
        next(&mut client).await,
        Some(Message::text("Connected to \"/bar\"..."))
    );

    let payload = vec![0_u8, 1, 2, 254, 255];
    client.send(Message::binary(payload.clone())).await.unwrap();
    assert_eq!(next(&mut client).await, Some(Message::binary(payload)));
}

#[tokio::test]
async fn root_ignores_query_string() {
    let addr = spawn_gateway(AppState::default()).await;
    for path in ["", "/", "/?token=abc"] {
        let mut client = connect(addr, path).await;
        assert_eq!(
            next(&mut client).await,
            Some(Message::text("Connected to \"/\". No endpoint specified..."))
        );
        client.send(Message::text("ping")).await.unwrap();
        assert_eq!(next(&mut client).await, Some(Message::text("ping")));
    }
}

#[tokio::test]
async fn rtt_echoes_once_then_closes() {
    let addr = spawn_gateway(AppState::default()).await;
    let mut client = connect(addr, "/rtt").await;

    client.send(Message::text("1700000000000")).await.unwrap();
    assert_eq!(next(&mut client).await, Some(Message::text("1700000000000")));

    match next(&mut client).await {
        Some(Message::Close(Some(frame))) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("expected a close frame, got {other:?}"),
    }
    let after = tokio::time::timeout(WAIT, client.next()).await.unwrap();
    assert!(matches!(after, None | Some(Err(_))));
}

#[tokio::test]
async fn rtt_drops_peer_that_never_acknowledges_close() {
    let addr = spawn_gateway(AppState::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            b"GET /rtt HTTP/1.1\r\n\
              Host: localhost\r\n\
              Connection: Upgrade\r\n\
              Upgrade: websocket\r\n\
              Sec-WebSocket-Version: 13\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .await
        .unwrap();
    let head = read_head(&mut stream).await;
    assert!(
        head.starts_with(b"HTTP/1.1 101"),
        "unexpected response: {}",
        String::from_utf8_lossy(&head)
    );

    stream
        .write_all(&masked_text_frame(b"1700000000000"))
        .await
        .unwrap();

    // Read the reply and the close frame, never answer the close.
    let dropped = tokio::time::timeout(CLOSE_GRACE + WAIT, async {
        let mut buf = [0_u8; 256];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
    assert!(dropped.is_ok(), "server kept the socket open");
}

#[tokio::test]
async fn rtt_server_clock_is_not_before_send() {
    let addr = spawn_gateway(AppState {
        rtt_mode: RttMode::ServerClock,
        idle_timeout: None,
    })
    .await;
    let mut client = connect(addr, "/rtt").await;

    let sent = now_millis();
    client.send(Message::text(sent.to_string())).await.unwrap();
    let Some(Message::Text(reply)) = next(&mut client).await else {
        panic!("expected a text reply");
    };
    assert!(parse_millis(reply.as_str()).unwrap() >= sent);
    assert!(matches!(next(&mut client).await, Some(Message::Close(_))));
}

#[tokio::test]
async fn plain_request_gets_bad_request() {
    let addr = spawn_gateway(AppState::default()).await;
    let response = raw_exchange(addr, "GET /foo HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(
        response.starts_with(b"HTTP/1.1 400"),
        "unexpected response: {}",
        String::from_utf8_lossy(&response)
    );
}

#[tokio::test]
async fn non_websocket_upgrade_gets_bad_request() {
    let addr = spawn_gateway(AppState::default()).await;
    let response = raw_exchange(
        addr,
        "GET /unknown HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\nUpgrade: h2c\r\n\r\n",
    )
    .await;
    assert!(response.starts_with(b"HTTP/1.1 400"));
}

#[tokio::test]
async fn unknown_path_is_dropped_without_response() {
    let addr = spawn_gateway(AppState::default()).await;
    let response = raw_exchange(
        addr,
        "GET /baz HTTP/1.1\r\n\
         Host: localhost\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
    )
    .await;
    assert!(
        response.is_empty(),
        "expected no bytes, got {}",
        String::from_utf8_lossy(&response)
    );
    assert!(connect_async(format!("ws://{addr}/baz")).await.is_err());
}

#[tokio::test]
async fn idle_session_is_closed() {
    let addr = spawn_gateway(AppState {
        rtt_mode: RttMode::Echo,
        idle_timeout: Some(Duration::from_millis(100)),
    })
    .await;
    let mut client = connect(addr, "/foo").await;
    assert!(matches!(next(&mut client).await, Some(Message::Text(_))));

    let ended = tokio::time::timeout(WAIT, async {
        loop {
            match client.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok());
}

#[tokio::test]
async fn probe_measures_echoed_round_trip() {
    let addr = spawn_gateway(AppState::default()).await;
    let probe = RttProbe::new(&format!("ws://{addr}"), &TrustPolicy::default()).unwrap();
    assert_eq!(probe.url(), format!("ws://{addr}/rtt"));

    let sample = probe.measure().await.unwrap();
    assert_eq!(sample.reply, RttReply::Echoed);
    assert!(sample.received_at_ms >= sample.sent_at_ms);
    assert!(sample.to_string().starts_with("Round-Trip Time: "));
}

#[tokio::test]
async fn probe_takes_repeated_samples() {
    let addr = spawn_gateway(AppState::default()).await;
    let probe = RttProbe::new(&format!("ws://{addr}"), &TrustPolicy::default()).unwrap();
    for _ in 0..3 {
        assert_eq!(probe.measure().await.unwrap().reply, RttReply::Echoed);
    }
}

#[tokio::test]
async fn probe_sees_server_clock() {
    let addr = spawn_gateway(AppState {
        rtt_mode: RttMode::ServerClock,
        idle_timeout: None,
    })
    .await;
    let probe = RttProbe::new(&format!("ws://{addr}"), &TrustPolicy::default()).unwrap();
    let sample = probe.measure().await.unwrap();
    // Same host, same clock: equal millis are classified as an echo.
    assert!(matches!(
        sample.reply,
        RttReply::ServerClock(_) | RttReply::Echoed
    ));
}

#[tokio::test]
async fn probe_reports_connection_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let probe = RttProbe::new(&format!("ws://{addr}"), &TrustPolicy::default()).unwrap();
    let err = probe.measure().await.err().unwrap();
    assert!(err.to_string().contains(&format!("ws://{addr}/rtt")));
}

#[tokio::test]
async fn measure_stops_waiting_for_unacknowledged_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut server = accept_async(tcp).await.unwrap();
        let request = server.next().await.unwrap().unwrap();
        server.send(request).await.unwrap();
        // Hold the socket without ever reading the client's close frame.
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(server);
    });

    let probe = RttProbe::new(&format!("ws://{addr}"), &TrustPolicy::default()).unwrap();
    let sample = tokio::time::timeout(CLOSE_TIMEOUT + WAIT, probe.measure())
        .await
        .expect("measure kept waiting after the reply")
        .unwrap();
    assert_eq!(sample.reply, RttReply::Echoed);
}

#[tokio::test]
async fn tls_listener_greets_and_echoes() {
    let addr = spawn_tls_gateway(AppState::default()).await;
    let mut client = connect_tls(addr, "/foo").await;

    assert_eq!(
        next(&mut client).await,
        Some(Message::text("Connected to \"/foo\"..."))
    );
    client.send(Message::text("over tls")).await.unwrap();
    assert_eq!(next(&mut client).await, Some(Message::text("over tls")));
}

#[tokio::test]
async fn measure_over_tls_with_custom_ca() {
    let addr = spawn_tls_gateway(AppState::default()).await;
    let probe = RttProbe::new(&format!("wss://{addr}"), &test_ca()).unwrap();
    assert_eq!(probe.url(), format!("wss://{addr}/rtt"));

    let sample = probe.measure().await.unwrap();
    assert_eq!(sample.reply, RttReply::Echoed);
}

#[tokio::test]
async fn failed_tls_handshake_leaves_listener_serving() {
    let addr = spawn_tls_gateway(AppState::default()).await;

    let mut garbage = TcpStream::connect(addr).await.unwrap();
    garbage
        .write_all(b"GET /foo HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut buf = [0_u8; 64];
    let _ = tokio::time::timeout(WAIT, garbage.read(&mut buf)).await;
    drop(garbage);

    let mut client = connect_tls(addr, "/bar").await;
    assert_eq!(
        next(&mut client).await,
        Some(Message::text("Connected to \"/bar\"..."))
    );
}

#[tokio::test]
async fn measure_rejects_untrusted_certificate_unless_insecure() {
    let addr = spawn_tls_gateway(AppState::default()).await;
    let probe = RttProbe::new(&format!("wss://{addr}"), &TrustPolicy::WebPki).unwrap();
    assert!(probe.measure().await.is_err());

    let insecure = RttProbe::new(&format!("wss://{addr}"), &TrustPolicy::AcceptAny).unwrap();
    assert_eq!(insecure.measure().await.unwrap().reply, RttReply::Echoed);
}
