//! End-to-end tests over a real listener and WebSocket clients.

use chat_types::{InboundFrame, OutboundFrame, UserId};
use futures_util::{SinkExt, StreamExt};
use pairchat_relay::config::Config;
use pairchat_relay::http::build_router;
use pairchat_relay::server::ChatRelay;
use pairchat_relay::storage::{MessageLedger, SqliteStorage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const PEM: &str = "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n";
const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    relay: Arc<ChatRelay>,
    addr: SocketAddr,
    alice: UserId,
    bob: UserId,
}

async fn start() -> Harness {
    let storage = SqliteStorage::in_memory().await.unwrap();
    let alice = storage.create_user("alice", PEM).await.unwrap();
    let bob = storage.create_user("bob", PEM).await.unwrap();
    storage.request_connection(alice, bob).await.unwrap();
    storage.accept_connection(alice, bob).await.unwrap();
    storage.insert_session_token("alice-token", alice).await.unwrap();
    storage.insert_session_token("bob-token", bob).await.unwrap();

    let relay = Arc::new(ChatRelay::new(Config::default(), storage));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(relay.clone());
    tokio::spawn(async move { axum::serve(listener, app).await });

    Harness {
        relay,
        addr,
        alice,
        bob,
    }
}

async fn connect(addr: SocketAddr, token: &str) -> Result<Client, tokio_tungstenite::tungstenite::Error> {
    let mut request = format!("ws://{addr}/chat").into_client_request()?;
    request
        .headers_mut()
        .insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
    let (ws, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(ws)
}

/// The upgrade completes before the server registers the socket.
async fn wait_online(relay: &ChatRelay, user: UserId, count: usize) {
    timeout(WAIT, async {
        while relay.registry().connection_count(user) != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection never registered");
}

async fn wait_stored(relay: &ChatRelay, count: u64) {
    timeout(WAIT, async {
        while relay.storage().total_messages().await.unwrap() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("message never stored");
}

async fn send(client: &mut Client, receiver: &str, content: &[u8]) {
    let text = InboundFrame::new(receiver, content.to_vec()).to_json().unwrap();
    client.send(Message::Text(text)).await.unwrap();
}

async fn next_frame(client: &mut Client) -> OutboundFrame {
    loop {
        let msg = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return OutboundFrame::from_json(text.as_bytes()).unwrap();
        }
    }
}

#[tokio::test]
async fn live_message_reaches_every_device() {
    let h = start().await;
    let mut alice = connect(h.addr, "alice-token").await.unwrap();
    let mut bob_phone = connect(h.addr, "bob-token").await.unwrap();
    let mut bob_laptop = connect(h.addr, "bob-token").await.unwrap();
    wait_online(&h.relay, h.alice, 1).await;
    wait_online(&h.relay, h.bob, 2).await;

    send(&mut alice, "bob", b"ciphertext").await;

    for device in [&mut bob_phone, &mut bob_laptop] {
        let frame = next_frame(device).await;
        assert_eq!(frame.sender_username, "alice");
        assert_eq!(frame.sender_id, h.alice);
        assert_eq!(frame.content, b"ciphertext");
    }
}

#[tokio::test]
async fn offline_message_flushed_when_receiver_writes_back() {
    let h = start().await;
    let mut alice = connect(h.addr, "alice-token").await.unwrap();
    wait_online(&h.relay, h.alice, 1).await;

    send(&mut alice, "bob", b"M1").await;
    wait_stored(&h.relay, 1).await;

    let mut bob = connect(h.addr, "bob-token").await.unwrap();
    wait_online(&h.relay, h.bob, 1).await;
    assert_eq!(h.relay.storage().pending_count(h.bob).await.unwrap(), 1);

    send(&mut bob, "alice", b"M2").await;

    let flushed = next_frame(&mut bob).await;
    assert_eq!(flushed.content, b"M1");
    assert_eq!(flushed.sender_username, "alice");

    let reply = next_frame(&mut alice).await;
    assert_eq!(reply.content, b"M2");
    assert_eq!(reply.sender_username, "bob");
}

#[tokio::test]
async fn closing_socket_unregisters_it() {
    let h = start().await;
    let mut bob = connect(h.addr, "bob-token").await.unwrap();
    wait_online(&h.relay, h.bob, 1).await;

    bob.close(None).await.unwrap();

    wait_online(&h.relay, h.bob, 0).await;
    assert!(!h.relay.registry().is_online(h.bob));
}

#[tokio::test]
async fn invalid_token_is_refused() {
    let h = start().await;

    assert!(connect(h.addr, "forged").await.is_err());
    assert_eq!(h.relay.registry().total_connections(), 0);
}

#[tokio::test]
async fn garbage_frame_keeps_connection_open() {
    let h = start().await;
    let mut alice = connect(h.addr, "alice-token").await.unwrap();
    let mut bob = connect(h.addr, "bob-token").await.unwrap();
    wait_online(&h.relay, h.alice, 1).await;
    wait_online(&h.relay, h.bob, 1).await;

    alice.send(Message::Text("{not json".into())).await.unwrap();
    send(&mut alice, "bob", b"still here").await;

    let frame = next_frame(&mut bob).await;
    assert_eq!(frame.content, b"still here");
    assert_eq!(h.relay.storage().total_messages().await.unwrap(), 1);
}
