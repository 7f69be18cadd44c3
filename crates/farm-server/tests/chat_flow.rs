//! Integration test: run the real server on a loopback port and chat through it
//! with raw WebSocket clients and with the client-side connection manager.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use farm_client::{ClientConfig, ConnectionManager, ConnectionState, WsConnector};
use farm_db::Database;
use farm_server::Services;
use farm_types::models::ChatMessage;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server() -> (SocketAddr, Services) {
    let db = Database::open_in_memory().unwrap();
    farm_db::seed::seed_demo_data(&db).unwrap();
    let services = Services::with_database(db);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = services.router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, services)
}

/// Open a chat socket and wait until the relay has registered it.
async fn join(addr: SocketAddr, services: &Services, identity: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/ws?userId={}", addr, identity))
        .await
        .unwrap();
    wait_online(services, identity).await;
    socket
}

async fn wait_online(services: &Services, identity: &str) {
    tokio::time::timeout(WAIT, async {
        while !services.registry().is_online(identity).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("identity never came online");
}

async fn send_json(socket: &mut Socket, frame: Value) {
    socket
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

/// Next text frame as JSON, skipping control frames.
async fn next_frame(socket: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn history(addr: SocketAddr, a: &str, b: &str) -> Vec<ChatMessage> {
    reqwest::get(format!("http://{}/api/chat/{}/{}", addr, a, b))
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap()
}

fn manager_for(addr: SocketAddr) -> ConnectionManager {
    let config = ClientConfig::new(format!("http://{}", addr));
    let connector = Arc::new(WsConnector::from_config(&config));
    ConnectionManager::new(config, connector)
}

fn chat(sender: &str, receiver: &str, message: &str) -> Value {
    json!({
        "type": "chat_message",
        "senderId": sender,
        "receiverId": receiver,
        "message": message,
    })
}

#[tokio::test]
async fn offline_receiver_gets_message_from_history() {
    let (addr, services) = start_server().await;
    let mut customer = join(addr, &services, "customer-1").await;

    send_json(&mut customer, chat("customer-1", "seller-1", "Hi")).await;

    let confirmation = next_frame(&mut customer).await;
    assert_eq!(confirmation["type"], "message_sent");
    assert_eq!(confirmation["data"]["senderId"], "customer-1");
    assert_eq!(confirmation["data"]["receiverId"], "seller-1");
    assert_eq!(confirmation["data"]["message"], "Hi");

    // Either participant order reads the same conversation
    for (a, b) in [("seller-1", "customer-1"), ("customer-1", "seller-1")] {
        let messages = history(addr, a, b).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, confirmation["data"]["id"].as_str().unwrap());
        assert_eq!(messages[0].message, "Hi");
    }
}

#[tokio::test]
async fn online_receiver_gets_message_forwarded() {
    let (addr, services) = start_server().await;
    let mut customer = join(addr, &services, "customer-1").await;
    let mut seller = join(addr, &services, "seller-1").await;

    send_json(&mut customer, chat("customer-1", "seller-1", "Is the honey raw?")).await;

    let confirmation = next_frame(&mut customer).await;
    assert_eq!(confirmation["type"], "message_sent");

    let forwarded = next_frame(&mut seller).await;
    assert_eq!(forwarded["type"], "chat_message");
    assert_eq!(forwarded["data"], confirmation["data"]);

    send_json(&mut seller, chat("seller-1", "customer-1", "Yes, unfiltered")).await;
    let reply = next_frame(&mut customer).await;
    assert_eq!(reply["type"], "chat_message");
    assert_eq!(reply["data"]["message"], "Yes, unfiltered");

    let messages = history(addr, "customer-1", "seller-1").await;
    let texts: Vec<&str> = messages.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(texts, ["Is the honey raw?", "Yes, unfiltered"]);
}

#[tokio::test]
async fn malformed_frame_is_answered_once_and_not_stored() {
    let (addr, services) = start_server().await;
    let mut customer = join(addr, &services, "customer-1").await;

    customer
        .send(Message::Text("{not json".into()))
        .await
        .unwrap();
    let error = next_frame(&mut customer).await;
    assert_eq!(error, json!({"type": "error", "message": "invalid message format"}));

    send_json(&mut customer, chat("seller-1", "customer-1", "spoofed")).await;
    let error = next_frame(&mut customer).await;
    assert_eq!(
        error,
        json!({"type": "error", "message": "sender does not match connection identity"})
    );

    // The socket stays usable and the next frame is the confirmation, not a second error
    send_json(&mut customer, chat("customer-1", "seller-1", "real")).await;
    assert_eq!(next_frame(&mut customer).await["type"], "message_sent");

    let messages = history(addr, "customer-1", "seller-1").await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message, "real");
}

#[tokio::test]
async fn socket_without_identity_is_refused() {
    let (addr, _services) = start_server().await;

    for url in [
        format!("ws://{}/ws", addr),
        format!("ws://{}/ws?userId=%20", addr),
    ] {
        match connect_async(url).await {
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 400);
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("handshake should have been refused"),
        }
    }
}

#[tokio::test]
async fn newer_socket_takes_over_forwarding() {
    let (addr, services) = start_server().await;
    let mut first = join(addr, &services, "seller-1").await;
    let (mut second, _) = connect_async(format!("ws://{}/ws?userId=seller-1", addr))
        .await
        .unwrap();
    let mut customer = join(addr, &services, "customer-1").await;

    // Wait until the second registration has replaced the first
    tokio::time::timeout(WAIT, async {
        loop {
            send_json(&mut customer, chat("customer-1", "seller-1", "ping")).await;
            assert_eq!(next_frame(&mut customer).await["type"], "message_sent");
            if let Ok(frame) =
                tokio::time::timeout(Duration::from_millis(100), next_frame(&mut second)).await
            {
                assert_eq!(frame["type"], "chat_message");
                break;
            }
        }
    })
    .await
    .expect("second socket never received a forward");

    // The superseded socket still gets its own confirmations
    send_json(&mut first, chat("seller-1", "customer-1", "from old tab")).await;
    loop {
        let frame = next_frame(&mut first).await;
        if frame["type"] == "message_sent" {
            assert_eq!(frame["data"]["message"], "from old tab");
            break;
        }
    }
}

#[tokio::test]
async fn connection_manager_round_trip() {
    let (addr, services) = start_server().await;
    let mut seller = join(addr, &services, "seller-1").await;

    let manager = manager_for(addr);
    let (received_tx, mut received_rx) = mpsc::unbounded_channel::<ChatMessage>();
    let _subscription = manager.on_message(move |msg| {
        let _ = received_tx.send(msg.clone());
    });

    manager.connect("customer-1");
    let mut states = manager.watch();
    tokio::time::timeout(WAIT, states.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();
    wait_online(&services, "customer-1").await;

    assert!(manager.send_message("seller-1", "Do you deliver to Kampala?"));
    let forwarded = next_frame(&mut seller).await;
    assert_eq!(forwarded["type"], "chat_message");
    assert_eq!(forwarded["data"]["senderId"], "customer-1");
    assert_eq!(forwarded["data"]["message"], "Do you deliver to Kampala?");

    send_json(&mut seller, chat("seller-1", "customer-1", "Every Friday")).await;
    let incoming = tokio::time::timeout(WAIT, received_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(incoming.sender_id, "seller-1");
    assert_eq!(incoming.message, "Every Friday");

    // Blank messages never reach the wire
    assert!(!manager.send_message("seller-1", "   "));

    manager.disconnect();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    tokio::time::timeout(WAIT, async {
        while services.registry().is_online("customer-1").await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("manager socket stayed registered after disconnect");

    let messages = history(addr, "seller-1", "customer-1").await;
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn padded_identity_is_kept_verbatim() {
    let (addr, services) = start_server().await;
    let mut seller = join(addr, &services, "seller-1").await;

    let manager = manager_for(addr);
    manager.connect(" customer-1");
    let mut states = manager.watch();
    tokio::time::timeout(WAIT, states.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();
    wait_online(&services, " customer-1").await;
    assert!(!services.registry().is_online("customer-1").await);

    assert!(manager.send_message("seller-1", "Any avocados left?"));
    let forwarded = next_frame(&mut seller).await;
    assert_eq!(forwarded["type"], "chat_message");
    assert_eq!(forwarded["data"]["senderId"], " customer-1");

    // Replies addressed to the exact identity reach the padded session
    let (received_tx, mut received_rx) = mpsc::unbounded_channel::<ChatMessage>();
    let _subscription = manager.on_message(move |msg| {
        let _ = received_tx.send(msg.clone());
    });
    send_json(&mut seller, chat("seller-1", " customer-1", "Two crates")).await;
    let incoming = tokio::time::timeout(WAIT, received_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(incoming.message, "Two crates");

    let messages = history(addr, "seller-1", "%20customer-1").await;
    assert_eq!(messages.len(), 2);
    assert!(history(addr, "seller-1", "customer-1").await.is_empty());
}
