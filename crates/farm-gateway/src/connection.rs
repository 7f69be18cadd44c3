use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use farm_types::events::ServerFrame;

use crate::relay::Relay;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Run one chat socket for `identity` until either side closes it.
///
/// The socket is registered as `identity`'s live connection for its whole
/// lifetime, unless a newer socket for the same identity takes over. A
/// superseded socket stays open for its own confirmations and errors.
pub async fn handle_connection(socket: WebSocket, relay: Relay, identity: String) {
    let (sender, mut receiver) = socket.split();

    let (conn_id, forward_rx) = relay.registry().register(&identity).await;
    info!("{} connected to relay (conn {})", identity, conn_id);

    // Replies to this socket's own frames, independent of registry ownership
    let (reply_tx, reply_rx) = mpsc::unbounded_channel::<ServerFrame>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_recv = pong_received.clone();

    let identity_send = identity.clone();
    let mut send_task = tokio::spawn(run_send_loop(
        sender,
        forward_rx,
        reply_rx,
        pong_received,
        identity_send,
    ));

    let relay_recv = relay.clone();
    let identity_recv = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    relay_recv.handle_text(&identity_recv, &reply_tx, text.as_str()).await;
                }
                Message::Binary(data) => {
                    relay_recv.reject_binary(&identity_recv, &reply_tx, data.len());
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if relay.registry().unregister(&identity, conn_id).await {
        info!("{} disconnected from relay", identity);
    } else {
        info!("{} closed superseded connection {}", identity, conn_id);
    }
}

async fn run_send_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut forward_rx: mpsc::UnboundedReceiver<ServerFrame>,
    mut reply_rx: mpsc::UnboundedReceiver<ServerFrame>,
    pong_received: Arc<AtomicBool>,
    identity: String,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;
    let mut forwarding = true;

    loop {
        let frame = tokio::select! {
            result = forward_rx.recv(), if forwarding => match result {
                Some(frame) => frame,
                None => {
                    debug!("{} superseded, no longer receiving forwards", identity);
                    forwarding = false;
                    continue;
                }
            },
            result = reply_rx.recv() => match result {
                Some(frame) => frame,
                None => break,
            },
            _ = heartbeat.tick() => {
                if pong_received.swap(false, Ordering::Acquire) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("{} heartbeat timeout (missed {} pongs), dropping connection", identity, missed_heartbeats);
                        break;
                    }
                }
                if sender.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode frame for {}: {}", identity, e);
                continue;
            }
        };
        if sender.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}
