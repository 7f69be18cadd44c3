use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use farm_db::Database;
use farm_types::events::{ClientFrame, INVALID_MESSAGE_FORMAT, SENDER_MISMATCH, STORE_FAILED, ServerFrame};
use farm_types::models::ChatMessage;

use crate::registry::Registry;

/// What became of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The frame was answered with this error text and nothing was stored.
    Rejected(&'static str),
    /// The chat log refused the write; the sender got an error frame.
    Failed,
    /// The message is in the log. `delivered` says whether the receiver had a
    /// live connection at forward time.
    Stored { record: ChatMessage, delivered: bool },
}

/// Persists chat messages and forwards them to live receivers.
#[derive(Clone)]
pub struct Relay {
    db: Arc<Database>,
    registry: Registry,
}

impl Relay {
    pub fn new(db: Arc<Database>, registry: Registry) -> Self {
        Self { db, registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handle one text frame from `identity`'s socket. Every response for the
    /// sender (confirmation or error) goes through `reply`.
    pub async fn handle_text(
        &self,
        identity: &str,
        reply: &mpsc::UnboundedSender<ServerFrame>,
        text: &str,
    ) -> Outcome {
        match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => self.handle_frame(identity, reply, frame).await,
            Err(e) => {
                warn!(
                    "{} bad frame: {} -- raw: {}",
                    identity,
                    e,
                    truncate(text, 200)
                );
                reject(reply, INVALID_MESSAGE_FORMAT)
            }
        }
    }

    pub async fn handle_frame(
        &self,
        identity: &str,
        reply: &mpsc::UnboundedSender<ServerFrame>,
        frame: ClientFrame,
    ) -> Outcome {
        match frame {
            ClientFrame::ChatMessage {
                sender_id,
                receiver_id,
                message,
            } => {
                if receiver_id.trim().is_empty() || message.trim().is_empty() {
                    warn!("{} sent an empty message or receiver", identity);
                    return reject(reply, INVALID_MESSAGE_FORMAT);
                }
                if sender_id != identity {
                    warn!("{} tried to send as {}", identity, sender_id);
                    return reject(reply, SENDER_MISMATCH);
                }

                // Persist first. The write runs to completion even if this
                // connection goes away while it is in flight.
                let db = self.db.clone();
                let stored = tokio::task::spawn_blocking(move || {
                    db.create_chat_message(&sender_id, &receiver_id, &message)
                })
                .await;

                let record = match stored {
                    Ok(Ok(record)) => record,
                    Ok(Err(e)) => {
                        error!("Failed to store message from {}: {}", identity, e);
                        let _ = reply.send(ServerFrame::error(STORE_FAILED));
                        return Outcome::Failed;
                    }
                    Err(e) => {
                        error!("Store task for {} panicked: {}", identity, e);
                        let _ = reply.send(ServerFrame::error(STORE_FAILED));
                        return Outcome::Failed;
                    }
                };

                let delivered = self
                    .registry
                    .forward(
                        &record.receiver_id,
                        ServerFrame::ChatMessage {
                            data: record.clone(),
                        },
                    )
                    .await;
                debug!(
                    "{} -> {} stored as {} (delivered: {})",
                    identity, record.receiver_id, record.id, delivered
                );

                let _ = reply.send(ServerFrame::MessageSent {
                    data: record.clone(),
                });

                Outcome::Stored { record, delivered }
            }
        }
    }

    /// Binary frames carry nothing this relay understands.
    pub fn reject_binary(&self, identity: &str, reply: &mpsc::UnboundedSender<ServerFrame>, len: usize) -> Outcome {
        warn!("{} sent a binary frame ({} bytes)", identity, len);
        reject(reply, INVALID_MESSAGE_FORMAT)
    }
}

fn reject(reply: &mpsc::UnboundedSender<ServerFrame>, message: &'static str) -> Outcome {
    let _ = reply.send(ServerFrame::error(message));
    Outcome::Rejected(message)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
