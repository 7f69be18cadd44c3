use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use farm_types::events::ServerFrame;

type Entry = (Uuid, mpsc::UnboundedSender<ServerFrame>);

/// Live connections: identity -> the one socket currently allowed to receive
/// forwarded frames for it.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    /// identity -> (conn_id, sender)
    connections: RwLock<HashMap<String, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `identity`, replacing any previous one.
    /// Returns (conn_id, receiver). The replaced connection's receiver yields
    /// `None` from then on.
    pub async fn register(&self, identity: &str) -> (Uuid, mpsc::UnboundedReceiver<ServerFrame>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .inner
            .connections
            .write()
            .await
            .insert(identity.to_string(), (conn_id, tx));
        if let Some((old_conn_id, _)) = previous {
            tracing::debug!("{} reconnected, superseding connection {}", identity, old_conn_id);
        }
        (conn_id, rx)
    }

    /// Remove the entry for `identity`, but only if `conn_id` still owns it.
    pub async fn unregister(&self, identity: &str, conn_id: Uuid) -> bool {
        let mut connections = self.inner.connections.write().await;
        match connections.get(identity) {
            Some((stored, _)) if *stored == conn_id => {
                connections.remove(identity);
                true
            }
            _ => false,
        }
    }

    /// Push a frame to the live connection for `identity`. Returns whether a
    /// connection was registered and still accepting frames.
    pub async fn forward(&self, identity: &str, frame: ServerFrame) -> bool {
        let connections = self.inner.connections.read().await;
        match connections.get(identity) {
            Some((_, tx)) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    pub async fn is_online(&self, identity: &str) -> bool {
        self.inner
            .connections
            .read()
            .await
            .get(identity)
            .is_some_and(|(_, tx)| !tx.is_closed())
    }

    pub async fn online_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    /// Drop every entry. Used at shutdown.
    pub async fn clear(&self) {
        let mut connections = self.inner.connections.write().await;
        let count = connections.len();
        connections.clear();
        tracing::info!("Registry cleared ({} connections)", count);
    }
}
