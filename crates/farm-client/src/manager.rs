use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use farm_types::events::{ClientFrame, ServerFrame};
use farm_types::models::ChatMessage;

use crate::config::ClientConfig;
use crate::transport::Connector;

/// Where the session's socket currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session, or the session was ended with `disconnect`.
    Disconnected,
    /// First open of a session in progress.
    Connecting,
    Connected,
    /// Waiting for, or performing, reconnect number `attempt` (1-based).
    Reconnecting { attempt: u32 },
    /// Reconnects exhausted. Stays here until `connect` is called again.
    GaveUp,
}

type Handler = Arc<dyn Fn(&ChatMessage) + Send + Sync>;

/// Keeps one chat socket open for the local identity and fans incoming
/// messages out to registered handlers.
///
/// Sends are fire-and-forget: while no socket is open they are dropped
/// with a log line, never queued.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    state_tx: watch::Sender<ConnectionState>,
    handlers: Mutex<HandlerSet>,
    session: Mutex<Option<Session>>,
    next_generation: AtomicU64,
}

#[derive(Default)]
struct HandlerSet {
    next_id: u64,
    entries: Vec<(u64, Handler)>,
}

struct Session {
    generation: u64,
    identity: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    /// Present only while a socket is open.
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

/// Handle for one `on_message` registration.
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Remove exactly this handler. Other registrations are untouched.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            lock(&inner.handlers).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl ConnectionManager {
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                state_tx,
                handlers: Mutex::new(HandlerSet::default()),
                session: Mutex::new(None),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Follow state transitions.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn identity(&self) -> Option<String> {
        lock(&self.inner.session).as_ref().map(|s| s.identity.clone())
    }

    /// Start a session for `identity`. A no-op while a socket for the same
    /// identity is open. Otherwise any previous session, including one
    /// waiting to reconnect, is replaced and a socket is opened at once with
    /// the attempt count reset. Must be called from within a tokio runtime.
    pub fn connect(&self, identity: &str) {
        let mut session = lock(&self.inner.session);

        match session.take() {
            Some(current) if current.identity == identity && current.outgoing.is_some() => {
                debug!("Already connected as {}", identity);
                *session = Some(current);
                return;
            }
            Some(previous) => {
                previous.cancel.cancel();
                info!("Ending session for {}", previous.identity);
            }
            None => {}
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        self.inner.state_tx.send_replace(ConnectionState::Connecting);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(
            self.inner.clone(),
            generation,
            identity.to_string(),
            cancel.clone(),
        ));
        *session = Some(Session {
            generation,
            identity: identity.to_string(),
            cancel,
            task,
            outgoing: None,
        });
    }

    /// End the session: close the socket, stop reconnecting, forget the
    /// identity and drop every handler.
    pub fn disconnect(&self) {
        let mut session = lock(&self.inner.session);
        if let Some(previous) = session.take() {
            previous.cancel.cancel();
            info!("Disconnected {}", previous.identity);
        }
        lock(&self.inner.handlers).entries.clear();
        self.inner.state_tx.send_replace(ConnectionState::Disconnected);
    }

    /// Send a chat message as the session's identity. Returns whether the
    /// frame was handed to an open socket. Blank messages are never sent.
    pub fn send_message(&self, receiver_id: &str, message: &str) -> bool {
        if message.trim().is_empty() {
            debug!("Ignoring empty message to {}", receiver_id);
            return false;
        }
        if receiver_id.trim().is_empty() {
            warn!("Dropping message without a receiver");
            return false;
        }

        let session = lock(&self.inner.session);
        let Some((identity, outgoing)) = session
            .as_ref()
            .and_then(|s| s.outgoing.as_ref().map(|tx| (&s.identity, tx)))
        else {
            warn!("Not connected, dropping message to {}", receiver_id);
            return false;
        };

        let frame = ClientFrame::ChatMessage {
            sender_id: identity.clone(),
            receiver_id: receiver_id.to_string(),
            message: message.to_string(),
        };
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode chat frame: {}", e);
                return false;
            }
        };
        if outgoing.send(text).is_err() {
            warn!("Socket closed, dropping message to {}", receiver_id);
            return false;
        }
        true
    }

    /// Register a handler for incoming chat messages. Handlers run in frame
    /// arrival order, on the session task.
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        let mut handlers = lock(&self.inner.handlers);
        let id = handlers.next_id;
        handlers.next_id += 1;
        handlers.entries.push((id, Arc::new(handler)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(session) = lock(&self.inner.session).take() {
            session.cancel.cancel();
        }
    }
}

impl Inner {
    /// Apply `f` to the session if it is still `generation`. A superseded
    /// session task must not touch its successor's state.
    fn with_session<F>(&self, generation: u64, f: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        let mut session = lock(&self.session);
        match session.as_mut() {
            Some(current) if current.generation == generation => {
                f(current);
                true
            }
            _ => false,
        }
    }

    fn publish(&self, generation: u64, state: ConnectionState) {
        self.with_session(generation, |_| {
            self.state_tx.send_replace(state);
        });
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(ServerFrame::ChatMessage { data }) => {
                let handlers: Vec<Handler> = lock(&self.handlers)
                    .entries
                    .iter()
                    .map(|(_, handler)| handler.clone())
                    .collect();
                for handler in handlers {
                    handler(&data);
                }
            }
            Ok(ServerFrame::MessageSent { data }) => {
                debug!("Message {} to {} stored", data.id, data.receiver_id);
            }
            Ok(ServerFrame::Error { message }) => {
                warn!("Relay rejected a frame: {}", message);
            }
            Err(e) => {
                error!("Dropping malformed frame: {}", e);
            }
        }
    }
}

async fn run_session(inner: Arc<Inner>, generation: u64, identity: String, cancel: CancellationToken) {
    let max_attempts = inner.config.max_reconnect_attempts;
    let mut attempt: u32 = 0;

    loop {
        if attempt == 0 {
            inner.publish(generation, ConnectionState::Connecting);
        }

        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = inner.connector.open(&identity) => opened,
        };

        match opened {
            Ok(channel) => {
                attempt = 0;
                let outgoing = channel.outgoing;
                let registered = inner.with_session(generation, |session| {
                    session.outgoing = Some(outgoing);
                    inner.state_tx.send_replace(ConnectionState::Connected);
                });
                if !registered {
                    return;
                }
                info!("Connected as {}", identity);

                let mut incoming = channel.incoming;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        frame = incoming.recv() => match frame {
                            Some(text) => inner.dispatch(&text),
                            None => break,
                        },
                    }
                }

                inner.with_session(generation, |session| session.outgoing = None);
                warn!("Connection for {} closed", identity);
            }
            Err(e) => {
                warn!("Failed to connect as {}: {:#}", identity, e);
            }
        }

        if attempt >= max_attempts {
            warn!("Giving up on {} after {} reconnect attempts", identity, attempt);
            inner.publish(generation, ConnectionState::GaveUp);
            return;
        }

        attempt += 1;
        inner.publish(generation, ConnectionState::Reconnecting { attempt });
        debug!(
            "Reconnecting {} in {:?} (attempt {}/{})",
            identity, inner.config.reconnect_interval, attempt, max_attempts
        );
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(inner.config.reconnect_interval) => {}
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use anyhow::anyhow;
    use chrono::Utc;
    use futures_util::future::BoxFuture;
    use tokio::time::Instant;

    use super::*;
    use crate::transport::Channel;

    /// The relay's end of a fake socket.
    struct FakePeer {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    #[derive(Default)]
    struct FakeConnector {
        /// Opens left to refuse before accepting.
        failures: AtomicU32,
        opens: Mutex<Vec<(String, Instant)>>,
        peers: Mutex<Option<mpsc::UnboundedSender<FakePeer>>>,
    }

    impl FakeConnector {
        fn failing() -> Arc<Self> {
            let connector = Self::default();
            connector.failures.store(u32::MAX, Ordering::SeqCst);
            Arc::new(connector)
        }

        fn accepting() -> (Arc<Self>, mpsc::UnboundedReceiver<FakePeer>) {
            Self::accepting_after(0)
        }

        fn accepting_after(failures: u32) -> (Arc<Self>, mpsc::UnboundedReceiver<FakePeer>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let connector = Self::default();
            connector.failures.store(failures, Ordering::SeqCst);
            *connector.peers.lock().unwrap() = Some(tx);
            (Arc::new(connector), rx)
        }

        fn opens(&self) -> Vec<(String, Instant)> {
            self.opens.lock().unwrap().clone()
        }
    }

    impl Connector for FakeConnector {
        fn open(&self, identity: &str) -> BoxFuture<'static, anyhow::Result<Channel>> {
            self.opens.lock().unwrap().push((identity.to_string(), Instant::now()));
            let refused = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if refused {
                return Box::pin(async { Err(anyhow!("connection refused")) });
            }

            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            if let Some(peers) = self.peers.lock().unwrap().as_ref() {
                let _ = peers.send(FakePeer {
                    to_client: in_tx,
                    from_client: out_rx,
                });
            }
            Box::pin(async move {
                Ok(Channel {
                    outgoing: out_tx,
                    incoming: in_rx,
                })
            })
        }
    }

    fn assert_elapsed(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(10),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    fn manager(connector: Arc<FakeConnector>) -> ConnectionManager {
        ConnectionManager::new(ClientConfig::default(), connector)
    }

    async fn wait_for(manager: &ConnectionManager, state: ConnectionState) {
        manager
            .watch()
            .wait_for(|current| *current == state)
            .await
            .unwrap();
    }

    fn chat_frame(sender: &str, receiver: &str, text: &str) -> String {
        serde_json::to_string(&ServerFrame::ChatMessage {
            data: ChatMessage {
                id: format!("msg-{}", text.len()),
                sender_id: sender.into(),
                receiver_id: receiver.into(),
                message: text.into(),
                created_at: Utc::now(),
            },
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_five_retries() {
        let connector = FakeConnector::failing();
        let manager = manager(connector.clone());
        let start = Instant::now();

        manager.connect("customer-1");
        wait_for(&manager, ConnectionState::GaveUp).await;

        let opens = connector.opens();
        assert_eq!(opens.len(), 6);
        assert_elapsed(opens[5].1 - start, Duration::from_secs(25));

        // No further attempts once given up
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.opens().len(), 6);
        assert_eq!(manager.state(), ConnectionState::GaveUp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_spaced_by_interval() {
        let connector = FakeConnector::failing();
        let manager = manager(connector.clone());
        let mut states = manager.watch();

        manager.connect("customer-1");
        states
            .wait_for(|s| *s == ConnectionState::Reconnecting { attempt: 3 })
            .await
            .unwrap();
        wait_for(&manager, ConnectionState::GaveUp).await;

        let opens = connector.opens();
        for pair in opens.windows(2) {
            assert_elapsed(pair[1].1 - pair[0].1, Duration::from_millis(5000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_again_after_giving_up() {
        let connector = FakeConnector::failing();
        let manager = manager(connector.clone());

        manager.connect("customer-1");
        wait_for(&manager, ConnectionState::GaveUp).await;
        manager.connect("customer-1");
        wait_for(&manager, ConnectionState::GaveUp).await;
        assert_eq!(connector.opens().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_produces_one_frame_and_blank_produces_none() {
        let (connector, mut peers) = FakeConnector::accepting();
        let manager = manager(connector);

        manager.connect("customer-1");
        let mut peer = peers.recv().await.unwrap();
        wait_for(&manager, ConnectionState::Connected).await;

        assert!(!manager.send_message("seller-1", "   "));
        assert!(!manager.send_message("seller-1", ""));
        assert!(peer.from_client.try_recv().is_err());

        assert!(manager.send_message("seller-1", "Do you deliver to Entebbe?"));
        let sent: ClientFrame = serde_json::from_str(&peer.from_client.recv().await.unwrap()).unwrap();
        assert_eq!(
            sent,
            ClientFrame::ChatMessage {
                sender_id: "customer-1".into(),
                receiver_id: "seller-1".into(),
                message: "Do you deliver to Entebbe?".into(),
            }
        );
        assert!(peer.from_client.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_disconnected_is_dropped() {
        let connector = FakeConnector::failing();
        let manager = manager(connector);
        assert!(!manager.send_message("seller-1", "Hello"));

        manager.connect("customer-1");
        assert!(!manager.send_message("seller-1", "Hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handlers_get_chat_messages_only() {
        let (connector, mut peers) = FakeConnector::accepting();
        let manager = manager(connector);
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        manager.on_message(move |msg| {
            let _ = seen_tx.send(msg.message.clone());
        });

        manager.connect("seller-1");
        let peer = peers.recv().await.unwrap();

        peer.to_client.send("not json".into()).unwrap();
        peer.to_client.send(r#"{"type":"presence","online":true}"#.into()).unwrap();
        peer.to_client
            .send(serde_json::to_string(&ServerFrame::error("invalid message format")).unwrap())
            .unwrap();
        peer.to_client.send(chat_frame("customer-1", "seller-1", "Is the milk fresh?")).unwrap();
        peer.to_client.send(chat_frame("customer-1", "seller-1", "And the posho?")).unwrap();

        assert_eq!(seen.recv().await.unwrap(), "Is the milk fresh?");
        assert_eq!(seen.recv().await.unwrap(), "And the posho?");
        assert!(seen.try_recv().is_err());
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_removes_only_that_handler() {
        let (connector, mut peers) = FakeConnector::accepting();
        let manager = manager(connector);
        let (first_tx, mut first) = mpsc::unbounded_channel();
        let (second_tx, mut second) = mpsc::unbounded_channel();
        let subscription = manager.on_message(move |msg| {
            let _ = first_tx.send(msg.id.clone());
        });
        manager.on_message(move |msg| {
            let _ = second_tx.send(msg.id.clone());
        });

        subscription.unsubscribe();
        manager.connect("seller-1");
        let peer = peers.recv().await.unwrap();
        peer.to_client.send(chat_frame("customer-1", "seller-1", "Hi")).unwrap();

        assert!(second.recv().await.is_some());
        assert!(first.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_close_and_resets_count() {
        let (connector, mut peers) = FakeConnector::accepting();
        let manager = manager(connector.clone());

        manager.connect("customer-1");
        let peer = peers.recv().await.unwrap();
        wait_for(&manager, ConnectionState::Connected).await;

        // Relay side goes away
        drop(peer);
        wait_for(&manager, ConnectionState::Reconnecting { attempt: 1 }).await;
        let _peer = peers.recv().await.unwrap();
        wait_for(&manager, ConnectionState::Connected).await;

        let opens = connector.opens();
        assert_eq!(opens.len(), 2);
        assert_elapsed(opens[1].1 - opens[0].1, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent_per_identity() {
        let (connector, mut peers) = FakeConnector::accepting();
        let manager = manager(connector.clone());

        manager.connect("customer-1");
        let mut first = peers.recv().await.unwrap();
        wait_for(&manager, ConnectionState::Connected).await;
        manager.connect("customer-1");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(connector.opens().len(), 1);

        // A different identity replaces the session and closes the old socket
        manager.connect("seller-1");
        let _second = peers.recv().await.unwrap();
        assert_eq!(first.from_client.recv().await, None);
        assert_eq!(manager.identity().as_deref(), Some("seller-1"));
        let identities: Vec<_> = connector.opens().into_iter().map(|(id, _)| id).collect();
        assert_eq!(identities, vec!["customer-1", "seller-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_during_reconnect_wait_opens_at_once() {
        let (connector, mut peers) = FakeConnector::accepting_after(1);
        let manager = manager(connector.clone());

        manager.connect("customer-1");
        wait_for(&manager, ConnectionState::Reconnecting { attempt: 1 }).await;

        manager.connect("customer-1");
        let _peer = peers.recv().await.unwrap();
        wait_for(&manager, ConnectionState::Connected).await;

        let opens = connector.opens();
        assert_eq!(opens.len(), 2);
        assert_elapsed(opens[1].1 - opens[0].1, Duration::ZERO);

        // The pending retry of the replaced session never fires
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.opens().len(), 2);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_everything() {
        let (connector, mut peers) = FakeConnector::accepting();
        let manager = manager(connector.clone());
        let (seen_tx, mut seen) = mpsc::unbounded_channel::<String>();
        manager.on_message(move |msg| {
            let _ = seen_tx.send(msg.message.clone());
        });

        manager.connect("customer-1");
        let mut peer = peers.recv().await.unwrap();
        wait_for(&manager, ConnectionState::Connected).await;

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.identity(), None);
        assert_eq!(peer.from_client.recv().await, None);
        assert!(!manager.send_message("seller-1", "Hello"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.opens().len(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        // Handlers were cleared along with the session
        assert!(seen.recv().await.is_none());
    }
}
