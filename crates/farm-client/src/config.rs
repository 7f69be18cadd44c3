use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base address of the relay; `http(s)` is accepted and mapped to `ws(s)`.
    pub server_url: String,
    /// Fixed wait before every reconnect attempt.
    pub reconnect_interval: Duration,
    /// Consecutive failed reconnects before giving up.
    pub max_reconnect_attempts: u32,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            reconnect_interval: Duration::from_millis(5000),
            max_reconnect_attempts: 5,
        }
    }
}
