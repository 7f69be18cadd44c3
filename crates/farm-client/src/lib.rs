//! Client side of the chat relay: one live socket per local session, with a
//! bounded fixed-interval reconnect loop.

pub mod config;
pub mod manager;
pub mod transport;

pub use config::ClientConfig;
pub use manager::{ConnectionManager, ConnectionState, Subscription};
pub use transport::{Channel, Connector, WsConnector};
