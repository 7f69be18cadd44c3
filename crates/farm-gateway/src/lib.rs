//! Chat relay: the live connection registry, inbound frame handling and the
//! per-socket connection loop.

pub mod connection;
pub mod registry;
pub mod relay;

pub use registry::Registry;
pub use relay::{Outcome, Relay};
