//! Types shared between the marketplace server, the chat relay and clients.

pub mod api;
pub mod events;
pub mod models;
