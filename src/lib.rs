//!
//! Asynchronous client for Source engine game servers.
//!
//! The `steamq` crate queries a server over the connectionless A2S protocol (latency, server
//! metadata, player list) and runs console commands over authenticated RCON.

pub mod dns;
pub mod errors;
pub mod models;
pub use models::*;
pub mod net;
pub mod protocols;
pub mod server;
pub mod stats;
pub mod tcp;
pub mod udp;
pub mod util;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
pub use server::{ConnectOptions, Server, Timeouts};
