//! Authoritative game server.
//!
//! The core (`server`, `connection`) is single-threaded cooperative; only
//! the transport edge (`host`, `bridge`) touches the async runtime.

pub mod bridge;
pub mod connection;
pub mod host;
pub mod server;
