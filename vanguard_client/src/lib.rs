//! Game client: join handshake, input submission, snapshot receipt.

pub mod client;

pub use client::GameClient;
