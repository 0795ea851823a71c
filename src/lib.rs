//! Async client for the Network UPS Tools (NUT) network protocol.
//!
//! The client keeps one TCP connection to `upsd`, sends commands over it one
//! at a time, and transparently reconnects when the connection is lost.
//!
//! * `protocol`: tokenizer, request encoding and reply parsing.
//! * `connection`: one socket plus its line buffer.
//! * `client`: the reconnecting [`Client`] handle.
//! * `monitor`: power lost / restored notifications built on the client.
//!
//! ```no_run
//! use nut_client::{Client, Config};
//!
//! # async fn demo() -> nut_client::Result<()> {
//! let client = Client::new(Config::new().with_addr("nas.local:3493"));
//! let status = client.get(["VAR", "ups", "ups.status"]).await?;
//! println!("status = {}", status);
//! client.close().await;
//! # Ok(()) }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod monitor;
pub mod protocol;

pub use client::Client;
pub use config::{Config, Endpoint};
pub use connection::Connection;
pub use error::{Error, ProtocolError, Result};
pub use monitor::{Monitor, MonitorConfig};
