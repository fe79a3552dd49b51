//! # wirechat
//!
//! A line-based TCP chat server and client.
//!
//! The wire protocol is newline-delimited UTF-8 text over one long-lived
//! TCP connection per client: no framing beyond the line terminator, no
//! authentication, no persistence. The server fans every operator line out
//! to all connected clients and surfaces client lines as events; the
//! client holds a single connection and does the same in miniature.
//!
//! ## Quick Start
//!
//! ```no_run
//! use wirechat::{Event, ServerBuilder};
//!
//! #[tokio::main]
//! async fn main() -> wirechat::Result<()> {
//!     let mut server = ServerBuilder::new().with_port(50007).build()?;
//!
//!     server.on_event(|event| {
//!         if let Event::MessageReceived { line, .. } = event {
//!             println!("CLIENT: {}", line);
//!         }
//!     });
//!
//!     server.start().await?;
//!     server.broadcast("welcome")?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod api;
pub mod error;
pub mod network;
pub mod protocol;

// Re-export main types
pub use api::{
    parse_port, Client, ClientBuilder, ClientConfig, ClientState, Event, EventHandlers, Role,
    Server, ServerBuilder, ServerConfig, ServerState, SubscriptionHandle,
};
pub use error::{ConfigError, Error, NetworkError, Result};
pub use network::{Connection, ConnectionRegistry, ConnectionState, DEFAULT_PORT};
