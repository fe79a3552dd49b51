//! Network module
//!
//! Plain-TCP transport for wirechat: per-connection handles with their
//! outbound queues, line framing helpers, and the registry of live
//! connections the server broadcasts to.

mod connection;
mod registry;

pub use connection::{drain_outbound, read_trimmed_line, write_line, Connection, ConnectionState};
pub use registry::ConnectionRegistry;

/// Default TCP port for the chat protocol
pub const DEFAULT_PORT: u16 = 50007;

/// Default host a client connects to
pub const DEFAULT_CLIENT_HOST: &str = "127.0.0.1";

/// Default address the server listens on (all interfaces)
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
