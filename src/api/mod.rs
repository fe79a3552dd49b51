//! High-level API for wirechat
//!
//! This module provides the public-facing API: the server and client entry
//! types, their configuration, and the event system front-ends subscribe
//! to.

pub mod client;
pub mod config;
pub mod events;
pub mod server;

// Re-export main types for convenience
pub use client::{Client, ClientBuilder, ClientState};
pub use config::{parse_port, ClientConfig, Role, ServerConfig};
pub use events::{Event, EventHandlers, SubscriptionHandle};
pub use server::{Server, ServerBuilder, ServerState};
