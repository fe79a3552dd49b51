//! Configuration types for chat servers and clients
//!
//! This module defines the configuration structures for the two process
//! roles, their protocol defaults, and the port parsing used by the
//! interactive console front-end.

use crate::error::ConfigError;
use crate::network::{DEFAULT_BIND_HOST, DEFAULT_CLIENT_HOST, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The role a chat process runs in
///
/// Chosen exactly once at startup; each role owns only the state and tasks
/// it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Connect to a running server and exchange lines with it
    Client,
    /// Accept client connections and fan operator lines out to all of them
    Server,
}

/// Configuration for a chat server
///
/// Instances are created via `ServerBuilder` and validated before use.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener on
    pub bind_host: String,

    /// Port to listen on
    ///
    /// Port 0 selects a random available port; resolve it with
    /// `Server::local_addr()` after start.
    pub port: u16,

    /// Capacity of each connection's outbound line queue
    ///
    /// A client whose queue fills has stalled and is dropped.
    pub outbound_queue: usize,

    /// How long a single write to one client may take before that client
    /// is considered dead
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            outbound_queue: 64,
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the bind host is empty, the queue
    /// capacity is zero, or the write timeout is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.bind_host.is_empty() {
            return Err(ConfigError::InvalidHost {
                reason: "bind host is empty".to_string(),
            }
            .into());
        }

        if self.outbound_queue == 0 {
            return Err(ConfigError::MissingRequiredField {
                field: "outbound_queue".to_string(),
            }
            .into());
        }

        if self.write_timeout.is_zero() {
            return Err(ConfigError::MissingRequiredField {
                field: "write_timeout".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Configuration for a chat client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host to connect to
    pub host: String,

    /// Port to connect to
    pub port: u16,

    /// Capacity of the outbound line queue
    pub outbound_queue: usize,

    /// How long a single write may take before the connection is
    /// considered dead
    pub write_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CLIENT_HOST.to_string(),
            port: DEFAULT_PORT,
            outbound_queue: 64,
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the host is empty, the port is zero, or
    /// the queue capacity is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.host.is_empty() {
            return Err(ConfigError::InvalidHost {
                reason: "host is empty".to_string(),
            }
            .into());
        }

        // Port 0 is valid for a listener, never for a connect target
        if self.port == 0 {
            return Err(ConfigError::InvalidPort {
                input: "0".to_string(),
            }
            .into());
        }

        if self.outbound_queue == 0 {
            return Err(ConfigError::MissingRequiredField {
                field: "outbound_queue".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Parse port text from the operator
///
/// Empty input selects the protocol default. Anything else must be a
/// decimal port number; malformed input is a fatal configuration error.
///
/// # Errors
///
/// Returns `ConfigError::InvalidPort` for non-numeric or out-of-range
/// input.
pub fn parse_port(input: &str) -> Result<u16, ConfigError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(DEFAULT_PORT);
    }

    trimmed.parse::<u16>().map_err(|_| ConfigError::InvalidPort {
        input: trimmed.to_string(),
    })
}
