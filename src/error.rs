//! Error types for wirechat

use thiserror::Error;

/// Network and transport errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Failed to bind the server listener
    #[error("Failed to bind {address}: {reason}")]
    BindFailed {
        /// Address the listener tried to bind
        address: String,
        /// Underlying cause
        reason: String,
    },

    /// Failed to establish an outbound connection
    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed {
        /// Address the client tried to reach
        address: String,
        /// Underlying cause
        reason: String,
    },

    /// A write to a peer failed
    #[error("Send to {peer} failed: {reason}")]
    SendFailed {
        /// Remote address of the peer
        peer: String,
        /// Underlying cause
        reason: String,
    },

    /// A write to a peer did not complete within the configured timeout
    #[error("Write to {peer} timed out after {timeout_ms} ms")]
    WriteTimeout {
        /// Remote address of the peer
        peer: String,
        /// Timeout that elapsed, in milliseconds
        timeout_ms: u64,
    },

    /// The connection is no longer writable
    #[error("Connection to {peer} is closed")]
    ConnectionClosed {
        /// Remote address of the peer
        peer: String,
    },

    /// The peer closed the connection mid-read
    #[error("Connection reset by peer")]
    ConnectionReset,

    /// An inbound line exceeded the per-line sanity cap
    #[error("Line too long: {size} bytes (max: {max} bytes)")]
    LineTooLong {
        /// Bytes buffered before giving up
        size: usize,
        /// The configured cap
        max: usize,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Port text did not parse as a number in range
    #[error("Invalid port number: {input}")]
    InvalidPort {
        /// The offending input
        input: String,
    },

    /// Host value was rejected
    #[error("Invalid host: {reason}")]
    InvalidHost {
        /// Why the host was rejected
        reason: String,
    },

    /// A required configuration field was missing or zero
    #[error("Missing required field: {field}")]
    MissingRequiredField {
        /// Name of the field
        field: String,
    },
}

/// Main error type for wirechat operations
#[derive(Error, Debug)]
pub enum Error {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Operation attempted in the wrong lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_display() {
        let err = NetworkError::ConnectFailed {
            address: "127.0.0.1:50007".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to connect to 127.0.0.1:50007: connection refused"
        );
    }

    #[test]
    fn test_config_error_wraps_into_error() {
        let err: Error = ConfigError::InvalidPort {
            input: "fifty".to_string(),
        }
        .into();
        assert!(err.to_string().contains("Invalid port number: fifty"));
    }

    #[test]
    fn test_io_error_wraps_into_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
