//! Wire format for chat messages
//!
//! The protocol is plain UTF-8 text, one message per line, terminated by a
//! line feed. There is no length prefix and no encoding negotiation; a
//! trailing carriage return is tolerated on inbound lines for peers that
//! send `\r\n`.

/// Line terminator appended to every outbound message
pub const LINE_TERMINATOR: u8 = b'\n';

/// Maximum inbound line size in bytes (64 KB)
/// Bounds the memory a peer can pin with a single unterminated line
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Console prefix for lines received from a client
pub const CLIENT_PREFIX: &str = "CLIENT: ";

/// Console prefix for lines received from the server
pub const SERVER_PREFIX: &str = "SERVER: ";

/// Strip the line terminator (and an optional preceding carriage return)
/// from a raw inbound line.
pub fn trim_line_ending(raw: &str) -> &str {
    raw.strip_suffix('\n')
        .map(|s| s.strip_suffix('\r').unwrap_or(s))
        .unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_line_ending_lf() {
        assert_eq!(trim_line_ending("hello\n"), "hello");
    }

    #[test]
    fn test_trim_line_ending_crlf() {
        assert_eq!(trim_line_ending("hello\r\n"), "hello");
    }

    #[test]
    fn test_trim_line_ending_bare() {
        assert_eq!(trim_line_ending("hello"), "hello");
    }

    #[test]
    fn test_trim_line_ending_keeps_interior_cr() {
        assert_eq!(trim_line_ending("he\rllo\n"), "he\rllo");
    }

    #[test]
    fn test_trim_line_ending_empty() {
        assert_eq!(trim_line_ending("\n"), "");
        assert_eq!(trim_line_ending(""), "");
    }
}
