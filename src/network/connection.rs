//! Connection handles and line framing
//!
//! Each accepted or established TCP connection is represented by a
//! `Connection` handle: the peer address, a bounded queue of outbound lines,
//! and transfer counters. The socket halves themselves are owned by the
//! reader and writer tasks; the handle is what the registry stores and the
//! broadcaster writes through.

use crate::error::{NetworkError, Result};
use crate::protocol::{LINE_TERMINATOR, MAX_LINE_BYTES};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// State of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is being established
    Connecting,
    /// Connection is active and can send/receive
    Connected,
    /// Connection is in the process of closing
    Closing,
    /// Connection is closed
    Closed,
}

/// Handle to one live chat connection
pub struct Connection {
    /// Remote peer address; identifies the connection in the registry
    peer_addr: SocketAddr,
    /// Bounded queue of lines awaiting delivery by the writer task
    ///
    /// Dropped on close so the writer task's receiver drains and ends.
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    /// Current connection state
    state: Mutex<ConnectionState>,
    /// When this connection was established
    connected_at: Instant,
    /// Total lines delivered to the peer
    lines_sent: AtomicU64,
    /// Total lines received from the peer
    lines_received: AtomicU64,
}

impl Connection {
    /// Create a handle for an established connection
    ///
    /// # Arguments
    ///
    /// * `peer_addr` - Remote address of the peer
    /// * `outbound` - Sender half of the connection's outbound line queue
    pub fn new(peer_addr: SocketAddr, outbound: mpsc::Sender<String>) -> Self {
        Self {
            peer_addr,
            outbound: Mutex::new(Some(outbound)),
            state: Mutex::new(ConnectionState::Connected),
            connected_at: Instant::now(),
            lines_sent: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
        }
    }

    /// Queue a line for delivery to the peer
    ///
    /// Never blocks: the line either enters the bounded outbound queue or
    /// the connection is reported failed. A full queue means the peer has
    /// stalled and is treated the same as a dead socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or its queue is full.
    pub fn enqueue(&self, line: &str) -> Result<()> {
        let guard = self.outbound.lock();
        let sender = guard.as_ref().ok_or_else(|| NetworkError::ConnectionClosed {
            peer: self.peer_addr.to_string(),
        })?;

        sender.try_send(line.to_string()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NetworkError::SendFailed {
                peer: self.peer_addr.to_string(),
                reason: "outbound queue full".to_string(),
            },
            mpsc::error::TrySendError::Closed(_) => NetworkError::ConnectionClosed {
                peer: self.peer_addr.to_string(),
            },
        })?;

        Ok(())
    }

    /// Get the remote peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Mark the connection closed and drop its outbound queue
    ///
    /// Called by whichever task observes the connection's death. Dropping
    /// the sender lets the writer task deliver what is already queued and
    /// then end. Returns whether this call performed the transition, so
    /// racing observers can tell which of them gets to report the close.
    pub fn mark_closed(&self) -> bool {
        let mut state = self.state.lock();
        let transitioned = *state != ConnectionState::Closed;
        *state = ConnectionState::Closed;
        drop(state);
        self.outbound.lock().take();
        transitioned
    }

    /// Record one line delivered to the peer
    pub(crate) fn record_sent(&self) {
        self.lines_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one line received from the peer
    pub(crate) fn record_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Total lines delivered to the peer
    pub fn lines_sent(&self) -> u64 {
        self.lines_sent.load(Ordering::Relaxed)
    }

    /// Total lines received from the peer
    pub fn lines_received(&self) -> u64 {
        self.lines_received.load(Ordering::Relaxed)
    }

    /// Connection age
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Read one line from the stream, without its terminator
///
/// Returns `Ok(None)` on a clean EOF at a line boundary. A peer that closes
/// mid-line gets its final unterminated text surfaced first; the next call
/// reports EOF. A trailing carriage return is stripped, and non-UTF-8 bytes
/// are replaced rather than treated as an error.
///
/// # Errors
///
/// Returns an error on I/O failure or when a line exceeds `MAX_LINE_BYTES`
/// without a terminator.
pub async fn read_trimmed_line<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw: Vec<u8> = Vec::new();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            // EOF
            if raw.is_empty() {
                return Ok(None);
            }
            break;
        }

        if let Some(pos) = available.iter().position(|&b| b == LINE_TERMINATOR) {
            raw.extend_from_slice(&available[..pos]);
            reader.consume(pos + 1);
            break;
        }

        raw.extend_from_slice(available);
        let consumed = available.len();
        reader.consume(consumed);

        if raw.len() > MAX_LINE_BYTES {
            return Err(NetworkError::LineTooLong {
                size: raw.len(),
                max: MAX_LINE_BYTES,
            }
            .into());
        }
    }

    if raw.last() == Some(&b'\r') {
        raw.pop();
    }

    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}

/// Write one line to the stream, terminator appended, and flush
///
/// Flushing per line is required by the protocol: without it a buffered
/// writer can sit on a message indefinitely.
pub async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(&[LINE_TERMINATOR]).await?;
    writer.flush().await
}

/// Drain a connection's outbound queue into its socket write half
///
/// Runs until the queue is closed (deregistration or shutdown) or a write
/// fails or times out. Each delivered line is counted on the connection
/// handle.
///
/// # Errors
///
/// Returns an error naming the peer when a write fails or exceeds
/// `write_timeout`; the caller deregisters the connection in response.
pub async fn drain_outbound<W>(
    conn: &Connection,
    writer: &mut W,
    rx: &mut mpsc::Receiver<String>,
    write_timeout: Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        match tokio::time::timeout(write_timeout, write_line(writer, &line)).await {
            Ok(Ok(())) => conn.record_sent(),
            Ok(Err(e)) => {
                return Err(NetworkError::SendFailed {
                    peer: conn.peer_addr().to_string(),
                    reason: e.to_string(),
                }
                .into());
            },
            Err(_) => {
                return Err(NetworkError::WriteTimeout {
                    peer: conn.peer_addr().to_string(),
                    timeout_ms: write_timeout.as_millis() as u64,
                }
                .into());
            },
        }
    }

    Ok(())
}
