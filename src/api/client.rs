//! Chat client - one persistent connection to a running server
//!
//! This module provides the `Client` and `ClientBuilder` types. A
//! connected client owns a reader task (surfacing server lines as events)
//! and a writer task (draining the outbound queue), mirroring the two
//! independent loops of the console protocol.

use crate::api::config::ClientConfig;
use crate::api::events::{Event, EventHandlers, SubscriptionHandle};
use crate::error::{Error, NetworkError, Result};
use crate::network::{drain_outbound, read_trimmed_line, Connection};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Connection state of a client
///
/// `Closed` is terminal: there is no reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Client has been created but not connected
    Disconnected,
    /// Connection is being established
    Connecting,
    /// Connected; lines flow in both directions
    Connected,
    /// Connection ended by I/O error, EOF, or `stop()`
    Closed,
}

/// Builder for creating `Client` instances
///
/// # Examples
///
/// ```no_run
/// use wirechat::ClientBuilder;
///
/// # async fn example() -> wirechat::Result<()> {
/// let mut client = ClientBuilder::new()
///     .with_host("127.0.0.1")
///     .with_port(50007)
///     .build()?;
///
/// client.connect().await?;
/// client.send("hi")?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a new ClientBuilder with default settings
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Set the host to connect to
    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the port to connect to
    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the capacity of the outbound line queue
    pub fn with_outbound_queue(mut self, capacity: usize) -> Self {
        self.config.outbound_queue = capacity;
        self
    }

    /// Set the per-write timeout after which the connection is considered
    /// dead
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Build the Client instance
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;

        let (shutdown, _) = watch::channel(false);

        Ok(Client {
            config: self.config,
            event_handlers: EventHandlers::new(),
            state: Arc::new(RwLock::new(ClientState::Disconnected)),
            shutdown,
            conn: RwLock::new(None),
            server_addr: RwLock::new(None),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A chat client holding one persistent connection to a server
///
/// Dies with an error if the server is not present at connect time; once
/// the connection ends, for any reason, the client is `Closed` for good.
pub struct Client {
    /// Immutable configuration
    config: ClientConfig,
    /// Event handler registry
    event_handlers: EventHandlers,
    /// Current connection state
    state: Arc<RwLock<ClientState>>,
    /// Shutdown signal raced against the blocking read
    shutdown: watch::Sender<bool>,
    /// Handle to the server connection, once established
    conn: RwLock<Option<Arc<Connection>>>,
    /// Resolved server address, once connected
    server_addr: RwLock<Option<SocketAddr>>,
}

impl Client {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect to the configured server
    ///
    /// Spawns the reader and writer tasks and transitions to `Connected`.
    /// Connection failure is fatal to the client: the error is returned
    /// and the client stays `Disconnected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has already connected, or if the
    /// connection cannot be established.
    pub async fn connect(&mut self) -> Result<()> {
        {
            let state = self.state.read();
            if *state != ClientState::Disconnected {
                return Err(Error::InvalidState(
                    "client must be in Disconnected state to connect".to_string(),
                ));
            }
        }

        *self.state.write() = ClientState::Connecting;

        let address = format!("{}:{}", self.config.host, self.config.port);
        let stream = match TcpStream::connect(&address).await {
            Ok(stream) => stream,
            Err(e) => {
                *self.state.write() = ClientState::Disconnected;
                return Err(NetworkError::ConnectFailed {
                    address,
                    reason: e.to_string(),
                }
                .into());
            },
        };

        let server_addr = stream.peer_addr()?;
        info!("Client connected to ({})", server_addr);

        let (read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::channel(self.config.outbound_queue);
        let conn = Arc::new(Connection::new(server_addr, tx));

        *self.conn.write() = Some(Arc::clone(&conn));
        *self.server_addr.write() = Some(server_addr);

        // Writer: drains typed lines into the socket, flushing each one.
        let writer_conn = Arc::clone(&conn);
        let writer_events = self.event_handlers.clone();
        let writer_state = Arc::clone(&self.state);
        let write_timeout = self.config.write_timeout;
        tokio::spawn(async move {
            if let Err(e) =
                drain_outbound(&writer_conn, &mut write_half, &mut rx, write_timeout).await
            {
                warn!("Writer ended: {}", e);
                close_once(&writer_conn, &writer_state, &writer_events);
            }
        });

        // Reader: prints nothing itself; every received line becomes an
        // event for the front-end to render.
        tokio::spawn(server_reader(
            read_half,
            Arc::clone(&conn),
            Arc::clone(&self.state),
            self.event_handlers.clone(),
            self.shutdown.subscribe(),
        ));

        *self.state.write() = ClientState::Connected;
        self.event_handlers.dispatch(Event::Started);

        Ok(())
    }

    /// Disconnect from the server
    ///
    /// Fires the shutdown signal, which interrupts the pending read, and
    /// closes the connection. The client ends in the terminal `Closed`
    /// state.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not connected.
    pub fn stop(&mut self) -> Result<()> {
        {
            let state = self.state.read();
            if *state != ClientState::Connected {
                return Err(Error::InvalidState(
                    "client must be in Connected state to stop".to_string(),
                ));
            }
        }

        let _ = self.shutdown.send(true);

        if let Some(conn) = self.conn.read().as_ref() {
            conn.mark_closed();
        }

        *self.state.write() = ClientState::Closed;
        self.event_handlers.dispatch(Event::Stopped);

        Ok(())
    }

    /// Get the current connection state
    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    /// Get the resolved server address
    ///
    /// `None` until connected.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        *self.server_addr.read()
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Queue one line for delivery to the server
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not connected or the connection
    /// has failed.
    pub fn send(&self, line: &str) -> Result<()> {
        if self.state() != ClientState::Connected {
            return Err(Error::InvalidState(
                "client is not connected".to_string(),
            ));
        }

        let conn = self.conn.read();
        match conn.as_ref() {
            Some(conn) => conn.enqueue(line),
            None => Err(Error::InvalidState("client is not connected".to_string())),
        }
    }

    // ========================================================================
    // Event System
    // ========================================================================

    /// Register an event handler
    ///
    /// The handler is called for all events until unsubscribed.
    ///
    /// # Returns
    ///
    /// A `SubscriptionHandle` that can be used to unsubscribe.
    pub fn on_event<F>(&mut self, handler: F) -> SubscriptionHandle
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.event_handlers.subscribe(handler)
    }

    /// Unsubscribe an event handler
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.event_handlers.unsubscribe(handle);
    }
}

/// Close the connection and report the disconnect exactly once
///
/// The reader and writer can both observe the same death; only the caller
/// whose `mark_closed` actually transitioned the connection dispatches.
fn close_once(conn: &Connection, state: &RwLock<ClientState>, events: &EventHandlers) {
    if conn.mark_closed() {
        *state.write() = ClientState::Closed;
        events.dispatch(Event::PeerDisconnected {
            peer: conn.peer_addr(),
        });
    }
}

/// Read lines from the server until EOF, error, or shutdown
async fn server_reader(
    read_half: OwnedReadHalf,
    conn: Arc<Connection>,
    state: Arc<RwLock<ClientState>>,
    events: EventHandlers,
    mut shutdown: watch::Receiver<bool>,
) {
    let peer = conn.peer_addr();
    let mut reader = BufReader::new(read_half);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            read = read_trimmed_line(&mut reader) => match read {
                Ok(Some(line)) => {
                    conn.record_received();
                    events.dispatch(Event::MessageReceived {
                        peer,
                        line,
                        timestamp: SystemTime::now(),
                    });
                },
                Ok(None) => {
                    debug!("Server {} closed the connection", peer);
                    close_once(&conn, &state, &events);
                    break;
                },
                Err(e) => {
                    debug!("Read from {} failed: {}", peer, e);
                    close_once(&conn, &state, &events);
                    break;
                },
            },
        }
    }
}
