//! Chat server - accept loop, per-connection readers, broadcast fan-out
//!
//! This module provides the `Server` and `ServerBuilder` types. A running
//! server owns one accept task plus a reader and a writer task per client
//! connection; all of them race a shutdown signal so `stop()` interrupts
//! pending reads instead of waiting them out.

use crate::api::config::ServerConfig;
use crate::api::events::{Event, EventHandlers, SubscriptionHandle};
use crate::error::{Error, NetworkError, Result};
use crate::network::{drain_outbound, read_trimmed_line, Connection, ConnectionRegistry};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Current operational state of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Server has been created but not started
    Created,
    /// Server is binding its listener
    Starting,
    /// Server is accepting connections and broadcasting
    Running,
    /// Server is shutting down
    Stopping,
    /// Server has stopped
    Stopped,
}

/// Builder for creating `Server` instances
///
/// # Examples
///
/// ```no_run
/// use wirechat::ServerBuilder;
///
/// # async fn example() -> wirechat::Result<()> {
/// let mut server = ServerBuilder::new()
///     .with_bind_host("127.0.0.1")
///     .with_port(50007)
///     .build()?;
///
/// server.start().await?;
/// server.broadcast("hello, everyone")?;
/// # Ok(())
/// # }
/// ```
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a new ServerBuilder with default settings
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Set the address the listener binds
    pub fn with_bind_host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.bind_host = host.into();
        self
    }

    /// Set the port to listen on
    ///
    /// Port 0 selects a random available port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the capacity of each connection's outbound queue
    pub fn with_outbound_queue(mut self, capacity: usize) -> Self {
        self.config.outbound_queue = capacity;
        self
    }

    /// Set the per-write timeout after which a client is considered dead
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Build the Server instance
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<Server> {
        self.config.validate()?;

        let (shutdown, _) = watch::channel(false);

        Ok(Server {
            config: self.config,
            registry: Arc::new(ConnectionRegistry::new()),
            event_handlers: EventHandlers::new(),
            state: Arc::new(RwLock::new(ServerState::Created)),
            shutdown,
            local_addr: RwLock::new(None),
            accept_task: Mutex::new(None),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A line-broadcast chat server
///
/// Accepts any number of client connections. Lines received from any
/// client are dispatched as `Event::MessageReceived`; `broadcast()` fans a
/// line out to every currently registered client in connection order.
pub struct Server {
    /// Immutable configuration
    config: ServerConfig,
    /// Live client connections
    registry: Arc<ConnectionRegistry>,
    /// Event handler registry
    event_handlers: EventHandlers,
    /// Current operational state
    state: Arc<RwLock<ServerState>>,
    /// Shutdown signal raced against every blocking accept/read
    shutdown: watch::Sender<bool>,
    /// Bound listener address, available once started
    local_addr: RwLock<Option<SocketAddr>>,
    /// Handle to the accept task
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the server
    ///
    /// Binds the listener and spawns the accept loop, then transitions to
    /// `Running` and dispatches `Event::Started`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is not in the `Created` or `Stopped`
    /// state, or if binding fails.
    pub async fn start(&mut self) -> Result<()> {
        {
            let state = self.state.read();
            if *state != ServerState::Created && *state != ServerState::Stopped {
                return Err(Error::InvalidState(
                    "server must be in Created or Stopped state to start".to_string(),
                ));
            }
        }

        *self.state.write() = ServerState::Starting;
        let _ = self.shutdown.send_replace(false);

        let address = format!("{}:{}", self.config.bind_host, self.config.port);
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(e) => {
                *self.state.write() = ServerState::Stopped;
                return Err(NetworkError::BindFailed {
                    address,
                    reason: e.to_string(),
                }
                .into());
            },
        };

        let local_addr = listener.local_addr()?;
        *self.local_addr.write() = Some(local_addr);
        info!("Server online at {}", local_addr);

        let accept = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.registry),
            self.event_handlers.clone(),
            self.config.outbound_queue,
            self.config.write_timeout,
            self.shutdown.subscribe(),
        ));
        *self.accept_task.lock() = Some(accept);

        *self.state.write() = ServerState::Running;
        self.event_handlers.dispatch(Event::Started);

        Ok(())
    }

    /// Stop the server
    ///
    /// Fires the shutdown signal (interrupting the accept loop and every
    /// pending per-connection read), closes all registered connections,
    /// and transitions to `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is not running.
    pub async fn stop(&mut self) -> Result<()> {
        {
            let state = self.state.read();
            if *state != ServerState::Running {
                return Err(Error::InvalidState(
                    "server must be in Running state to stop".to_string(),
                ));
            }
        }

        *self.state.write() = ServerState::Stopping;

        let _ = self.shutdown.send(true);

        let accept = self.accept_task.lock().take();
        if let Some(handle) = accept {
            let _ = handle.await;
        }

        // Closing the registry shuts every outbound queue; writer tasks
        // drain and end, and each client then observes EOF.
        self.registry.clear();
        *self.local_addr.write() = None;

        *self.state.write() = ServerState::Stopped;
        self.event_handlers.dispatch(Event::Stopped);

        Ok(())
    }

    /// Get the current operational state
    pub fn state(&self) -> ServerState {
        *self.state.read()
    }

    /// Get the bound listener address
    ///
    /// `None` unless the server is started. With port 0 this is how the
    /// actual port is discovered.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    // ========================================================================
    // Broadcasting
    // ========================================================================

    /// Fan a line out to every registered client
    ///
    /// Delivery order is connection order. Failures are isolated per
    /// connection: a client whose queue is full or closed is logged,
    /// deregistered, and reported via `Event::PeerDisconnected`, and the
    /// line still goes to every other client.
    ///
    /// # Returns
    ///
    /// The number of clients the line was queued for.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is not running.
    pub fn broadcast(&self, line: &str) -> Result<usize> {
        if self.state() != ServerState::Running {
            return Err(Error::InvalidState(
                "server must be running to broadcast".to_string(),
            ));
        }

        let mut delivered = 0;
        for conn in self.registry.snapshot() {
            match conn.enqueue(line) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Dropping client {}: {}", conn.peer_addr(), e);
                    deregister(&self.registry, &self.event_handlers, conn.peer_addr());
                },
            }
        }

        Ok(delivered)
    }

    /// Number of currently connected clients
    pub fn peer_count(&self) -> usize {
        self.registry.len()
    }

    /// Addresses of currently connected clients, in connection order
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.registry.peer_addrs()
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

/// Remove a connection and report the disconnect exactly once
///
/// Removal is race-tolerant: the reader, the writer, and the broadcaster
/// may all observe the same death, and only the caller that wins the
/// removal dispatches the event.
fn deregister(registry: &ConnectionRegistry, events: &EventHandlers, peer: SocketAddr) {
    if registry.remove(&peer).is_some() {
        events.dispatch(Event::PeerDisconnected { peer });
    }
}

/// Accept connections until shutdown
async fn accept_loop(
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    events: EventHandlers,
    outbound_queue: usize,
    write_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    info!("New client connected: {}", peer_addr);
                    register_client(
                        stream,
                        peer_addr,
                        &registry,
                        &events,
                        outbound_queue,
                        write_timeout,
                        shutdown.clone(),
                    );
                },
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                },
            },
        }
    }

    debug!("Accept loop ended");
}

/// Register an accepted connection and spawn its reader and writer tasks
fn register_client(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: &Arc<ConnectionRegistry>,
    events: &EventHandlers,
    outbound_queue: usize,
    write_timeout: Duration,
    shutdown: watch::Receiver<bool>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::channel(outbound_queue);
    let conn = Arc::new(Connection::new(peer_addr, tx));

    registry.add(Arc::clone(&conn));
    events.dispatch(Event::PeerConnected { peer: peer_addr });

    // Writer: drains the outbound queue until it closes or a write fails.
    let writer_conn = Arc::clone(&conn);
    let writer_registry = Arc::clone(registry);
    let writer_events = events.clone();
    tokio::spawn(async move {
        if let Err(e) =
            drain_outbound(&writer_conn, &mut write_half, &mut rx, write_timeout).await
        {
            warn!("Writer for {} ended: {}", peer_addr, e);
            deregister(&writer_registry, &writer_events, peer_addr);
        }
    });

    // Reader: surfaces each line as an event until EOF, error, or shutdown.
    let reader_registry = Arc::clone(registry);
    let reader_events = events.clone();
    tokio::spawn(client_reader(
        read_half,
        conn,
        reader_registry,
        reader_events,
        shutdown,
    ));
}

/// Read lines from one client until EOF, error, or shutdown
async fn client_reader(
    read_half: OwnedReadHalf,
    conn: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
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
                    debug!("Client {} disconnected", peer);
                    deregister(&registry, &events, peer);
                    break;
                },
                Err(e) => {
                    debug!("Read from {} failed: {}", peer, e);
                    deregister(&registry, &events, peer);
                    break;
                },
            },
        }
    }
}
