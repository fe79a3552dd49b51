//! Event system for chat notifications
//!
//! This module defines the event types and the subscription mechanism
//! through which front-ends (the console binary, a GUI, tests) observe a
//! running server or client: received lines, peers arriving and leaving,
//! and lifecycle transitions.

use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Events delivered to registered handlers
#[derive(Debug, Clone)]
pub enum Event {
    /// A line of chat text arrived from a peer
    ///
    /// On the server the peer is a connected client; on the client it is
    /// the server.
    MessageReceived {
        /// Remote address the line came from
        peer: SocketAddr,
        /// The line, without its terminator
        line: String,
        /// When the line was read
        timestamp: SystemTime,
    },

    /// A new peer connection was registered
    PeerConnected {
        /// Remote address of the peer
        peer: SocketAddr,
    },

    /// A peer connection ended (clean EOF, I/O error, or eviction)
    PeerDisconnected {
        /// Remote address of the peer
        peer: SocketAddr,
    },

    /// The server or client started successfully
    Started,

    /// The server or client stopped
    Stopped,
}

/// Handle for unsubscribing from events
///
/// Dropping the handle does NOT unsubscribe the handler; call
/// `unsubscribe()` explicitly to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Type alias for event handler callbacks
pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync + 'static>;

/// Manages event subscriptions and delivery
///
/// Maintains the list of registered handlers and dispatches each event to
/// all of them in subscription order.
pub struct EventHandlers {
    /// Registered handlers with their subscription handles
    handlers: Arc<RwLock<Vec<(SubscriptionHandle, EventCallback)>>>,
    /// Counter for generating unique subscription handles
    next_id: Arc<AtomicU64>,
}

impl EventHandlers {
    /// Create a new event handler registry
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a new event handler
    ///
    /// The handler is called for all future events until unsubscribed.
    ///
    /// # Returns
    ///
    /// A `SubscriptionHandle` that can be used to unsubscribe later.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((handle, Arc::new(callback)));
        handle
    }

    /// Remove the handler associated with a subscription handle
    ///
    /// Unknown handles are a no-op.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.handlers.write().retain(|(h, _)| *h != handle);
    }

    /// Dispatch an event to all registered handlers
    ///
    /// Handlers are called in subscription order. A panicking handler is
    /// caught and logged; the remaining handlers still run.
    pub fn dispatch(&self, event: Event) {
        let handlers = self.handlers.read();

        for (handle, callback) in handlers.iter() {
            let event_clone = event.clone();

            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(event_clone);
            })) {
                tracing::error!(
                    "Event handler {:?} panicked: {:?}",
                    handle,
                    e.downcast_ref::<&str>()
                        .copied()
                        .or_else(|| e.downcast_ref::<String>().map(|s| s.as_str()))
                        .unwrap_or("unknown panic")
                );
            }
        }
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for EventHandlers {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventHandlers {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
            next_id: Arc::clone(&self.next_id),
        }
    }
}
