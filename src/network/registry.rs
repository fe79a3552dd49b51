//! Registry of live connections
//!
//! The registry tracks every connection the server currently owes
//! broadcasts to. The accept loop adds entries; whichever task observes a
//! connection's death removes it. The broadcaster never iterates the live
//! map directly: it takes a snapshot, ordered by registration, so fan-out
//! order is insertion order.

use crate::network::Connection;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Connections indexed by peer address, with registration order preserved
pub struct ConnectionRegistry {
    /// Active connections with their registration sequence number
    connections: DashMap<SocketAddr, (u64, Arc<Connection>)>,
    /// Registration counter; snapshot order is ascending sequence
    next_seq: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a connection
    ///
    /// A reconnecting peer reusing an address pair replaces its stale
    /// entry, which is closed first.
    pub fn add(&self, conn: Arc<Connection>) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        if let Some((_, (_, stale))) = self.connections.remove(&conn.peer_addr()) {
            stale.mark_closed();
        }
        self.connections.insert(conn.peer_addr(), (seq, conn));
    }

    /// Remove a connection by peer address
    ///
    /// The removed connection is marked closed, which also shuts its
    /// outbound queue. Returns `None` if another task already removed it,
    /// so exactly one caller wins the removal and reports the disconnect.
    pub fn remove(&self, peer_addr: &SocketAddr) -> Option<Arc<Connection>> {
        let (_, (_, conn)) = self.connections.remove(peer_addr)?;
        conn.mark_closed();
        Some(conn)
    }

    /// Get a connection by peer address
    pub fn get(&self, peer_addr: &SocketAddr) -> Option<Arc<Connection>> {
        self.connections
            .get(peer_addr)
            .map(|entry| Arc::clone(&entry.value().1))
    }

    /// Snapshot the current connections in registration order
    ///
    /// Broadcasts iterate this snapshot, never the live map, so a
    /// connection added or removed mid-broadcast does not affect the
    /// in-flight fan-out.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        let mut entries: Vec<(u64, Arc<Connection>)> = self
            .connections
            .iter()
            .map(|entry| (entry.value().0, Arc::clone(&entry.value().1)))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, conn)| conn).collect()
    }

    /// Peer addresses currently registered, in registration order
    pub fn peer_addrs(&self) -> Vec<SocketAddr> {
        self.snapshot().iter().map(|c| c.peer_addr()).collect()
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Close and remove every connection
    pub fn clear(&self) {
        for entry in self.connections.iter() {
            entry.value().1.mark_closed();
        }
        self.connections.clear();
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn conn(addr: &str) -> Arc<Connection> {
        let (tx, _rx) = mpsc::channel(4);
        Arc::new(Connection::new(addr.parse().unwrap(), tx))
    }

    #[test]
    fn test_add_and_len() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty());

        registry.add(conn("127.0.0.1:1001"));
        registry.add(conn("127.0.0.1:1002"));

        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_snapshot_preserves_insertion_order() {
        let registry = ConnectionRegistry::new();
        registry.add(conn("127.0.0.1:1003"));
        registry.add(conn("127.0.0.1:1001"));
        registry.add(conn("127.0.0.1:1002"));

        let addrs = registry.peer_addrs();
        assert_eq!(
            addrs,
            vec![
                "127.0.0.1:1003".parse().unwrap(),
                "127.0.0.1:1001".parse().unwrap(),
                "127.0.0.1:1002".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let c = conn("127.0.0.1:1001");
        registry.add(Arc::clone(&c));

        let removed = registry.remove(&c.peer_addr());
        assert!(removed.is_some());
        assert_eq!(
            removed.unwrap().state(),
            crate::network::ConnectionState::Closed
        );

        // Second removal loses the race and reports nothing
        assert!(registry.remove(&c.peer_addr()).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_get_returns_registered_connection() {
        let registry = ConnectionRegistry::new();
        let c = conn("127.0.0.1:1001");
        registry.add(Arc::clone(&c));

        let found = registry.get(&c.peer_addr()).unwrap();
        assert_eq!(found.peer_addr(), c.peer_addr());
        assert!(registry.get(&"127.0.0.1:9999".parse().unwrap()).is_none());
    }

    #[test]
    fn test_add_replaces_stale_entry_for_same_peer() {
        let registry = ConnectionRegistry::new();
        let stale = conn("127.0.0.1:1001");
        let fresh = conn("127.0.0.1:1001");

        registry.add(Arc::clone(&stale));
        registry.add(Arc::clone(&fresh));

        assert_eq!(registry.len(), 1);
        assert_eq!(stale.state(), crate::network::ConnectionState::Closed);
        assert_eq!(fresh.state(), crate::network::ConnectionState::Connected);
    }

    #[test]
    fn test_clear_closes_all() {
        let registry = ConnectionRegistry::new();
        let a = conn("127.0.0.1:1001");
        let b = conn("127.0.0.1:1002");
        registry.add(Arc::clone(&a));
        registry.add(Arc::clone(&b));

        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(a.state(), crate::network::ConnectionState::Closed);
        assert_eq!(b.state(), crate::network::ConnectionState::Closed);
    }
}
