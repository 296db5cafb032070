//! Connection registry: maps live connection identifiers to their outbound queues
//!
//! The registry is the only shared mutable state of the signaling path.
//! `ConnectionRegistry` is the injection seam: the in-process `LocalRegistry`
//! backs a single server, tests can substitute a fake, and a distributed
//! implementation can be dropped in without touching the relay.

use crate::signaling::protocol::ServerEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Opaque identifier of one live transport session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Allocate a fresh identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Addressable handle of a live connection.
///
/// Delivery never blocks: events are pushed onto an unbounded queue drained
/// by the connection's writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its writer task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue an event. Returns `false` if the connection's receiver is gone.
    pub fn deliver(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Whether the receiving side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Registry error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Connection identifier already live: {0}")]
    DuplicateId(ConnectionId),
    #[error("Connection limit exceeded ({0})")]
    ConnectionLimitExceeded(usize),
}

/// Identifier-based addressing of live connections.
///
/// Implementations must make `lookup` atomic with respect to `register` and
/// `unregister`: a concurrent lookup sees either the whole entry or nothing.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionRegistry: Send + Sync {
    /// Make a connection addressable
    fn register(&self, id: ConnectionId, handle: ConnectionHandle) -> Result<(), RegistryError>;

    /// Invalidate an identifier. Returns the removed handle, if it was live.
    fn unregister(&self, id: &ConnectionId) -> Option<ConnectionHandle>;

    /// Resolve an identifier to its live handle
    fn lookup(&self, id: &ConnectionId) -> Option<ConnectionHandle>;

    /// Number of live connections
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry configuration
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,
}

/// In-process registry backed by a lock-protected map
#[derive(Debug, Default)]
pub struct LocalRegistry {
    config: RegistryConfig,
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl LocalRegistry {
    /// Create a registry with no connection limit
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of live identifiers
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().keys().cloned().collect()
    }
}

impl ConnectionRegistry for LocalRegistry {
    fn register(&self, id: ConnectionId, handle: ConnectionHandle) -> Result<(), RegistryError> {
        let mut connections = self.connections.write();

        if connections.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }

        let limit = self.config.max_connections;
        if limit > 0 && connections.len() >= limit {
            return Err(RegistryError::ConnectionLimitExceeded(limit));
        }

        connections.insert(id, handle);
        Ok(())
    }

    fn unregister(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        self.connections.write().remove(id)
    }

    fn lookup(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        self.connections.read().get(id).cloned()
    }

    fn len(&self) -> usize {
        self.connections.read().len()
    }
}

// ============================================================================
// TESTS
// ============================================================================
