//! SessionRegistry: the authoritative table of live connections.
//!
//! Every accepted connection has exactly one entry, keyed by its
//! [`ConnectionId`].  An entry holds the connection's metadata and its
//! outbound queue sender, which is the only way the relay can reach it.
//!
//! # Locking (for beginners)
//!
//! The table lives behind a single `tokio::sync::RwLock`.  Mutations
//! (`insert`, `register`, `deregister`) take the write lock; fan-out takes the
//! read lock just long enough to clone the consumer senders into a snapshot.
//! A connection removed after the snapshot was taken sees its queue closed,
//! so a send to it fails softly instead of reaching a half-removed entry.

use std::collections::HashMap;

use barcode_core::protocol::{Declaration, ServerEvent};
use barcode_core::{ConsumerSummary, Role, UnknownRole};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::domain::{ConnectionId, ConnectionMeta};

/// Sending half of a connection's bounded outbound queue.
pub type Outbound = mpsc::Sender<ServerEvent>;

/// Capacity of each connection's outbound queue, in frames.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 128;

/// Error type for registry operations.
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    /// The declared client type is not in the declaration table.
    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),

    /// The connection already has a role; roles never change.
    #[error("connection is already classified as {0}")]
    AlreadyClassified(Role),

    /// No live connection has this id.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
}

/// Connection counts by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleCounts {
    pub scanners: usize,
    pub consumers: usize,
    pub unclassified: usize,
}

struct Entry {
    meta: ConnectionMeta,
    outbound: Outbound,
}

/// In-memory registry of every live connection.
#[derive(Default)]
pub struct SessionRegistry {
    connections: RwLock<HashMap<ConnectionId, Entry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a freshly accepted, unclassified connection.
    pub async fn insert(&self, meta: ConnectionMeta, outbound: Outbound) {
        let id = meta.id;
        self.connections
            .write()
            .await
            .insert(id, Entry { meta, outbound });
        debug!(connection = %id, "connection added to registry");
    }

    /// Classifies a connection from its declaration.
    ///
    /// On success the declared platform and version are recorded and the role
    /// is fixed for the life of the connection.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownConnection`] if `id` is not registered.
    /// - [`RegistryError::AlreadyClassified`] if the connection has a role.
    /// - [`RegistryError::UnknownRole`] if the declared type is not in the
    ///   table; the connection stays unclassified.
    pub async fn register(
        &self,
        id: ConnectionId,
        declaration: &Declaration,
    ) -> Result<Role, RegistryError> {
        let mut connections = self.connections.write().await;
        let entry = connections
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;

        if entry.meta.role.is_classified() {
            return Err(RegistryError::AlreadyClassified(entry.meta.role));
        }

        let role = Role::from_declaration(&declaration.client_type)?;
        entry.meta.role = role;
        entry.meta.declared_platform = Some(declaration.platform.clone());
        entry.meta.declared_version = Some(declaration.version.clone());
        Ok(role)
    }

    /// Removes a connection and returns its metadata.
    ///
    /// Idempotent: removing an absent id returns `None`.
    pub async fn deregister(&self, id: ConnectionId) -> Option<ConnectionMeta> {
        self.connections
            .write()
            .await
            .remove(&id)
            .map(|entry| entry.meta)
    }

    /// Snapshot of every registered consumer and its outbound sender.
    pub async fn consumers(&self) -> Vec<(ConnectionId, Outbound)> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.meta.role == Role::Consumer)
            .map(|(id, entry)| (*id, entry.outbound.clone()))
            .collect()
    }

    /// Roster rows for every registered consumer, oldest connection first.
    pub async fn consumer_roster(&self) -> Vec<ConsumerSummary> {
        let connections = self.connections.read().await;
        let mut consumers: Vec<&ConnectionMeta> = connections
            .values()
            .map(|entry| &entry.meta)
            .filter(|meta| meta.role == Role::Consumer)
            .collect();
        consumers.sort_by_key(|meta| meta.connected_at);
        consumers.into_iter().map(ConnectionMeta::summary).collect()
    }

    pub async fn counts(&self) -> RoleCounts {
        let connections = self.connections.read().await;
        let mut counts = RoleCounts::default();
        for entry in connections.values() {
            match entry.meta.role {
                Role::Scanner => counts.scanners += 1,
                Role::Consumer => counts.consumers += 1,
                Role::Unclassified => counts.unclassified += 1,
            }
        }
        counts
    }

    pub async fn meta(&self, id: ConnectionId) -> Option<ConnectionMeta> {
        self.connections
            .read()
            .await
            .get(&id)
            .map(|entry| entry.meta.clone())
    }

    pub async fn role_of(&self, id: ConnectionId) -> Option<Role> {
        self.connections
            .read()
            .await
            .get(&id)
            .map(|entry| entry.meta.role)
    }

    /// The connection's own outbound sender, for replies.
    pub async fn outbound(&self, id: ConnectionId) -> Option<Outbound> {
        self.connections
            .read()
            .await
            .get(&id)
            .map(|entry| entry.outbound.clone())
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Drops every entry and returns how many were removed.  Used at shutdown.
    pub async fn clear(&self) -> usize {
        let mut connections = self.connections.write().await;
        let removed = connections.len();
        connections.clear();
        removed
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
