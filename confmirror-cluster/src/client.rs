//! The client seam between the sync engine and the cluster.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use confmirror_core::ResourceKind;

use crate::error::ClusterError;
use crate::object::KeyValueObject;

/// Result of an [`ClusterClient::upsert`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// The stored data already equals the desired data; nothing was written.
    Unchanged,
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertOutcome::Created => write!(f, "created"),
            UpsertOutcome::Updated => write!(f, "updated"),
            UpsertOutcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// A change notification from a per-kind watch subscription.
///
/// Updates carry the previous state so event filters can observe
/// transitions (e.g. skip annotation flipping) rather than just end states.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// Object created or updated. `old` is `None` for creations and for the
    /// initial replay of pre-existing objects when a watch is established.
    Applied {
        old: Option<KeyValueObject>,
        new: KeyValueObject,
    },
    /// Object left the store (its finalizer list drained after deletion).
    Deleted(KeyValueObject),
}

impl WatchEvent {
    pub fn object(&self) -> &KeyValueObject {
        match self {
            WatchEvent::Applied { new, .. } => new,
            WatchEvent::Deleted(obj) => obj,
        }
    }
}

/// Get/upsert/update/delete/watch capability over the two supported object
/// kinds. This is everything the engine requires of a cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<KeyValueObject>, ClusterError>;

    /// Create the object with the given data, or replace the existing
    /// object's data wholesale. Returns [`UpsertOutcome::Unchanged`] without
    /// writing when the stored data already matches.
    async fn upsert(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Result<UpsertOutcome, ClusterError>;

    /// Persist metadata/data changes to an existing object. Fails with
    /// [`ClusterError::Conflict`] when `object.resource_version` is stale.
    /// Returns the stored object (with its advanced version).
    async fn update(&self, object: &KeyValueObject) -> Result<KeyValueObject, ClusterError>;

    /// Request deletion. Objects holding finalizers are marked and survive
    /// until the finalizer list drains.
    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError>;

    /// Subscribe to changes for one kind. Pre-existing objects are replayed
    /// as [`WatchEvent::Applied`] with `old == None` before live events.
    async fn watch(
        &self,
        kind: ResourceKind,
    ) -> Result<mpsc::UnboundedReceiver<WatchEvent>, ClusterError>;
}
