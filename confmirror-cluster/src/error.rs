//! Error types for cluster operations.

use thiserror::Error;

use confmirror_core::ResourceKind;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    /// Optimistic-concurrency failure: the object changed under the caller.
    /// Transient; callers retry on the next notification.
    #[error("conflict updating {kind} {namespace}/{name}: expected version {expected}, found {found}")]
    Conflict {
        kind: ResourceKind,
        namespace: String,
        name: String,
        expected: u64,
        found: u64,
    },

    /// Configmap values must be UTF-8; only secrets carry arbitrary bytes.
    #[error("{kind} {namespace}/{name}: value for key {key:?} is not valid UTF-8")]
    InvalidData {
        kind: ResourceKind,
        namespace: String,
        name: String,
        key: String,
    },

    /// The backend can no longer serve watches; fatal for the watch loop.
    #[error("cluster watch closed")]
    WatchClosed,
}
