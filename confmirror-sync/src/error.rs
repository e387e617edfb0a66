//! Error types for the sync engine.

use std::path::PathBuf;

use thiserror::Error;

use confmirror_cluster::ClusterError;

/// All errors that can arise from a reconcile or file sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
