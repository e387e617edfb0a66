use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::http::HttpError;
use crate::process::ProcessError;
use confmirror_cluster::ClusterError;
use confmirror_sync::SyncError;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("filesystem watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("{0} channel closed unexpectedly")]
    ChannelClosed(&'static str),

    #[error("task {name} panicked: {message}")]
    Task { name: &'static str, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
