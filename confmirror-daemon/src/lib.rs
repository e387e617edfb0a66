//! The confmirror daemon: file-side watching, resource-side reconciling
//! and URL polling wired onto one tokio runtime.

pub mod error;
pub mod filewatch;
pub mod http;
pub mod poller;
pub mod process;
pub mod runtime;

pub use error::DaemonError;
pub use filewatch::FileWatcher;
pub use http::{HttpError, RetryPolicy, RetryingClient};
pub use poller::Poller;
pub use process::{ProcScanner, ProcessError, ProcessSignaler};
