//! # confmirror-core
//!
//! Domain types and the typed configuration boundary for confmirror.
//!
//! Everything string-shaped in the configuration file (resource kinds,
//! signal names, durations, label selectors) is parsed and validated here,
//! in [`config`] and [`parse`], before the sync engine ever sees it. The
//! engine crates consume only the typed [`config::Config`].

pub mod config;
pub mod error;
pub mod markers;
pub mod parse;
pub mod types;

pub use config::{Config, ConfigFile, FileRule, ProcessTarget, UrlRule, WatcherSettings};
pub use error::ConfigError;
pub use types::{ObjectRef, ResourceKind, Signal, SyncOutcome};
