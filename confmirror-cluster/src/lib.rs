//! # confmirror-cluster
//!
//! The cluster side of confmirror: the [`KeyValueObject`] model for mirrored
//! configmaps/secrets, the [`ClusterClient`] seam the engine talks through,
//! and the [`MemoryClient`] in-memory backend used by the tests and the
//! bundled binary's local mode.
//!
//! A production deployment implements [`ClusterClient`] over its API
//! machinery; nothing in the engine depends on anything beyond this trait.

pub mod client;
pub mod error;
pub mod memory;
pub mod object;

pub use client::{ClusterClient, UpsertOutcome, WatchEvent};
pub use error::ClusterError;
pub use memory::MemoryClient;
pub use object::KeyValueObject;
