//! # confmirror-sync
//!
//! The synchronization engine: path-to-rule resolution, the cluster event
//! filter chain, the per-object lifecycle state machine, the byte-compare
//! debounce guard, and the resource-side reconciler that materializes
//! cluster objects as files (and cleans them up again).
//!
//! Everything here is side-effect-free or filesystem-only; the daemon crate
//! owns the watch subscriptions and feeds events in.

pub mod error;
pub mod filter;
pub mod guard;
pub mod lifecycle;
pub mod reconciler;
pub mod resolver;

pub use error::SyncError;
pub use filter::FilterChain;
pub use guard::{readers_equal, write_if_changed, WriteOutcome};
pub use lifecycle::LifecyclePhase;
pub use reconciler::Reconciler;
pub use resolver::RuleSet;
