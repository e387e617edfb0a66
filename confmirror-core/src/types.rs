//! Domain types shared across the confmirror crates.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem
//! paths. Types are serializable via serde where they cross the config or
//! cluster boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// ResourceKind
// ---------------------------------------------------------------------------

/// The two cluster object kinds confmirror can mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    #[default]
    ConfigMap,
    Secret,
}

impl ResourceKind {
    /// Secrets may carry arbitrary bytes; configmap values must be UTF-8.
    pub fn binary_safe(&self) -> bool {
        matches!(self, ResourceKind::Secret)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::ConfigMap => write!(f, "configmap"),
            ResourceKind::Secret => write!(f, "secret"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("configmap") {
            Ok(ResourceKind::ConfigMap)
        } else if s.eq_ignore_ascii_case("secret") {
            Ok(ResourceKind::Secret)
        } else {
            Err(ConfigError::UnsupportedKind {
                value: s.to_owned(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectRef
// ---------------------------------------------------------------------------

/// Namespace/name identity of a cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// A unix signal number, parsed once at the configuration boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal(pub i32);

impl Signal {
    pub const HUP: Signal = Signal(1);
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signal {}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SyncOutcome
// ---------------------------------------------------------------------------

/// Result of one reconciliation pass. Logged, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
    CleanedUp,
    Error,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Created => write!(f, "created"),
            SyncOutcome::Updated => write!(f, "updated"),
            SyncOutcome::Unchanged => write!(f, "unchanged"),
            SyncOutcome::CleanedUp => write!(f, "cleaned-up"),
            SyncOutcome::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!(
            "ConfigMap".parse::<ResourceKind>().unwrap(),
            ResourceKind::ConfigMap
        );
        assert_eq!(
            "SECRET".parse::<ResourceKind>().unwrap(),
            ResourceKind::Secret
        );
        assert!("deployment".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn kind_display_roundtrips() {
        for kind in [ResourceKind::ConfigMap, ResourceKind::Secret] {
            assert_eq!(kind.to_string().parse::<ResourceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn object_ref_display() {
        assert_eq!(ObjectRef::new("kube-system", "coredns").to_string(), "kube-system/coredns");
    }

    #[test]
    fn only_secrets_are_binary_safe() {
        assert!(ResourceKind::Secret.binary_safe());
        assert!(!ResourceKind::ConfigMap.binary_safe());
    }

    #[test]
    fn outcome_display() {
        assert_eq!(SyncOutcome::CleanedUp.to_string(), "cleaned-up");
        assert_eq!(SyncOutcome::Unchanged.to_string(), "unchanged");
    }
}
