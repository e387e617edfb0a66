//! The mirrored object model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use confmirror_core::markers;
use confmirror_core::parse::truthy;
use confmirror_core::{ObjectRef, ResourceKind};

/// A cluster key/value configuration object (configmap or secret-typed),
/// reduced to the fields the sync engine observes and mutates.
///
/// `generation` advances when data changes or deletion is requested;
/// `resource_version` advances on every persisted change and backs the
/// client's optimistic-concurrency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueObject {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub finalizers: Vec<String>,
    /// Set once deletion has been requested; the object survives until its
    /// finalizer list is empty.
    #[serde(default)]
    pub deletion_requested: bool,
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub resource_version: u64,
    /// Relative filename → content bytes.
    #[serde(default)]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl KeyValueObject {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            finalizers: Vec::new(),
            deletion_requested: false,
            generation: 1,
            resource_version: 1,
            data: BTreeMap::new(),
        }
    }

    pub fn reference(&self) -> ObjectRef {
        ObjectRef::new(self.namespace.clone(), self.name.clone())
    }

    pub fn has_finalizer(&self, token: &str) -> bool {
        self.finalizers.iter().any(|f| f == token)
    }

    /// Returns true if the token was not already present.
    pub fn add_finalizer(&mut self, token: &str) -> bool {
        if self.has_finalizer(token) {
            return false;
        }
        self.finalizers.push(token.to_owned());
        true
    }

    /// Returns true if the token was present and removed.
    pub fn remove_finalizer(&mut self, token: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != token);
        self.finalizers.len() != before
    }

    /// Permissively-parsed boolean annotation; absent or unparsable is false.
    pub fn annotation_truthy(&self, key: &str) -> bool {
        self.annotations.get(key).is_some_and(|v| truthy(v))
    }

    /// Permissively-parsed boolean label; absent or unparsable is false.
    pub fn label_truthy(&self, key: &str) -> bool {
        self.labels.get(key).is_some_and(|v| truthy(v))
    }

    /// The per-object target directory override, if annotated.
    pub fn target_dir(&self) -> Option<&str> {
        self.annotations
            .get(markers::TARGET_DIR_ANNOTATION)
            .map(String::as_str)
            .filter(|dir| !dir.is_empty())
    }
}
