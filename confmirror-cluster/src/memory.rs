//! In-memory [`ClusterClient`] backend.
//!
//! Backs the test suite and the bundled binary's local mode. Semantics
//! follow the real thing where the engine depends on them: optimistic
//! concurrency on update, finalizers blocking deletion, generation advancing
//! on data changes and deletion requests, and watch subscriptions replaying
//! pre-existing objects before live events.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use confmirror_core::ResourceKind;

use crate::client::{ClusterClient, UpsertOutcome, WatchEvent};
use crate::error::ClusterError;
use crate::object::KeyValueObject;

type ObjectKey = (ResourceKind, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, KeyValueObject>,
    watchers: HashMap<ResourceKind, Vec<mpsc::UnboundedSender<WatchEvent>>>,
}

impl State {
    fn broadcast(&mut self, kind: ResourceKind, event: WatchEvent) {
        if let Some(senders) = self.watchers.get_mut(&kind) {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

/// An in-memory cluster. Clones share the same store.
#[derive(Clone, Default)]
pub struct MemoryClient {
    state: Arc<Mutex<State>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or wholesale-replace an object, advancing versions and
    /// notifying watchers. The local-mode equivalent of an apply from
    /// another cluster participant.
    pub async fn apply(&self, object: KeyValueObject) -> KeyValueObject {
        let key = object_key(&object);
        let mut state = self.state.lock().await;
        let next = match state.objects.get(&key) {
            Some(stored) => {
                let mut next = object;
                next.resource_version = stored.resource_version + 1;
                next.generation = if next.data != stored.data {
                    stored.generation + 1
                } else {
                    stored.generation
                };
                let old = stored.clone();
                state.objects.insert(key, next.clone());
                state.broadcast(
                    next.kind,
                    WatchEvent::Applied {
                        old: Some(old),
                        new: next.clone(),
                    },
                );
                next
            }
            None => {
                let mut next = object;
                next.resource_version = next.resource_version.max(1);
                next.generation = next.generation.max(1);
                state.objects.insert(key, next.clone());
                state.broadcast(
                    next.kind,
                    WatchEvent::Applied {
                        old: None,
                        new: next.clone(),
                    },
                );
                next
            }
        };
        next
    }
}

fn object_key(object: &KeyValueObject) -> ObjectKey {
    (
        object.kind,
        object.namespace.clone(),
        object.name.clone(),
    )
}

fn validate_data(
    kind: ResourceKind,
    namespace: &str,
    name: &str,
    data: &BTreeMap<String, Vec<u8>>,
) -> Result<(), ClusterError> {
    if kind.binary_safe() {
        return Ok(());
    }
    for (key, value) in data {
        if std::str::from_utf8(value).is_err() {
            return Err(ClusterError::InvalidData {
                kind,
                namespace: namespace.to_owned(),
                name: name.to_owned(),
                key: key.clone(),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl ClusterClient for MemoryClient {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<KeyValueObject>, ClusterError> {
        let state = self.state.lock().await;
        Ok(state
            .objects
            .get(&(kind, namespace.to_owned(), name.to_owned()))
            .cloned())
    }

    async fn upsert(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Result<UpsertOutcome, ClusterError> {
        validate_data(kind, namespace, name, &data)?;

        let key = (kind, namespace.to_owned(), name.to_owned());
        let mut state = self.state.lock().await;
        match state.objects.get(&key) {
            Some(stored) => {
                if stored.data == data {
                    return Ok(UpsertOutcome::Unchanged);
                }
                let old = stored.clone();
                let mut next = stored.clone();
                next.data = data;
                next.generation += 1;
                next.resource_version += 1;
                state.objects.insert(key, next.clone());
                state.broadcast(
                    kind,
                    WatchEvent::Applied {
                        old: Some(old),
                        new: next,
                    },
                );
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let mut object = KeyValueObject::new(kind, namespace, name);
                object.data = data;
                state.objects.insert(key, object.clone());
                state.broadcast(kind, WatchEvent::Applied { old: None, new: object });
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn update(&self, object: &KeyValueObject) -> Result<KeyValueObject, ClusterError> {
        let key = object_key(object);
        let mut state = self.state.lock().await;
        let stored = match state.objects.get(&key) {
            Some(stored) => stored.clone(),
            None => {
                return Err(ClusterError::NotFound {
                    kind: object.kind,
                    namespace: object.namespace.clone(),
                    name: object.name.clone(),
                })
            }
        };

        if object.resource_version != stored.resource_version {
            return Err(ClusterError::Conflict {
                kind: object.kind,
                namespace: object.namespace.clone(),
                name: object.name.clone(),
                expected: object.resource_version,
                found: stored.resource_version,
            });
        }
        validate_data(object.kind, &object.namespace, &object.name, &object.data)?;

        let mut next = object.clone();
        next.resource_version = stored.resource_version + 1;
        next.generation = if next.data != stored.data {
            stored.generation + 1
        } else {
            stored.generation
        };
        // Deletion is requested through delete(), never through update().
        next.deletion_requested = stored.deletion_requested;

        if next.deletion_requested && next.finalizers.is_empty() {
            state.objects.remove(&key);
            state.broadcast(next.kind, WatchEvent::Deleted(next.clone()));
            return Ok(next);
        }

        state.objects.insert(key, next.clone());
        state.broadcast(
            next.kind,
            WatchEvent::Applied {
                old: Some(stored),
                new: next.clone(),
            },
        );
        Ok(next)
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        let key = (kind, namespace.to_owned(), name.to_owned());
        let mut state = self.state.lock().await;
        let stored = match state.objects.get(&key) {
            Some(stored) => stored.clone(),
            None => {
                return Err(ClusterError::NotFound {
                    kind,
                    namespace: namespace.to_owned(),
                    name: name.to_owned(),
                })
            }
        };

        if stored.finalizers.is_empty() {
            state.objects.remove(&key);
            state.broadcast(kind, WatchEvent::Deleted(stored));
            return Ok(());
        }

        if !stored.deletion_requested {
            let mut next = stored.clone();
            next.deletion_requested = true;
            next.generation += 1;
            next.resource_version += 1;
            state.objects.insert(key, next.clone());
            state.broadcast(
                kind,
                WatchEvent::Applied {
                    old: Some(stored),
                    new: next,
                },
            );
        }
        Ok(())
    }

    async fn watch(
        &self,
        kind: ResourceKind,
    ) -> Result<mpsc::UnboundedReceiver<WatchEvent>, ClusterError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        for object in state.objects.values() {
            if object.kind == kind {
                let _ = tx.send(WatchEvent::Applied {
                    old: None,
                    new: object.clone(),
                });
            }
        }
        state.watchers.entry(kind).or_default().push(tx);
        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
