//! The resource-side reconciler.
//!
//! One instance per object kind, identical control flow for both. Each
//! observed object is driven through the lifecycle state machine: tracked
//! objects get a finalizer and their data materialized as files; objects
//! entering cleanup get their artifacts removed *before* the finalizer is
//! dropped, so a crash mid-cleanup retries rather than orphaning files.
//!
//! The reconciler owns the per-object written-key sets; nothing else reads
//! or mutates them, and the owning loop processes events for one kind
//! strictly in order, so no two reconciles for the same object ever race.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use confmirror_cluster::{ClusterClient, KeyValueObject, WatchEvent};
use confmirror_core::{markers, ObjectRef, ResourceKind, SyncOutcome};

use crate::error::SyncError;
use crate::guard::{ensure_dir, remove_if_present, write_if_changed, WriteOutcome};
use crate::lifecycle::{phase, LifecyclePhase};

pub struct Reconciler<C> {
    client: Arc<C>,
    kind: ResourceKind,
    default_path: PathBuf,
    required_label: Option<String>,
    /// Keys written per tracked object and not yet cleaned up. Cleanup
    /// removes exactly these, so keys dropped from an object's data in an
    /// earlier update are still removed at the end of its lifecycle.
    written_keys: HashMap<ObjectRef, BTreeSet<String>>,
}

impl<C: ClusterClient> Reconciler<C> {
    pub fn new(
        client: Arc<C>,
        kind: ResourceKind,
        default_path: PathBuf,
        required_label: Option<String>,
    ) -> Self {
        Self {
            client,
            kind,
            default_path,
            required_label,
            written_keys: HashMap::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Process one filtered watch event. Errors are logged here and folded
    /// into the outcome; one object's failure never aborts the loop.
    pub async fn handle(&mut self, event: WatchEvent) -> SyncOutcome {
        match event {
            WatchEvent::Deleted(object) => {
                // The object is gone from the store, which means its
                // finalizer already drained; any cleanup has run.
                self.written_keys.remove(&object.reference());
                tracing::debug!(
                    kind = %self.kind,
                    object = %object.reference(),
                    "object left the tracked set",
                );
                SyncOutcome::Unchanged
            }
            WatchEvent::Applied { new, .. } => {
                let reference = new.reference();
                match self.reconcile(new).await {
                    Ok(outcome) => {
                        tracing::info!(
                            kind = %self.kind,
                            object = %reference,
                            outcome = %outcome,
                            "reconciled",
                        );
                        outcome
                    }
                    Err(err) => {
                        tracing::error!(
                            kind = %self.kind,
                            object = %reference,
                            error = %err,
                            "reconcile failed; object remains tracked for retry",
                        );
                        SyncOutcome::Error
                    }
                }
            }
        }
    }

    async fn reconcile(&mut self, object: KeyValueObject) -> Result<SyncOutcome, SyncError> {
        match phase(&object, self.required_label.as_deref()) {
            LifecyclePhase::Tracked => self.materialize(object).await,
            LifecyclePhase::CleaningUp => self.cleanup(object).await,
            LifecyclePhase::Untracked => Ok(SyncOutcome::Unchanged),
        }
    }

    /// Attach the finalizer if absent, then write every data entry into the
    /// resolved target directory (overwrite-only: keys missing from the new
    /// data are left on disk until cleanup).
    async fn materialize(&mut self, object: KeyValueObject) -> Result<SyncOutcome, SyncError> {
        let newly_tracked = !object.has_finalizer(markers::FINALIZER);
        let object = if newly_tracked {
            let mut with_finalizer = object;
            with_finalizer.add_finalizer(markers::FINALIZER);
            self.client.update(&with_finalizer).await?
        } else {
            object
        };

        let dir = self.target_dir(&object);
        ensure_dir(&dir)?;

        let reference = object.reference();
        let mut wrote = false;
        for (key, bytes) in &object.data {
            if !safe_key(key) {
                tracing::warn!(
                    object = %reference,
                    key = %key,
                    "skipping data key that does not name a plain file",
                );
                continue;
            }
            if write_if_changed(&dir.join(key), bytes)? == WriteOutcome::Written {
                wrote = true;
            }
            self.written_keys
                .entry(reference.clone())
                .or_default()
                .insert(key.clone());
        }

        Ok(if newly_tracked {
            SyncOutcome::Created
        } else if wrote {
            SyncOutcome::Updated
        } else {
            SyncOutcome::Unchanged
        })
    }

    /// Remove materialized files (unless the ignore-delete annotation says
    /// otherwise), then drop the finalizer. File removal comes first: if the
    /// finalizer update fails the object stays tracked and cleanup reruns,
    /// and removing already-removed files is a no-op.
    async fn cleanup(&mut self, object: KeyValueObject) -> Result<SyncOutcome, SyncError> {
        let reference = object.reference();

        if !object.annotation_truthy(markers::IGNORE_DELETE_ANNOTATION) {
            let dir = self.target_dir(&object);
            let keys = match self.written_keys.get(&reference) {
                Some(keys) => keys.clone(),
                // Observed mid-lifecycle (e.g. after a restart): fall back
                // to the object's current data keys.
                None => object.data.keys().cloned().collect(),
            };
            for key in &keys {
                if safe_key(key) {
                    remove_if_present(&dir.join(key))?;
                }
            }
        }

        let mut without_finalizer = object;
        without_finalizer.remove_finalizer(markers::FINALIZER);
        self.client.update(&without_finalizer).await?;

        self.written_keys.remove(&reference);
        Ok(SyncOutcome::CleanedUp)
    }

    /// Annotation override, else the process-wide default. Changing the
    /// annotation between reconciles redirects future writes only.
    fn target_dir(&self, object: &KeyValueObject) -> PathBuf {
        object
            .target_dir()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.default_path.clone())
    }
}

/// A data key must name a plain file directly inside the target directory.
fn safe_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains('/')
        && !key.contains('\\')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use confmirror_cluster::MemoryClient;
    use tempfile::TempDir;

    const KIND: ResourceKind = ResourceKind::ConfigMap;

    fn object(name: &str, entries: &[(&str, &str)]) -> KeyValueObject {
        let mut obj = KeyValueObject::new(KIND, "default", name);
        obj.data = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect();
        obj
    }

    fn reconciler(client: &MemoryClient, dir: &Path) -> Reconciler<MemoryClient> {
        Reconciler::new(Arc::new(client.clone()), KIND, dir.to_path_buf(), None)
    }

    async fn stored(client: &MemoryClient, name: &str) -> KeyValueObject {
        client
            .get(KIND, "default", name)
            .await
            .expect("get")
            .expect("present")
    }

    fn applied(new: KeyValueObject) -> WatchEvent {
        WatchEvent::Applied { old: None, new }
    }

    #[tokio::test]
    async fn first_reconcile_attaches_finalizer_and_writes_files() {
        let dir = TempDir::new().expect("tempdir");
        let client = MemoryClient::new();
        let mut reconciler = reconciler(&client, dir.path());

        let obj = client
            .apply(object("app", &[("app.conf", "listen 8080\n"), ("extra", "x")]))
            .await;
        let outcome = reconciler.handle(applied(obj)).await;

        assert_eq!(outcome, SyncOutcome::Created);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.conf")).expect("read"),
            "listen 8080\n"
        );
        assert!(dir.path().join("extra").exists());
        assert!(stored(&client, "app").await.has_finalizer(markers::FINALIZER));
    }

    #[tokio::test]
    async fn unchanged_object_reconciles_to_unchanged_twice() {
        let dir = TempDir::new().expect("tempdir");
        let client = MemoryClient::new();
        let mut reconciler = reconciler(&client, dir.path());

        let obj = client.apply(object("app", &[("app.conf", "v1")])).await;
        assert_eq!(reconciler.handle(applied(obj)).await, SyncOutcome::Created);

        let path = dir.path().join("app.conf");
        let mtime = std::fs::metadata(&path).expect("meta").modified().expect("mtime");

        for _ in 0..2 {
            let current = stored(&client, "app").await;
            assert_eq!(
                reconciler.handle(applied(current)).await,
                SyncOutcome::Unchanged
            );
        }
        let after = std::fs::metadata(&path).expect("meta").modified().expect("mtime");
        assert_eq!(mtime, after, "idempotent reconcile must write zero bytes");
    }

    #[tokio::test]
    async fn changed_data_reconciles_to_updated() {
        let dir = TempDir::new().expect("tempdir");
        let client = MemoryClient::new();
        let mut reconciler = reconciler(&client, dir.path());

        let obj = client.apply(object("app", &[("app.conf", "v1")])).await;
        reconciler.handle(applied(obj)).await;

        let mut changed = stored(&client, "app").await;
        changed.data.insert("app.conf".to_owned(), b"v2".to_vec());
        let changed = client.apply(changed).await;

        assert_eq!(reconciler.handle(applied(changed)).await, SyncOutcome::Updated);
        assert_eq!(
            std::fs::read(dir.path().join("app.conf")).expect("read"),
            b"v2".to_vec()
        );
    }

    #[tokio::test]
    async fn keys_dropped_from_data_are_not_removed_outside_cleanup() {
        let dir = TempDir::new().expect("tempdir");
        let client = MemoryClient::new();
        let mut reconciler = reconciler(&client, dir.path());

        let obj = client
            .apply(object("app", &[("a.conf", "a"), ("b.conf", "b")]))
            .await;
        reconciler.handle(applied(obj)).await;

        let mut shrunk = stored(&client, "app").await;
        shrunk.data.remove("b.conf");
        let shrunk = client.apply(shrunk).await;
        reconciler.handle(applied(shrunk)).await;

        assert!(
            dir.path().join("b.conf").exists(),
            "only cleanup removes files"
        );

        // ...but cleanup removes everything ever written, b.conf included.
        let mut skipped = stored(&client, "app").await;
        skipped
            .annotations
            .insert(markers::SKIP_ANNOTATION.to_owned(), "true".to_owned());
        let skipped = client.apply(skipped).await;
        assert_eq!(
            reconciler.handle(applied(skipped)).await,
            SyncOutcome::CleanedUp
        );
        assert!(!dir.path().join("a.conf").exists());
        assert!(!dir.path().join("b.conf").exists());
    }

    #[tokio::test]
    async fn skip_annotation_triggers_cleanup_and_finalizer_removal() {
        let dir = TempDir::new().expect("tempdir");
        let client = MemoryClient::new();
        let mut reconciler = reconciler(&client, dir.path());

        let obj = client.apply(object("app", &[("app.conf", "v1")])).await;
        reconciler.handle(applied(obj)).await;

        let mut skipped = stored(&client, "app").await;
        skipped
            .annotations
            .insert(markers::SKIP_ANNOTATION.to_owned(), "true".to_owned());
        let skipped = client.apply(skipped).await;

        assert_eq!(
            reconciler.handle(applied(skipped)).await,
            SyncOutcome::CleanedUp
        );
        assert!(!dir.path().join("app.conf").exists());
        assert!(!stored(&client, "app").await.has_finalizer(markers::FINALIZER));
    }

    #[tokio::test]
    async fn ignore_delete_annotation_preserves_files() {
        let dir = TempDir::new().expect("tempdir");
        let client = MemoryClient::new();
        let mut reconciler = reconciler(&client, dir.path());

        let obj = client.apply(object("app", &[("app.conf", "v1")])).await;
        reconciler.handle(applied(obj)).await;

        let mut skipped = stored(&client, "app").await;
        skipped
            .annotations
            .insert(markers::SKIP_ANNOTATION.to_owned(), "true".to_owned());
        skipped
            .annotations
            .insert(markers::IGNORE_DELETE_ANNOTATION.to_owned(), "true".to_owned());
        let skipped = client.apply(skipped).await;

        assert_eq!(
            reconciler.handle(applied(skipped)).await,
            SyncOutcome::CleanedUp
        );
        assert!(
            dir.path().join("app.conf").exists(),
            "ignore-delete suppresses file removal"
        );
        assert!(!stored(&client, "app").await.has_finalizer(markers::FINALIZER));
    }

    #[tokio::test]
    async fn deletion_runs_cleanup_and_drains_the_finalizer() {
        let dir = TempDir::new().expect("tempdir");
        let client = MemoryClient::new();
        let mut reconciler = reconciler(&client, dir.path());

        let obj = client.apply(object("app", &[("app.conf", "v1")])).await;
        reconciler.handle(applied(obj)).await;

        client.delete(KIND, "default", "app").await.expect("delete");
        let marked = stored(&client, "app").await;
        assert!(marked.deletion_requested);

        assert_eq!(
            reconciler.handle(applied(marked)).await,
            SyncOutcome::CleanedUp
        );
        assert!(!dir.path().join("app.conf").exists());
        assert!(
            client
                .get(KIND, "default", "app")
                .await
                .expect("get")
                .is_none(),
            "object disappears once its finalizer drains"
        );
    }

    #[tokio::test]
    async fn required_label_lifecycle_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let client = MemoryClient::new();
        let mut reconciler = Reconciler::new(
            Arc::new(client.clone()),
            KIND,
            dir.path().to_path_buf(),
            Some("mirror".to_owned()),
        );

        let mut obj = object("app", &[("app.conf", "v1")]);
        obj.labels.insert("mirror".to_owned(), "true".to_owned());
        let obj = client.apply(obj).await;
        assert_eq!(reconciler.handle(applied(obj)).await, SyncOutcome::Created);
        assert!(dir.path().join("app.conf").exists());

        // Label falsified: cleaned up even though the object still exists.
        let mut off = stored(&client, "app").await;
        off.labels.insert("mirror".to_owned(), "false".to_owned());
        let off = client.apply(off).await;
        assert_eq!(reconciler.handle(applied(off)).await, SyncOutcome::CleanedUp);
        assert!(!dir.path().join("app.conf").exists());

        // Label restored: tracked and re-materialized.
        let mut on = stored(&client, "app").await;
        on.labels.insert("mirror".to_owned(), "true".to_owned());
        let on = client.apply(on).await;
        assert_eq!(reconciler.handle(applied(on)).await, SyncOutcome::Created);
        assert!(dir.path().join("app.conf").exists());
    }

    #[tokio::test]
    async fn target_dir_annotation_overrides_and_does_not_move_old_files() {
        let root = TempDir::new().expect("tempdir");
        let default_dir = root.path().join("default");
        let override_dir = root.path().join("override");
        let client = MemoryClient::new();
        let mut reconciler = reconciler(&client, &default_dir);

        let obj = client.apply(object("app", &[("app.conf", "v1")])).await;
        reconciler.handle(applied(obj)).await;
        assert!(default_dir.join("app.conf").exists());

        let mut redirected = stored(&client, "app").await;
        redirected.annotations.insert(
            markers::TARGET_DIR_ANNOTATION.to_owned(),
            override_dir.display().to_string(),
        );
        redirected.data.insert("app.conf".to_owned(), b"v2".to_vec());
        let redirected = client.apply(redirected).await;
        reconciler.handle(applied(redirected)).await;

        assert_eq!(
            std::fs::read(override_dir.join("app.conf")).expect("read"),
            b"v2".to_vec()
        );
        assert!(
            default_dir.join("app.conf").exists(),
            "already-written files are not moved retroactively"
        );
    }

    #[tokio::test]
    async fn stale_event_yields_error_and_retry_succeeds() {
        let dir = TempDir::new().expect("tempdir");
        let client = MemoryClient::new();
        let mut reconciler = reconciler(&client, dir.path());

        let stale = client.apply(object("app", &[("app.conf", "v1")])).await;
        // Another writer bumps the object before we reconcile the old view.
        let mut bumped = stored(&client, "app").await;
        bumped.data.insert("app.conf".to_owned(), b"v2".to_vec());
        client.apply(bumped).await;

        assert_eq!(reconciler.handle(applied(stale)).await, SyncOutcome::Error);

        let fresh = stored(&client, "app").await;
        assert_eq!(reconciler.handle(applied(fresh)).await, SyncOutcome::Created);
        assert_eq!(
            std::fs::read(dir.path().join("app.conf")).expect("read"),
            b"v2".to_vec()
        );
    }

    #[tokio::test]
    async fn unsafe_keys_are_skipped() {
        let dir = TempDir::new().expect("tempdir");
        let client = MemoryClient::new();
        let mut reconciler = reconciler(&client, dir.path());

        let obj = client
            .apply(object("app", &[("../escape", "nope"), ("ok.conf", "fine")]))
            .await;
        reconciler.handle(applied(obj)).await;

        assert!(dir.path().join("ok.conf").exists());
        assert!(!root_parent_has(dir.path(), "escape"));
    }

    fn root_parent_has(dir: &Path, name: &str) -> bool {
        dir.parent()
            .map(|parent| parent.join(name).exists())
            .unwrap_or(false)
    }
}
