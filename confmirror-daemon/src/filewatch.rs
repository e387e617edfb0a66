//! File-side watcher: mirrors local file changes into cluster objects.
//!
//! Paths are watched non-recursively. Editors and symlink-based mounts
//! often replace a watched file instead of writing to it, which surfaces
//! as a remove event; the watcher re-arms the subscription on the
//! configured path and syncs, so swaps count as ordinary changes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use confmirror_cluster::{ClusterClient, UpsertOutcome};
use confmirror_sync::RuleSet;

use crate::error::{io_err, DaemonError};
use crate::http::RetryingClient;
use crate::process::ProcessSignaler;

/// What to do with a filesystem notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsAction {
    /// Content changed: push to the cluster.
    Sync,
    /// Watched entry removed: re-arm the watch on the configured path,
    /// then sync whatever replaced it.
    Rearm,
    /// Metadata noise (chmod, atime); no content change.
    Ignore,
}

fn classify(kind: &EventKind) -> FsAction {
    match kind {
        EventKind::Remove(_) => FsAction::Rearm,
        EventKind::Create(_) => FsAction::Sync,
        EventKind::Modify(ModifyKind::Metadata(_)) => FsAction::Ignore,
        EventKind::Modify(_) => FsAction::Sync,
        _ => FsAction::Ignore,
    }
}

pub struct FileWatcher<C, S> {
    rules: RuleSet,
    client: Arc<C>,
    signaler: Arc<S>,
    http: Arc<RetryingClient>,
}

impl<C, S> FileWatcher<C, S>
where
    C: ClusterClient,
    S: ProcessSignaler,
{
    pub fn new(rules: RuleSet, client: Arc<C>, signaler: Arc<S>, http: Arc<RetryingClient>) -> Self {
        FileWatcher {
            rules,
            client,
            signaler,
            http,
        }
    }

    /// Watch all configured paths until shutdown. Failing to establish the
    /// initial subscriptions is fatal; per-event sync errors are logged and
    /// the loop keeps running.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), DaemonError> {
        if self.rules.is_empty() {
            debug!("no file rules configured; file watcher idle");
            let _ = shutdown.recv().await;
            return Ok(());
        }

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |event: Result<notify::Event, notify::Error>| {
                let _ = event_tx.send(event);
            })?;
        for path in self.rules.paths() {
            watcher.watch(path, RecursiveMode::NonRecursive)?;
            info!(path = %path.display(), "watching");
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("file watcher stopping");
                    return Ok(());
                }
                event = event_rx.recv() => {
                    match event {
                        Some(Ok(event)) => self.handle_event(&mut watcher, event).await,
                        Some(Err(err)) => warn!(error = %err, "watch backend error"),
                        None => return Err(DaemonError::ChannelClosed("file events")),
                    }
                }
            }
        }
    }

    async fn handle_event(&self, watcher: &mut RecommendedWatcher, event: notify::Event) {
        for path in &event.paths {
            match classify(&event.kind) {
                FsAction::Ignore => continue,
                FsAction::Rearm => {
                    let Some((configured, _)) = self.rules.resolve(path) else {
                        continue;
                    };
                    self.rearm(watcher, configured);
                }
                FsAction::Sync => {}
            }
            if let Err(err) = self.sync_path(path).await {
                warn!(path = %path.display(), error = %err, "sync failed");
            }
        }
    }

    /// Re-establish the watch on a configured path after its inode vanished.
    /// Failures are logged; the next event on a sibling path retries.
    fn rearm(&self, watcher: &mut RecommendedWatcher, configured: &Path) {
        let _ = watcher.unwatch(configured);
        match watcher.watch(configured, RecursiveMode::NonRecursive) {
            Ok(()) => debug!(path = %configured.display(), "watch re-armed"),
            Err(err) => warn!(path = %configured.display(), error = %err, "re-arm failed"),
        }
    }

    /// Push the current contents behind `notified` to every sink the
    /// matching rule names. Returns the upsert outcome when the rule
    /// targets an object, `None` otherwise.
    async fn sync_path(&self, notified: &Path) -> Result<Option<UpsertOutcome>, DaemonError> {
        let Some((configured, rule)) = self.rules.resolve(notified) else {
            debug!(path = %notified.display(), "no rule for notified path");
            return Ok(None);
        };

        // Signal delivery is best-effort; a missing process never blocks
        // the data push.
        if let Some(process) = &rule.process {
            match self.signaler.signal(&process.name, process.signal) {
                Ok(()) => info!(process = %process.name, signal = %process.signal, "process signaled"),
                Err(err) => warn!(process = %process.name, error = %err, "signal not delivered"),
            }
        }

        if rule.name.is_none() && rule.url.is_none() {
            return Ok(None);
        }
        let mut data = read_path_data(configured)?;

        if let Some(url) = &rule.url {
            for (key, bytes) in &data {
                self.http.post_bytes(url, bytes.clone()).await?;
                debug!(url, key, "pushed entry");
            }
        }

        let Some(name) = &rule.name else {
            return Ok(None);
        };
        if let Some(key) = &rule.key {
            data = apply_key_override(data, configured, key);
        }
        let outcome = self
            .client
            .upsert(rule.kind, &rule.namespace, name, data)
            .await?;
        info!(
            path = %configured.display(),
            target = %format!("{}/{}/{}", rule.kind, rule.namespace, name),
            op = %outcome,
            "file synced"
        );
        Ok(Some(outcome))
    }
}

/// Read the data entries behind a configured path: a file becomes a single
/// entry keyed by its basename, a directory contributes one entry per
/// direct child file (no recursion).
fn read_path_data(path: &Path) -> Result<BTreeMap<String, Vec<u8>>, DaemonError> {
    let meta = fs::metadata(path).map_err(|e| io_err(path, e))?;
    let mut data = BTreeMap::new();
    if meta.is_dir() {
        for entry in fs::read_dir(path).map_err(|e| io_err(path, e))? {
            let entry = entry.map_err(|e| io_err(path, e))?;
            let child = entry.path();
            // is_file follows symlinks, so mounted links to files count.
            if !child.is_file() {
                continue;
            }
            let Some(key) = child.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let bytes = fs::read(&child).map_err(|e| io_err(&child, e))?;
            data.insert(key.to_string(), bytes);
        }
    } else {
        let key = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("config")
            .to_string();
        let bytes = fs::read(path).map_err(|e| io_err(path, e))?;
        data.insert(key, bytes);
    }
    Ok(data)
}

/// Rename the sole basename-keyed entry of a single-file rule to the
/// configured key. Directory rules keep their natural per-file keys.
fn apply_key_override(
    mut data: BTreeMap<String, Vec<u8>>,
    configured: &Path,
    key: &str,
) -> BTreeMap<String, Vec<u8>> {
    let Some(basename) = configured.file_name().and_then(|n| n.to_str()) else {
        return data;
    };
    if basename != key {
        if let Some(bytes) = data.remove(basename) {
            data.insert(key.to_string(), bytes);
        }
    }
    data
}
