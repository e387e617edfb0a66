//! Task wiring for the mirror daemon.
//!
//! Every long-running concern gets its own task: the file-side watcher,
//! one reconcile loop per enabled object kind, the URL poller and a
//! ctrl-c handler. A broadcast channel fans out shutdown; each task echoes
//! the signal when it exits so one failure stops the whole daemon.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use confmirror_cluster::{ClusterClient, ClusterError};
use confmirror_core::config::{Config, WatcherSettings};
use confmirror_core::ResourceKind;
use confmirror_sync::{FilterChain, Reconciler, RuleSet};

use crate::error::DaemonError;
use crate::filewatch::FileWatcher;
use crate::http::RetryingClient;
use crate::poller::Poller;
use crate::process::ProcScanner;

/// Run the daemon until the shutdown channel fires or a task fails.
/// Callers keep the sender to stop the daemon programmatically; ctrl-c
/// feeds the same channel.
pub async fn run<C>(
    config: Config,
    client: Arc<C>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError>
where
    C: ClusterClient + 'static,
{
    let http = Arc::new(RetryingClient::default());
    let mut tasks: Vec<(&'static str, JoinHandle<Result<(), DaemonError>>)> = Vec::new();

    {
        let shutdown = shutdown_tx.clone();
        let watcher = FileWatcher::new(
            RuleSet::new(config.files.clone()),
            client.clone(),
            Arc::new(ProcScanner),
            http.clone(),
        );
        tasks.push((
            "file_watcher",
            tokio::spawn(async move {
                let result = watcher.run(shutdown.subscribe()).await;
                let _ = shutdown.send(());
                result
            }),
        ));
    }

    for kind in enabled_kinds(&config.watcher) {
        let shutdown = shutdown_tx.clone();
        let client = client.clone();
        let settings = config.watcher.clone();
        tasks.push((
            reconcile_task_name(kind),
            tokio::spawn(async move {
                let result = reconcile_loop(client, kind, settings, shutdown.subscribe()).await;
                let _ = shutdown.send(());
                result
            }),
        ));
    }

    {
        let shutdown = shutdown_tx.clone();
        let poller = Arc::new(Poller::new(config.urls.clone(), client.clone(), http));
        tasks.push((
            "url_poller",
            tokio::spawn(async move {
                let result = poller.run(shutdown.subscribe()).await;
                let _ = shutdown.send(());
                result
            }),
        ));
    }

    {
        let shutdown = shutdown_tx.clone();
        tasks.push((
            "signal_handler",
            tokio::spawn(async move {
                let mut shutdown_rx = shutdown.subscribe();
                tokio::select! {
                    _ = shutdown_rx.recv() => {}
                    signal = tokio::signal::ctrl_c() => {
                        if signal.is_ok() {
                            info!("received ctrl-c, shutting down");
                        }
                        let _ = shutdown.send(());
                    }
                }
                Ok(())
            }),
        ));
    }

    let mut first_error = None;
    for (name, handle) in tasks {
        if let Err(err) = handle_join(name, handle.await) {
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn enabled_kinds(settings: &WatcherSettings) -> Vec<ResourceKind> {
    let mut kinds = Vec::new();
    if settings.configmaps {
        kinds.push(ResourceKind::ConfigMap);
    }
    if settings.secrets {
        kinds.push(ResourceKind::Secret);
    }
    kinds
}

fn reconcile_task_name(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::ConfigMap => "configmap_reconciler",
        ResourceKind::Secret => "secret_reconciler",
    }
}

/// Consume the watch stream for one kind, filtering events before the
/// reconciler sees them. The stream ending outside shutdown is fatal.
async fn reconcile_loop<C>(
    client: Arc<C>,
    kind: ResourceKind,
    settings: WatcherSettings,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError>
where
    C: ClusterClient + 'static,
{
    let mut events = client.watch(kind).await?;
    let chain = FilterChain::from_settings(&settings);
    let mut reconciler = Reconciler::new(
        client,
        kind,
        settings.default_path.clone(),
        settings.required_label.clone(),
    );
    info!(%kind, "reconcile loop started");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!(%kind, "reconcile loop stopping");
                return Ok(());
            }
            event = events.recv() => {
                let Some(event) = event else {
                    return Err(DaemonError::Cluster(ClusterError::WatchClosed));
                };
                if !chain.allows(&event) {
                    tracing::trace!(%kind, object = %event.object().reference(), "event filtered");
                    continue;
                }
                reconciler.handle(event).await;
            }
        }
    }
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task {
            name: task,
            message: err.to_string(),
        }),
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
