//! Periodic URL polling into cluster objects.
//!
//! Each polled URL gets its own task: one fetch immediately, then one per
//! interval. The body lands under the rule's key; unchanged bodies leave
//! the object untouched.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use confmirror_cluster::{ClusterClient, UpsertOutcome};
use confmirror_core::config::UrlRule;

use crate::error::DaemonError;
use crate::http::RetryingClient;

pub struct Poller<C> {
    client: Arc<C>,
    http: Arc<RetryingClient>,
    rules: Vec<(String, UrlRule)>,
    cancels: Mutex<HashMap<String, mpsc::Sender<()>>>,
}

impl<C> Poller<C>
where
    C: ClusterClient + 'static,
{
    pub fn new(rules: Vec<(String, UrlRule)>, client: Arc<C>, http: Arc<RetryingClient>) -> Self {
        Poller {
            client,
            http,
            rules,
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn one polling loop per URL, then wait for shutdown and stop
    /// them all.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> Result<(), DaemonError> {
        let mut handles = Vec::new();
        for (url, rule) in self.rules.clone() {
            let (cancel_tx, cancel_rx) = mpsc::channel(1);
            self.cancels.lock().insert(url.clone(), cancel_tx);
            let this = self.clone();
            handles.push(tokio::spawn(async move {
                this.poll_loop(url, rule, cancel_rx).await;
            }));
        }
        let _ = shutdown.recv().await;
        self.stop_all();
        for handle in handles {
            let _ = handle.await;
        }
        info!("poller stopped");
        Ok(())
    }

    /// Drop every cancel sender; closed channels end the loops.
    pub fn stop_all(&self) {
        self.cancels.lock().clear();
    }

    async fn poll_loop(&self, url: String, rule: UrlRule, mut cancel: mpsc::Receiver<()>) {
        let mut interval = tokio::time::interval(rule.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.poll_once(&url, &rule).await {
                        warn!(url, error = %err, "poll failed");
                    }
                }
                _ = cancel.recv() => {
                    debug!(url, "poll loop stopped");
                    return;
                }
            }
        }
    }

    /// One fetch-and-store round. Public so a fetch can be driven directly.
    pub async fn poll_once(&self, url: &str, rule: &UrlRule) -> Result<UpsertOutcome, DaemonError> {
        let body = self.http.get_bytes(url).await?;
        let data = [(rule.key.clone(), body)].into_iter().collect();
        let outcome = self
            .client
            .upsert(rule.kind, &rule.namespace, &rule.name, data)
            .await?;
        if outcome != UpsertOutcome::Unchanged {
            info!(
                url,
                target = %format!("{}/{}/{}", rule.kind, rule.namespace, rule.name),
                op = %outcome,
                "url synced"
            );
        }
        Ok(outcome)
    }
}
