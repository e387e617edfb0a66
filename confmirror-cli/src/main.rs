//! confmirror — mirror local files and cluster config objects.
//!
//! # Usage
//!
//! ```text
//! confmirror [--config confmirror.yaml]
//!            [--watch-configmaps] [--watch-secrets]
//!            [--namespaces ns1,ns2] [--required-label mirror]
//!            [--label-selector "app=nginx"] [--default-path /var/run/mirror]
//! ```
//!
//! Rules live in `confmirror.yaml`; flags override the watcher section.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;

use confmirror_cluster::MemoryClient;
use confmirror_core::config::{default_namespace, ConfigFile};
use confmirror_daemon::runtime;

#[derive(Parser, Debug)]
#[command(
    name = "confmirror",
    version,
    about = "Mirror local files and cluster config objects in both directions",
    long_about = None,
)]
struct Cli {
    /// Path to the rules file. Defaults to `confmirror.yaml` in the
    /// working directory, the home directory or `/etc/confmirror`.
    #[arg(long, env = "CONFMIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Mirror configmap objects to disk.
    #[arg(long, env = "CONFMIRROR_WATCH_CONFIGMAPS")]
    watch_configmaps: bool,

    /// Mirror secret objects to disk.
    #[arg(long, env = "CONFMIRROR_WATCH_SECRETS")]
    watch_secrets: bool,

    /// Comma-separated namespace allow-list for mirrored objects.
    #[arg(long, env = "CONFMIRROR_NAMESPACES")]
    namespaces: Option<String>,

    /// Only mirror objects carrying this label with a truthy value.
    #[arg(long, env = "CONFMIRROR_REQUIRED_LABEL")]
    required_label: Option<String>,

    /// Equality-based label selector, e.g. "app=nginx,tier!=debug".
    #[arg(long, env = "CONFMIRROR_LABEL_SELECTOR")]
    label_selector: Option<String>,

    /// Directory where object data is materialized by default.
    #[arg(long, env = "CONFMIRROR_DEFAULT_PATH")]
    default_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    runtime::init_tracing();
    let cli = Cli::parse();

    let mut raw = ConfigFile::discover(cli.config.as_deref())
        .context("failed to load configuration")?;
    if cli.watch_configmaps {
        raw.watcher.configmaps = true;
    }
    if cli.watch_secrets {
        raw.watcher.secrets = true;
    }
    if cli.namespaces.is_some() {
        raw.watcher.namespaces = cli.namespaces;
    }
    if cli.required_label.is_some() {
        raw.watcher.required_label = cli.required_label;
    }
    if cli.label_selector.is_some() {
        raw.watcher.label_selector = cli.label_selector;
    }
    if cli.default_path.is_some() {
        raw.watcher.default_path = cli.default_path;
    }

    let config = raw
        .validated(&default_namespace())
        .context("invalid configuration")?;

    let client = Arc::new(MemoryClient::new());
    let (shutdown_tx, _) = broadcast::channel(16);
    runtime::run(config, client, shutdown_tx)
        .await
        .context("daemon exited with an error")?;
    Ok(())
}
