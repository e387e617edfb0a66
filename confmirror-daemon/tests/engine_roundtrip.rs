//! End-to-end runs of the daemon runtime against the in-memory cluster:
//! local file edits landing in objects, objects materializing to disk,
//! and polled URLs feeding objects.

use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;

use confmirror_cluster::{ClusterClient, MemoryClient};
use confmirror_core::config::{Config, FileRule, UrlRule, WatcherSettings};
use confmirror_core::ResourceKind;
use confmirror_daemon::runtime;

const WAIT: Duration = Duration::from_secs(10);

async fn wait_for<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn file_rule(name: &str) -> FileRule {
    FileRule {
        kind: ResourceKind::ConfigMap,
        namespace: "default".to_string(),
        name: Some(name.to_string()),
        key: None,
        process: None,
        url: None,
    }
}

fn watcher_settings(default_path: PathBuf, configmaps: bool) -> WatcherSettings {
    WatcherSettings {
        configmaps,
        secrets: false,
        namespaces: Vec::new(),
        required_label: None,
        label_selector: None,
        default_path,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn file_edit_reaches_the_cluster() {
    let source = TempDir::new().expect("source dir");
    let file = source.path().join("app.conf");
    fs::write(&file, b"v0").expect("seed source file");

    let client = Arc::new(MemoryClient::new());
    let config = Config {
        files: vec![(file.clone(), file_rule("app"))],
        urls: Vec::new(),
        watcher: watcher_settings(source.path().to_path_buf(), false),
    };

    let (shutdown_tx, _) = broadcast::channel(16);
    let daemon = tokio::spawn(runtime::run(config, client.clone(), shutdown_tx.clone()));

    // The watch subscription races with the first write; keep writing the
    // final content until the object shows up.
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        fs::write(&file, b"v1").expect("write source file");
        let stored = client
            .get(ResourceKind::ConfigMap, "default", "app")
            .await
            .expect("get");
        if let Some(object) = stored {
            if object.data.get("app.conf").map(Vec::as_slice) == Some(&b"v1"[..]) {
                break;
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for file edit to reach the cluster");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    shutdown_tx.send(()).expect("signal shutdown");
    tokio::time::timeout(WAIT, daemon)
        .await
        .expect("daemon exits")
        .expect("join")
        .expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread")]
async fn object_lifecycle_materializes_and_cleans_files() {
    let target = TempDir::new().expect("target dir");
    let client = Arc::new(MemoryClient::new());
    let config = Config {
        files: Vec::new(),
        urls: Vec::new(),
        watcher: watcher_settings(target.path().to_path_buf(), true),
    };

    let (shutdown_tx, _) = broadcast::channel(16);
    let daemon = tokio::spawn(runtime::run(config, client.clone(), shutdown_tx.clone()));

    let data = [("settings.yaml".to_string(), b"answer: 42".to_vec())]
        .into_iter()
        .collect();
    client
        .upsert(ResourceKind::ConfigMap, "default", "app", data)
        .await
        .expect("create object");

    let written = target.path().join("settings.yaml");
    wait_for("object to materialize on disk", || written.is_file()).await;
    assert_eq!(
        fs::read(&written).expect("read materialized file"),
        b"answer: 42"
    );

    client
        .delete(ResourceKind::ConfigMap, "default", "app")
        .await
        .expect("request deletion");

    wait_for("cleanup to remove the file", || !written.exists()).await;

    // The reconciler's finalizer drains, so the object vanishes too.
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let stored = client
            .get(ResourceKind::ConfigMap, "default", "app")
            .await
            .expect("get");
        if stored.is_none() {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for finalizer to drain");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    shutdown_tx.send(()).expect("signal shutdown");
    tokio::time::timeout(WAIT, daemon)
        .await
        .expect("daemon exits")
        .expect("join")
        .expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread")]
async fn polled_url_feeds_an_object() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let url = format!("http://{}/", listener.local_addr().expect("local addr"));
    std::thread::spawn(move || loop {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut buf = [0u8; 4096];
        let _ = stream.read(&mut buf);
        let body = "remote-config";
        let reply = format!(
            "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(reply.as_bytes());
    });

    let client = Arc::new(MemoryClient::new());
    let config = Config {
        files: Vec::new(),
        urls: vec![(
            url.clone(),
            UrlRule {
                kind: ResourceKind::ConfigMap,
                namespace: "default".to_string(),
                name: "remote".to_string(),
                key: "config".to_string(),
                interval: Duration::from_millis(200),
            },
        )],
        watcher: watcher_settings(PathBuf::from("/tmp"), false),
    };

    let (shutdown_tx, _) = broadcast::channel(16);
    let daemon = tokio::spawn(runtime::run(config, client.clone(), shutdown_tx.clone()));

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let stored = client
            .get(ResourceKind::ConfigMap, "default", "remote")
            .await
            .expect("get");
        if let Some(object) = stored {
            assert_eq!(
                object.data.get("config").map(Vec::as_slice),
                Some(&b"remote-config"[..])
            );
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for polled body to reach the cluster");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    shutdown_tx.send(()).expect("signal shutdown");
    tokio::time::timeout(WAIT, daemon)
        .await
        .expect("daemon exits")
        .expect("join")
        .expect("clean shutdown");
}
