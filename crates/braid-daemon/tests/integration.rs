//! End-to-end tests: daemon task + IPC client over a real Unix socket.

use std::path::Path;
use std::time::Duration;

use braid::config;
use braid::domain::NewIssue;
use braid::error::IpcError;
use braid::ipc::{DaemonClient, Method, PROTOCOL_VERSION, Request, Response};
use braid::store::Store;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

async fn init_workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    config::init(dir.path(), Some("bd")).await.unwrap();
    dir
}

/// Start the daemon for a workspace and wait until its socket answers.
async fn start_daemon(root: &Path) -> tokio::task::JoinHandle<anyhow::Result<()>> {
    let handle = tokio::spawn(braid_daemon::run(root.to_path_buf()));

    let client = DaemonClient::for_workspace(root);
    for _ in 0..100 {
        if client.is_running().await {
            return handle;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("daemon did not come up");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_sync_shutdown_round_trip() {
    let dir = init_workspace().await;
    let handle = start_daemon(dir.path()).await;
    let client = DaemonClient::for_workspace(dir.path());

    let health = client.health().await.unwrap().unwrap();
    assert_eq!(health["state"], "running");
    assert_eq!(health["version"], PROTOCOL_VERSION);
    assert_eq!(health["pending"], false);

    // Non-immediate sync just marks the pending flag.
    let payload = client.sync(false).await.unwrap().unwrap();
    assert_eq!(payload["pending"], true);
    let health = client.health().await.unwrap().unwrap();
    assert_eq!(health["pending"], true);

    // Immediate sync runs a cycle and clears it.
    let report = client.sync(true).await.unwrap().unwrap();
    assert!(report["export_hash"].is_string());
    let health = client.health().await.unwrap().unwrap();
    assert_eq!(health["pending"], false);
    assert_eq!(health["cycles_completed"], 1);

    client.shutdown().await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("daemon exited after shutdown request");
    result.unwrap().unwrap();

    // Socket and pidfile are cleaned up on the way out.
    let braid_dir = dir.path().join(".braid");
    assert!(!braid_dir.join("daemon.sock").exists());
    assert!(!braid_dir.join("daemon.pid").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn version_mismatch_is_a_distinct_error() {
    let dir = init_workspace().await;
    let handle = start_daemon(dir.path()).await;

    // Hand-rolled request with a bogus version; the typed client always
    // sends the right one.
    let socket = dir.path().join(".braid").join("daemon.sock");
    let stream = UnixStream::connect(&socket).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();

    let request = Request {
        method: Method::Health,
        version: "0.0.0-ancient".to_string(),
        params: None,
    };
    let mut line = serde_json::to_string(&request).unwrap();
    line.push('\n');
    write_half.write_all(line.as_bytes()).await.unwrap();

    let mut reader = BufReader::new(read_half);
    let mut response_line = String::new();
    reader.read_line(&mut response_line).await.unwrap();
    let response: Response = serde_json::from_str(response_line.trim()).unwrap();

    match response {
        Response::Error { code, message } => {
            assert_eq!(
                serde_json::to_value(code).unwrap(),
                serde_json::json!("version_mismatch")
            );
            assert!(message.contains(PROTOCOL_VERSION));
        }
        Response::Ok { .. } => panic!("mismatched client must not be served"),
    }

    DaemonClient::for_workspace(dir.path()).shutdown().await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exclusive_lock_suppresses_reconciliation() {
    let dir = init_workspace().await;
    let handle = start_daemon(dir.path()).await;
    let client = DaemonClient::for_workspace(dir.path());

    // Drop an exclusive lock held by this (live) process.
    let lock_path = dir.path().join(".braid").join("sync.lock");
    std::fs::write(&lock_path, format!("{}\n", std::process::id())).unwrap();

    let health = client.health().await.unwrap().unwrap();
    assert_eq!(health["suppressed"], true);

    let err = client.sync(true).await.unwrap_err();
    assert!(matches!(err, IpcError::Daemon(_)));

    // Releasing the lock lifts the suppression.
    std::fs::remove_file(&lock_path).unwrap();
    assert!(client.sync(true).await.is_ok());

    client.shutdown().await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_exclusive_lock_is_ignored() {
    let dir = init_workspace().await;
    let handle = start_daemon(dir.path()).await;
    let client = DaemonClient::for_workspace(dir.path());

    let lock_path = dir.path().join(".braid").join("sync.lock");
    std::fs::write(&lock_path, format!("{}\n", u32::MAX - 1)).unwrap();

    let health = client.health().await.unwrap().unwrap();
    assert_eq!(health["suppressed"], false, "dead holder does not suppress");
    assert!(client.sync(true).await.is_ok());

    client.shutdown().await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_daemon_refuses_to_start() {
    let dir = init_workspace().await;
    let handle = start_daemon(dir.path()).await;

    let err = braid_daemon::run(dir.path().to_path_buf()).await.unwrap_err();
    assert!(err.to_string().contains("locked") || err.to_string().contains("Locked"));

    DaemonClient::for_workspace(dir.path()).shutdown().await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn daemon_folds_in_changes_written_by_a_direct_cli() {
    let dir = init_workspace().await;

    // A direct-mode writer creates an issue while no daemon is running.
    let issues = dir.path().join(".braid").join("issues.jsonl");
    let (store, _) = Store::open(&issues, "bd").await.unwrap();
    let created = store.create(NewIssue::titled("Written directly")).await.unwrap();
    store.save().await.unwrap();
    drop(store);

    let handle = start_daemon(dir.path()).await;
    let client = DaemonClient::for_workspace(dir.path());

    let report = client.sync(true).await.unwrap().unwrap();
    assert_eq!(report["exported"], 1);

    // The canonicalized file still holds the issue.
    let content = tokio::fs::read_to_string(&issues).await.unwrap();
    assert!(content.contains(created.id.as_str()));

    client.shutdown().await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
}
