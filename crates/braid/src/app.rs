//! Application context for CLI command execution.
//!
//! `App` discovers the workspace root, loads configuration, takes the
//! single-writer store lock, and opens the store. Every CLI invocation
//! that mutates the store runs in this direct mode; the daemon is only
//! *notified* afterwards so it can fold the change into its next
//! reconciliation cycle. Direct CLI access and daemon-mediated access to
//! the same workspace at the same moment is disallowed by convention, not
//! enforced by the protocol.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::{
    BRAID_DIR_NAME, BraidConfig, CONFIG_FILE_NAME, ISSUES_FILE_NAME, STORE_LOCK_FILE_NAME,
    find_workspace_root,
};
use crate::error::{Error, Result};
use crate::ipc::DaemonClient;
use crate::lock::LockFile;
use crate::store::Store;

/// Application context for CLI operations.
#[derive(Debug)]
pub struct App {
    workspace_root: PathBuf,
    braid_dir: PathBuf,
    config: BraidConfig,
    store: Store,
    _store_lock: LockFile,
}

impl App {
    /// Create an App by searching upward from `working_dir` for a
    /// workspace.
    ///
    /// # Errors
    ///
    /// Fails when no workspace is found, configuration cannot be loaded,
    /// another process holds the store lock, or the database is
    /// unreadable.
    pub async fn from_directory(working_dir: &Path) -> Result<Self> {
        let workspace_root = find_workspace_root(working_dir).ok_or_else(|| {
            Error::Config(
                "not a braid workspace (or any parent); run `braid init` first".to_string(),
            )
        })?;
        let braid_dir = workspace_root.join(BRAID_DIR_NAME);

        let config = BraidConfig::load(&braid_dir.join(CONFIG_FILE_NAME)).await?;

        let store_lock = LockFile::acquire(&braid_dir.join(STORE_LOCK_FILE_NAME))?;

        let issues_path = braid_dir.join(ISSUES_FILE_NAME);
        let (store, report) = Store::open(issues_path, config.issue_prefix.clone()).await?;
        for warning in &report.warnings {
            warn!("load: {warning}");
        }
        if !report.tombstones.is_empty() {
            warn!(
                count = report.tombstones.len(),
                "load synthesized tombstone parents"
            );
        }

        Ok(Self {
            workspace_root,
            braid_dir,
            config,
            store,
            _store_lock: store_lock,
        })
    }

    /// The store opened for this workspace.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Workspace root (the directory holding `.braid/`).
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// The `.braid` metadata directory.
    #[must_use]
    pub fn braid_dir(&self) -> &Path {
        &self.braid_dir
    }

    /// Loaded configuration (env overrides already applied).
    #[must_use]
    pub fn config(&self) -> &BraidConfig {
        &self.config
    }

    /// Force direct mode for this invocation (the `--no-daemon` flag).
    pub fn set_no_daemon(&mut self) {
        self.config.sync.no_daemon = true;
    }

    /// Path of the interchange database.
    #[must_use]
    pub fn issues_path(&self) -> PathBuf {
        self.braid_dir.join(ISSUES_FILE_NAME)
    }

    /// A client for this workspace's daemon.
    #[must_use]
    pub fn daemon_client(&self) -> DaemonClient {
        DaemonClient::for_workspace(&self.workspace_root)
    }

    /// Persist the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn save(&self) -> Result<()> {
        self.store.save().await
    }

    /// Persist the store, then tell the daemon there is work to fold into
    /// its next cycle. Daemon failures never fail the command: the daemon
    /// is an optimization, the file on disk is the source of truth.
    ///
    /// Returns a human-readable note when something noteworthy happened
    /// (daemon spawned, or running without one).
    ///
    /// # Errors
    ///
    /// Returns an error only if persisting the store fails.
    pub async fn save_and_notify(&self) -> Result<Option<String>> {
        self.save().await?;

        if self.config.sync.no_daemon {
            return Ok(None);
        }

        let client = self.daemon_client();
        match client.sync(false).await {
            Ok(_) => {
                debug!("notified daemon of pending changes");
                Ok(None)
            }
            Err(e) => {
                debug!("daemon not reachable: {e}");
                client.cleanup_stale_socket().await;
                if self.config.sync.auto_start {
                    match spawn_daemon(&self.workspace_root) {
                        Ok(()) => Ok(Some("started background sync daemon".to_string())),
                        Err(spawn_err) => Ok(Some(format!(
                            "daemon unavailable ({spawn_err}); changes saved locally"
                        ))),
                    }
                } else {
                    Ok(Some("no daemon running; changes saved locally".to_string()))
                }
            }
        }
    }
}

/// Spawn `braid-daemon` for a workspace, detached from this process.
///
/// # Errors
///
/// Returns an error when the binary cannot be spawned.
pub fn spawn_daemon(workspace_root: &Path) -> std::io::Result<()> {
    std::process::Command::new("braid-daemon")
        .arg("--workspace")
        .arg(workspace_root)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use tempfile::TempDir;

    #[tokio::test]
    async fn app_opens_initialized_workspace() {
        let dir = TempDir::new().unwrap();
        config::init(dir.path(), Some("bd")).await.unwrap();

        let app = App::from_directory(dir.path()).await.unwrap();
        assert_eq!(app.config().issue_prefix, "bd");
        assert!(app.braid_dir().ends_with(".braid"));
        assert!(app.store().is_empty().await);
    }

    #[tokio::test]
    async fn app_found_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        config::init(dir.path(), Some("bd")).await.unwrap();
        let nested = dir.path().join("src").join("module");
        std::fs::create_dir_all(&nested).unwrap();

        let app = App::from_directory(&nested).await.unwrap();
        assert_eq!(app.workspace_root(), dir.path());
    }

    #[tokio::test]
    async fn uninitialized_directory_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let err = App::from_directory(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("not a braid workspace"));
        assert!(err.is_user_error());
    }

    #[tokio::test]
    async fn store_lock_blocks_second_app() {
        let dir = TempDir::new().unwrap();
        config::init(dir.path(), Some("bd")).await.unwrap();

        let _first = App::from_directory(dir.path()).await.unwrap();
        let second = App::from_directory(dir.path()).await;
        assert!(matches!(second, Err(Error::Locked { .. })));
    }
}
