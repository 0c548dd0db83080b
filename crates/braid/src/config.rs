//! Workspace configuration and initialization.
//!
//! A braid workspace is a directory holding `.braid/` with the config file
//! and the interchange database. Configuration comes from
//! `.braid/config.yaml` with `BRAID_*` environment overrides applied once
//! at process start; nothing is hot-reloaded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{Error, Result, ValidationError};

/// Default issue prefix if none specified.
pub const DEFAULT_PREFIX: &str = "bd";

/// Name of the braid metadata directory.
pub const BRAID_DIR_NAME: &str = ".braid";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the interchange database file.
pub const ISSUES_FILE_NAME: &str = "issues.jsonl";

/// Name of the daemon's Unix socket.
pub const SOCKET_FILE_NAME: &str = "daemon.sock";

/// Name of the daemon pid file.
pub const PID_FILE_NAME: &str = "daemon.pid";

/// Name of the exclusive sync lock an external tool may hold.
pub const SYNC_LOCK_FILE_NAME: &str = "sync.lock";

/// Name of the single-writer store lock used by direct-mode invocations.
pub const STORE_LOCK_FILE_NAME: &str = "store.lock";

/// Minimum prefix length.
pub const MIN_PREFIX_LENGTH: usize = 2;

/// Maximum prefix length.
pub const MAX_PREFIX_LENGTH: usize = 20;

/// Maximum directory depth to traverse when searching for a workspace root.
pub const MAX_TRAVERSAL_DEPTH: usize = 256;

/// Default reconciliation interval in seconds.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 5;

/// Configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BraidConfig {
    /// Issue ID prefix (e.g. "bd" for "bd-a3f8").
    #[serde(rename = "issue-prefix")]
    pub issue_prefix: String,

    /// Daemon/sync settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Daemon and synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    /// Reconciliation timer interval in seconds.
    #[serde(rename = "interval-secs", default = "default_interval")]
    pub interval_secs: u64,

    /// Whether CLI mutations may spawn a daemon when none is running.
    #[serde(rename = "auto-start", default = "default_auto_start")]
    pub auto_start: bool,

    /// Operate directly on the store, never through a daemon.
    #[serde(rename = "no-daemon", default)]
    pub no_daemon: bool,
}

fn default_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

fn default_auto_start() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            auto_start: true,
            no_daemon: false,
        }
    }
}

impl BraidConfig {
    /// A fresh configuration with the given prefix.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            issue_prefix: prefix.to_string(),
            sync: SyncConfig::default(),
        }
    }

    /// Load configuration from a file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is unreadable or not valid YAML.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let mut config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.apply_env();
        Ok(config)
    }

    /// Save configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Apply `BRAID_SYNC_INTERVAL`, `BRAID_AUTO_START`, and
    /// `BRAID_NO_DAEMON` overrides.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("BRAID_SYNC_INTERVAL") {
            if let Ok(secs) = value.trim().parse::<u64>() {
                self.sync.interval_secs = secs.max(1);
            }
        }
        if let Ok(value) = std::env::var("BRAID_AUTO_START") {
            self.sync.auto_start = parse_bool(&value);
        }
        if let Ok(value) = std::env::var("BRAID_NO_DAEMON") {
            self.sync.no_daemon = parse_bool(&value);
        }
    }
}

impl Default for BraidConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

fn parse_bool(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false" | "no" | "off")
}

/// Result of workspace initialization.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the created `.braid` directory.
    pub braid_dir: PathBuf,
    /// Path to the created config file.
    pub config_file: PathBuf,
    /// Path to the created interchange file.
    pub issues_file: PathBuf,
    /// The prefix configured for issue ids.
    pub prefix: String,
}

/// Validate an issue id prefix: 2-20 alphanumeric characters.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidPrefix`] describing the problem.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.len() < MIN_PREFIX_LENGTH {
        return Err(ValidationError::InvalidPrefix(format!(
            "must be at least {MIN_PREFIX_LENGTH} characters"
        ))
        .into());
    }
    if prefix.len() > MAX_PREFIX_LENGTH {
        return Err(ValidationError::InvalidPrefix(format!(
            "cannot exceed {MAX_PREFIX_LENGTH} characters"
        ))
        .into());
    }
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(
            ValidationError::InvalidPrefix("must contain only alphanumeric characters".into())
                .into(),
        );
    }
    Ok(())
}

/// Initialize a new braid workspace under `base_dir`.
///
/// # Errors
///
/// Fails when the workspace already exists, the prefix is invalid, or file
/// creation fails.
pub async fn init(base_dir: &Path, prefix: Option<&str>) -> Result<InitResult> {
    let prefix = prefix.unwrap_or(DEFAULT_PREFIX).trim();
    validate_prefix(prefix)?;

    let braid_dir = base_dir.join(BRAID_DIR_NAME);
    if braid_dir.exists() {
        return Err(Error::Config(format!(
            "braid is already initialized here: found existing '{BRAID_DIR_NAME}'"
        )));
    }

    fs::create_dir_all(&braid_dir).await?;

    let config_file = braid_dir.join(CONFIG_FILE_NAME);
    BraidConfig::new(prefix).save(&config_file).await?;

    let issues_file = braid_dir.join(ISSUES_FILE_NAME);
    fs::write(&issues_file, "").await?;

    // Runtime files never belong in version control; the database does.
    let gitignore = braid_dir.join(".gitignore");
    fs::write(
        &gitignore,
        "daemon.sock\ndaemon.pid\nsync.lock\nstore.lock\n*.tmp\n",
    )
    .await?;

    Ok(InitResult {
        braid_dir,
        config_file,
        issues_file,
        prefix: prefix.to_string(),
    })
}

/// Find the workspace root by walking up from `start_dir`.
#[must_use]
pub fn find_workspace_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    let mut depth = 0;

    loop {
        if current.join(BRAID_DIR_NAME).exists() {
            return Some(current);
        }
        depth += 1;
        if depth > MAX_TRAVERSAL_DEPTH || !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case::short("bd")]
    #[case::word("track")]
    #[case::mixed("Team42")]
    fn valid_prefixes(#[case] prefix: &str) {
        assert!(validate_prefix(prefix).is_ok());
    }

    #[rstest]
    #[case::single("a")]
    #[case::empty("")]
    #[case::hyphen("my-proj")]
    #[case::space("my proj")]
    fn invalid_prefixes(#[case] prefix: &str) {
        assert!(validate_prefix(prefix).is_err());
    }

    #[tokio::test]
    async fn init_creates_workspace_layout() {
        let dir = TempDir::new().unwrap();
        let result = init(dir.path(), Some("bd")).await.unwrap();

        assert!(result.braid_dir.exists());
        assert!(result.config_file.exists());
        assert!(result.issues_file.exists());
        assert_eq!(result.prefix, "bd");

        let gitignore = tokio::fs::read_to_string(result.braid_dir.join(".gitignore"))
            .await
            .unwrap();
        assert!(gitignore.contains("daemon.sock"));
    }

    #[tokio::test]
    async fn init_twice_fails() {
        let dir = TempDir::new().unwrap();
        init(dir.path(), None).await.unwrap();
        let err = init(dir.path(), None).await.unwrap_err();
        assert!(err.to_string().contains("already initialized"));
    }

    #[tokio::test]
    async fn config_round_trips_through_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = BraidConfig::new("track");
        config.sync.interval_secs = 30;
        config.save(&path).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("issue-prefix: track"));
        assert!(content.contains("interval-secs: 30"));
    }

    #[test]
    fn workspace_root_found_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(BRAID_DIR_NAME)).unwrap();
        let nested = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_workspace_root(&nested),
            Some(dir.path().to_path_buf())
        );
        assert!(find_workspace_root(Path::new("/nonexistent-hopefully")).is_none());
    }
}
