//! The braid sync daemon.
//!
//! One instance per workspace, identified by the socket under `.braid/`.
//! The daemon owns the debounce state: CLI mutations notify it over IPC,
//! a periodic timer folds pending changes into a reconciliation cycle
//! (export, commit, pull, import, push), and an exclusive lock file lets
//! an external tool suspend all of it.
//!
//! Lifecycle: `Starting -> Running -> ShuttingDown -> Stopped`. Shutdown
//! is cooperative: the current reconciliation step finishes, the timer is
//! cancelled, and socket/pidfile are removed on the way out.

#![forbid(unsafe_code)]

pub mod ipc;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::net::UnixListener;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use braid::config::{
    BRAID_DIR_NAME, BraidConfig, CONFIG_FILE_NAME, ISSUES_FILE_NAME, PID_FILE_NAME,
    SYNC_LOCK_FILE_NAME,
};
use braid::ipc::{PROTOCOL_VERSION, socket_path};
use braid::lock::{self, LockFile};
use braid::reconcile::{CycleReport, Reconciler};
use braid::store::Store;

/// Daemon lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DaemonPhase {
    /// Binding the socket and loading the store.
    Starting = 0,
    /// Serving requests and ticking the sync timer.
    Running = 1,
    /// Draining the in-flight cycle before exit.
    ShuttingDown = 2,
    /// Done.
    Stopped = 3,
}

impl DaemonPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}

/// Transient sync bookkeeping, owned by the daemon and discarded on
/// shutdown.
#[derive(Debug, Default)]
pub struct SyncState {
    /// Local mutations are waiting to be reconciled.
    pub pending: bool,

    /// Content hash of the last successful export.
    pub last_export_hash: Option<String>,

    /// How many cycles have completed since startup.
    pub cycles_completed: u64,

    /// How many cycles have failed since startup.
    pub cycles_failed: u64,
}

/// Shared daemon state, passed by handle into the timer task and every
/// connection handler.
pub struct DaemonContext {
    workspace_root: PathBuf,
    braid_dir: PathBuf,
    reconciler: Reconciler,
    sync_state: Mutex<SyncState>,
    phase: AtomicU8,
    shutdown_tx: watch::Sender<bool>,
    started_at: Instant,
    interval: Duration,
}

impl DaemonContext {
    /// Load the workspace and build the daemon context.
    ///
    /// # Errors
    ///
    /// Fails when the workspace is missing or its config/database cannot
    /// be loaded.
    pub async fn new(workspace_root: PathBuf) -> anyhow::Result<Arc<Self>> {
        let braid_dir = workspace_root.join(BRAID_DIR_NAME);
        if !braid_dir.exists() {
            anyhow::bail!(
                "no braid workspace at {}; run `braid init` first",
                workspace_root.display()
            );
        }

        let config = BraidConfig::load(&braid_dir.join(CONFIG_FILE_NAME)).await?;
        let issues_path = braid_dir.join(ISSUES_FILE_NAME);
        let (store, report) = Store::open(issues_path.clone(), config.issue_prefix.clone()).await?;
        for warning in &report.warnings {
            warn!("load: {warning}");
        }

        let reconciler = Reconciler::new(store, workspace_root.clone(), issues_path);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Arc::new(Self {
            workspace_root,
            braid_dir,
            reconciler,
            sync_state: Mutex::new(SyncState::default()),
            phase: AtomicU8::new(DaemonPhase::Starting as u8),
            shutdown_tx,
            started_at: Instant::now(),
            interval: Duration::from_secs(config.sync.interval_secs.max(1)),
        }))
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> DaemonPhase {
        DaemonPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    fn set_phase(&self, phase: DaemonPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    /// Workspace root this daemon serves.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Whether an external exclusive lock currently suppresses
    /// reconciliation.
    #[must_use]
    pub fn sync_suppressed(&self) -> bool {
        lock::is_held(&self.braid_dir.join(SYNC_LOCK_FILE_NAME))
    }

    /// Mark that local mutations are waiting for the next timer tick.
    pub async fn mark_pending(&self) {
        self.sync_state.lock().await.pending = true;
    }

    /// Request cooperative shutdown.
    pub fn request_shutdown(&self) {
        self.set_phase(DaemonPhase::ShuttingDown);
        let _ = self.shutdown_tx.send(true);
    }

    /// A receiver that resolves once shutdown has been requested.
    #[must_use]
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Run a reconciliation cycle now, regardless of the pending flag.
    ///
    /// # Errors
    ///
    /// Propagates the failing step; the pending flag stays set so the
    /// timer retries.
    pub async fn force_cycle(&self) -> braid::Result<CycleReport> {
        if self.sync_suppressed() {
            return Err(braid::Error::Config(
                "reconciliation suppressed by exclusive sync lock".to_string(),
            ));
        }
        let result = self.reconciler.run_cycle().await;
        let mut state = self.sync_state.lock().await;
        match &result {
            Ok(report) => {
                state.pending = false;
                state.last_export_hash = Some(report.export_hash.clone());
                state.cycles_completed += 1;
            }
            Err(_) => {
                state.cycles_failed += 1;
            }
        }
        result
    }

    /// Timer-tick entry: run a cycle when something is pending and the
    /// exclusive lock is not held. Failures are logged and retried on the
    /// next tick, never escalated.
    pub async fn run_cycle_if_pending(&self) {
        let pending = self.sync_state.lock().await.pending;
        if !pending {
            return;
        }
        if self.sync_suppressed() {
            info!("pending changes held back by exclusive sync lock");
            return;
        }
        if let Err(e) = self.force_cycle().await {
            warn!("scheduled reconciliation failed, will retry: {e}");
        }
    }

    /// Health payload served over IPC.
    pub async fn health_payload(&self) -> Value {
        let state = self.sync_state.lock().await;
        json!({
            "version": PROTOCOL_VERSION,
            "state": self.phase().name(),
            "cycle_phase": self.reconciler.phase(),
            "workspace": self.workspace_root.display().to_string(),
            "uptime_secs": self.started_at.elapsed().as_secs(),
            "interval_secs": self.interval.as_secs(),
            "pending": state.pending,
            "suppressed": self.sync_suppressed(),
            "last_export_hash": state.last_export_hash,
            "cycles_completed": state.cycles_completed,
            "cycles_failed": state.cycles_failed,
        })
    }

    /// Wait for any in-flight reconciliation cycle to finish.
    pub async fn drain(&self) {
        self.reconciler.wait_idle().await;
    }
}

/// Run the daemon until a shutdown request or signal arrives.
///
/// # Errors
///
/// Fails on startup problems (another live daemon, unbindable socket);
/// runtime reconciliation errors are retried, not fatal.
pub async fn run(workspace_root: PathBuf) -> anyhow::Result<()> {
    let ctx = DaemonContext::new(workspace_root).await?;

    // The pidfile doubles as the single-instance guard.
    let pidfile = LockFile::acquire(&ctx.braid_dir.join(PID_FILE_NAME))?;

    let socket = socket_path(&ctx.workspace_root);
    if socket.exists() {
        // A previous daemon died without cleanup; the pidfile said no one
        // is alive, so the socket is stale.
        std::fs::remove_file(&socket)?;
    }
    let listener = UnixListener::bind(&socket)?;
    info!(socket = %socket.display(), "braid daemon listening");
    ctx.set_phase(DaemonPhase::Running);

    let timer_ctx = Arc::clone(&ctx);
    let mut timer_shutdown = ctx.shutdown_rx();
    let timer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(timer_ctx.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => timer_ctx.run_cycle_if_pending().await,
                _ = timer_shutdown.changed() => break,
            }
        }
    });

    let mut accept_shutdown = ctx.shutdown_rx();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let conn_ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        if let Err(e) = ipc::handle_connection(conn_ctx, stream).await {
                            warn!("connection error: {e}");
                        }
                    });
                }
                Err(e) => warn!("accept error: {e}"),
            },
            _ = accept_shutdown.changed() => break,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                ctx.request_shutdown();
                break;
            }
        }
    }

    // Cooperative shutdown: let the in-flight cycle finish, stop the
    // timer, then remove the runtime files.
    ctx.set_phase(DaemonPhase::ShuttingDown);
    ctx.drain().await;
    timer.abort();
    let _ = std::fs::remove_file(&socket);
    drop(pidfile);
    ctx.set_phase(DaemonPhase::Stopped);
    info!("braid daemon stopped");
    Ok(())
}
