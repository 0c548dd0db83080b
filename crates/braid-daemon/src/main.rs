//! Braid daemon binary.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Background sync daemon for a braid workspace.
///
/// Normally spawned by the braid CLI; run it by hand with `--workspace`
/// for debugging.
#[derive(Parser, Debug)]
#[command(name = "braid-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace root to serve (defaults to a workspace found above the
    /// current directory).
    #[arg(long)]
    workspace: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("braid=info,braid_daemon=info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let workspace_root = match args.workspace {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir()?;
            braid::config::find_workspace_root(&cwd)
                .ok_or_else(|| anyhow::anyhow!("no braid workspace found; run `braid init`"))?
        }
    };

    braid_daemon::run(workspace_root).await
}
