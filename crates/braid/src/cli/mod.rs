//! CLI argument parsing and command dispatch.
//!
//! # Commands
//!
//! Issue lifecycle: `init`, `create`, `show`, `list`, `update`, `close`,
//! `reopen`, `delete`, `label`. Graph: `dep`, `ready`, `blocked`, `tree`,
//! `chain`, `cycles`. Reconciliation: `export`, `import`, `duplicates`,
//! `merge`, `sync`. Daemon: `daemon start|stop|restart|health`, plus
//! `info`.
//!
//! # Global flags
//!
//! - `--json`: machine-readable output for every command
//! - `--no-daemon`: operate directly on the store, never notify or spawn
//!   a daemon (the mode used from git worktrees)

mod args;
mod execute;
mod types;

use anyhow::Result;
use clap::{Parser, Subcommand};

pub use args::{
    ChainArgs, CloseArgs, CreateArgs, DaemonAction, DaemonArgs, DeleteArgs, DepAction, DepArgs,
    ExportArgs, ImportArgs, InitArgs, LabelAction, LabelArgs, ListArgs, MergeArgs, ReadyArgs,
    ReopenArgs, ShowArgs, SyncArgs, TreeArgs, UpdateArgs,
};
pub use types::{DependencyTypeArg, IssueStatusArg, IssueTypeArg};

use crate::output::OutputMode;

/// Braid - a git-backed issue tracker for humans and agents
///
/// Issues and their dependency graph live in `.braid/issues.jsonl`,
/// reconciled through git by a per-workspace background daemon.
#[derive(Parser, Debug)]
#[command(name = "braid")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format for programmatic use.
    #[arg(long, global = true)]
    pub json: bool,

    /// Operate directly on the store without a daemon.
    #[arg(long, global = true)]
    pub no_daemon: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Initialize a new braid workspace
    Init(InitArgs),

    /// Show workspace information and issue counts
    Info,

    /// Create a new issue
    Create(CreateArgs),

    /// Show detailed information about an issue
    Show(ShowArgs),

    /// List issues with optional filters
    List(ListArgs),

    /// Update fields of an existing issue
    Update(UpdateArgs),

    /// Close one or more issues
    Close(CloseArgs),

    /// Reopen a closed issue
    Reopen(ReopenArgs),

    /// Delete an issue permanently, cascading its edges
    Delete(DeleteArgs),

    /// Add or remove labels
    Label(LabelArgs),

    /// Add or remove dependency edges
    Dep(DepArgs),

    /// Show open issues with no unresolved blockers
    Ready(ReadyArgs),

    /// Show open issues waiting on blockers
    Blocked,

    /// Show the epic hierarchy below an issue
    Tree(TreeArgs),

    /// Show the shortest blocking chain between two issues
    Chain(ChainArgs),

    /// Audit the dependency graph for cycles
    Cycles,

    /// Write the interchange snapshot to stdout or a file
    Export(ExportArgs),

    /// Apply an interchange file to the store
    Import(ImportArgs),

    /// List groups of content-identical issues
    Duplicates,

    /// Merge duplicate issues into a target
    Merge(MergeArgs),

    /// Run or request a reconciliation cycle
    Sync(SyncArgs),

    /// Manage the workspace sync daemon
    Daemon(DaemonArgs),
}

impl Cli {
    /// Parse command-line arguments.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Execute the parsed command.
    ///
    /// # Errors
    ///
    /// Propagates command failures; `main` maps them onto exit codes.
    pub async fn execute(self) -> Result<()> {
        let mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };
        execute::run(self.command, mode, self.no_daemon).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_create_with_deps() {
        let cli = Cli::try_parse_from([
            "braid", "create", "Fix login", "--priority", "1", "--type", "bug", "--deps",
            "blocks:bd-aaaa,bd-bbbb",
        ])
        .unwrap();
        match cli.command {
            Commands::Create(args) => {
                assert_eq!(args.title, "Fix login");
                assert_eq!(args.priority, 1);
                assert_eq!(args.deps.len(), 2);
            }
            other => panic!("parsed wrong command: {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_out_of_range_priority() {
        assert!(Cli::try_parse_from(["braid", "create", "T", "--priority", "7"]).is_err());
    }

    #[test]
    fn global_flags_are_accepted_after_subcommand() {
        let cli = Cli::try_parse_from(["braid", "ready", "--json", "--no-daemon"]).unwrap();
        assert!(cli.json);
        assert!(cli.no_daemon);
    }

    #[test]
    fn merge_requires_target() {
        assert!(Cli::try_parse_from(["braid", "merge", "bd-aaaa"]).is_err());
        assert!(
            Cli::try_parse_from(["braid", "merge", "bd-aaaa", "--into", "bd-bbbb"]).is_ok()
        );
    }
}
