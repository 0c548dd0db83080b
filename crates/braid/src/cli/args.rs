//! CLI argument structs for all commands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::types::{DependencyTypeArg, IssueStatusArg, IssueTypeArg};
use crate::domain::{MAX_PRIORITY, MIN_PRIORITY};

/// Arguments for the `init` command.
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Issue ID prefix (e.g. "bd" for "bd-a3f8"); 2-20 alphanumeric chars.
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Suppress output messages.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the `create` command.
#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// Issue title.
    pub title: String,

    /// Detailed description.
    #[arg(short = 'D', long)]
    pub description: Option<String>,

    /// Priority level (0=critical .. 4=backlog).
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(MIN_PRIORITY as i64..=MAX_PRIORITY as i64), default_value = "2")]
    pub priority: u8,

    /// Issue type.
    #[arg(short = 't', long = "type", value_enum, default_value = "task")]
    pub issue_type: IssueTypeArg,

    /// Assignee username.
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Labels (comma-separated).
    #[arg(short, long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Owning epic; the issue gets a hierarchical child id under it.
    #[arg(long)]
    pub epic: Option<String>,

    /// Dependencies (comma-separated), as "issue-id" or "type:issue-id".
    #[arg(long, value_delimiter = ',')]
    pub deps: Vec<String>,
}

/// Arguments for the `list` command.
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Filter by status.
    #[arg(short, long, value_enum)]
    pub status: Option<IssueStatusArg>,

    /// Filter by priority.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(MIN_PRIORITY as i64..=MAX_PRIORITY as i64))]
    pub priority: Option<u8>,

    /// Filter by issue type.
    #[arg(short = 't', long = "type", value_enum)]
    pub issue_type: Option<IssueTypeArg>,

    /// Filter by assignee.
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Filter by label.
    #[arg(short, long)]
    pub label: Option<String>,

    /// Maximum number of issues to display.
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

/// Arguments for the `show` command.
#[derive(Parser, Debug, Clone)]
pub struct ShowArgs {
    /// Issue ID to display.
    pub issue_id: String,
}

/// Arguments for the `update` command.
#[derive(Parser, Debug, Clone)]
pub struct UpdateArgs {
    /// Issue ID to update.
    pub issue_id: String,

    /// New title.
    #[arg(long)]
    pub title: Option<String>,

    /// New description.
    #[arg(short = 'D', long)]
    pub description: Option<String>,

    /// New status.
    #[arg(short, long, value_enum)]
    pub status: Option<IssueStatusArg>,

    /// New priority.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(MIN_PRIORITY as i64..=MAX_PRIORITY as i64))]
    pub priority: Option<u8>,

    /// New assignee.
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Clear the assignee.
    #[arg(long, conflicts_with = "assignee")]
    pub no_assignee: bool,

    /// Replace the label set (comma-separated).
    #[arg(short, long, value_delimiter = ',')]
    pub labels: Option<Vec<String>>,
}

/// Arguments for the `close` command.
#[derive(Parser, Debug, Clone)]
pub struct CloseArgs {
    /// Issue IDs to close; failures are reported per id.
    #[arg(required = true)]
    pub issue_ids: Vec<String>,

    /// Reason for closing.
    #[arg(short, long, default_value = "Completed")]
    pub reason: String,
}

/// Arguments for the `reopen` command.
#[derive(Parser, Debug, Clone)]
pub struct ReopenArgs {
    /// Issue ID to reopen.
    pub issue_id: String,
}

/// Arguments for the `delete` command.
#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Issue ID to delete permanently.
    pub issue_id: String,
}

/// Label subcommand actions.
#[derive(Subcommand, Debug, Clone)]
pub enum LabelAction {
    /// Add a label to an issue.
    Add {
        /// Issue ID.
        issue_id: String,
        /// Label to add.
        label: String,
    },
    /// Remove a label from an issue.
    Remove {
        /// Issue ID.
        issue_id: String,
        /// Label to remove.
        label: String,
    },
}

/// Arguments for the `label` command.
#[derive(Parser, Debug, Clone)]
pub struct LabelArgs {
    /// Add or remove.
    #[command(subcommand)]
    pub action: LabelAction,
}

/// Dep subcommand actions.
#[derive(Subcommand, Debug, Clone)]
pub enum DepAction {
    /// Add a dependency edge.
    Add {
        /// Dependent issue id.
        from: String,
        /// Target issue id.
        to: String,
        /// Edge type.
        #[arg(short = 't', long = "type", value_enum, default_value = "blocks")]
        dep_type: DependencyTypeArg,
    },
    /// Remove a dependency edge (no-op when absent).
    Remove {
        /// Dependent issue id.
        from: String,
        /// Target issue id.
        to: String,
        /// Edge type.
        #[arg(short = 't', long = "type", value_enum, default_value = "blocks")]
        dep_type: DependencyTypeArg,
    },
}

/// Arguments for the `dep` command.
#[derive(Parser, Debug, Clone)]
pub struct DepArgs {
    /// Add or remove.
    #[command(subcommand)]
    pub action: DepAction,
}

/// Arguments for the `ready` command.
#[derive(Parser, Debug, Clone)]
pub struct ReadyArgs {
    /// Filter by assignee.
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Filter by priority.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(MIN_PRIORITY as i64..=MAX_PRIORITY as i64))]
    pub priority: Option<u8>,

    /// Filter by label.
    #[arg(short, long)]
    pub label: Option<String>,

    /// Maximum number of issues to display.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

/// Arguments for the `tree` command.
#[derive(Parser, Debug, Clone)]
pub struct TreeArgs {
    /// Root issue ID.
    pub issue_id: String,

    /// Maximum depth to expand.
    #[arg(short, long)]
    pub depth: Option<usize>,
}

/// Arguments for the `chain` command.
#[derive(Parser, Debug, Clone)]
pub struct ChainArgs {
    /// Start issue id.
    pub from: String,

    /// Goal issue id.
    pub to: String,
}

/// Arguments for the `export` command.
#[derive(Parser, Debug, Clone)]
pub struct ExportArgs {
    /// Write to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the `import` command.
#[derive(Parser, Debug, Clone)]
pub struct ImportArgs {
    /// JSONL file to import (defaults to the workspace database, which
    /// re-applies whatever landed there via git).
    pub input: Option<PathBuf>,
}

/// Arguments for the `merge` command.
#[derive(Parser, Debug, Clone)]
pub struct MergeArgs {
    /// Source issue ids to merge away.
    #[arg(required = true)]
    pub sources: Vec<String>,

    /// Merge target.
    #[arg(long = "into", required = true)]
    pub target: String,

    /// Report what would happen without mutating anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `sync` command.
#[derive(Parser, Debug, Clone)]
pub struct SyncArgs {
    /// Run the cycle in this process even if a daemon is running.
    #[arg(long)]
    pub direct: bool,
}

/// Daemon management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum DaemonAction {
    /// Start the workspace daemon.
    Start,
    /// Stop the workspace daemon.
    Stop,
    /// Restart the workspace daemon.
    Restart,
    /// Query daemon health.
    Health,
}

/// Arguments for the `daemon` command.
#[derive(Parser, Debug, Clone)]
pub struct DaemonArgs {
    /// Management action.
    #[command(subcommand)]
    pub action: DaemonAction,
}
