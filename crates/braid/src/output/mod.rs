//! Output formatting for CLI commands.
//!
//! Every command can render as human-readable text or as JSON (the global
//! `--json` flag); the split lives here so command logic never touches
//! formatting.
//!
//! Semantic color theme: green for done, yellow for in-progress, red for
//! blocked/urgent, cyan for issue ids, dimmed for connectors and metadata.

pub mod tree;

use std::env;
use std::io::{self, IsTerminal, Write};

use colored::Colorize;
use serde::Serialize;

use crate::domain::{Issue, IssueId, IssueStatus};

/// How command output should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Formatting configuration, read once from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// ASCII-only connectors and icons.
    pub use_ascii: bool,
    /// Colored output.
    pub use_colors: bool,
}

impl OutputConfig {
    /// Read `BRAID_ASCII`, `NO_COLOR`, and TTY state.
    #[must_use]
    pub fn from_env() -> Self {
        let use_ascii = env::var("BRAID_ASCII")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        // NO_COLOR (https://no-color.org/) wins over everything; otherwise
        // color only when stdout is a terminal.
        let use_colors = env::var("NO_COLOR").is_err() && io::stdout().is_terminal();

        Self {
            use_ascii,
            use_colors,
        }
    }
}

/// Serialize a value as pretty JSON to stdout.
///
/// # Errors
///
/// Returns an error when serialization or the write fails.
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let out = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{out}")
}

/// One-line issue summary: `bd-a3f8 [P1] [open] Title (labels)`.
#[must_use]
pub fn issue_line(issue: &Issue, config: &OutputConfig) -> String {
    let id = colorize_id(issue.id.as_str(), config);
    let priority = colorize_priority(issue.priority, config);
    let status = colorize_status(issue.status, config);
    let labels = if issue.labels.is_empty() {
        String::new()
    } else {
        let joined = format!(" ({})", issue.labels.join(", "));
        if config.use_colors {
            joined.magenta().to_string()
        } else {
            joined
        }
    };
    format!("{id} [{priority}] [{status}] {}{labels}", issue.title)
}

/// Multi-line issue detail block.
#[must_use]
pub fn issue_details(issue: &Issue, config: &OutputConfig) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", issue_line(issue, config)));
    if !issue.description.is_empty() {
        out.push_str(&format!("\n{}\n", issue.description));
    }
    out.push('\n');
    out.push_str(&format!("  type:       {}\n", issue.issue_type));
    if let Some(epic) = &issue.epic_id {
        out.push_str(&format!("  epic:       {epic}\n"));
    }
    if let Some(assignee) = &issue.assignee {
        out.push_str(&format!("  assignee:   {assignee}\n"));
    }
    out.push_str(&format!(
        "  created:    {}\n",
        issue.created_at.format("%Y-%m-%d %H:%M UTC")
    ));
    out.push_str(&format!(
        "  updated:    {}\n",
        issue.updated_at.format("%Y-%m-%d %H:%M UTC")
    ));
    if let Some(closed_at) = issue.closed_at {
        out.push_str(&format!(
            "  closed:     {}\n",
            closed_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    if let Some(reason) = &issue.close_reason {
        out.push_str(&format!("  reason:     {reason}\n"));
    }
    out
}

/// Render a blocked-issue row with its blockers.
#[must_use]
pub fn blocked_line(issue: &Issue, blockers: &[IssueId], config: &OutputConfig) -> String {
    let blocker_list = blockers
        .iter()
        .map(|id| colorize_id(id.as_str(), config))
        .collect::<Vec<_>>()
        .join(", ");
    let arrow = if config.use_ascii { "<-" } else { "←" };
    format!(
        "{} {arrow} waiting on {blocker_list}",
        issue_line(issue, config)
    )
}

/// Render a dependency chain as `a -> b -> c`.
#[must_use]
pub fn chain_line(path: &[IssueId], config: &OutputConfig) -> String {
    let arrow = if config.use_ascii { " -> " } else { " → " };
    path.iter()
        .map(|id| colorize_id(id.as_str(), config))
        .collect::<Vec<_>>()
        .join(arrow)
}

pub(crate) fn colorize_id(id: &str, config: &OutputConfig) -> String {
    if config.use_colors {
        id.cyan().to_string()
    } else {
        id.to_string()
    }
}

pub(crate) fn colorize_priority(priority: u8, config: &OutputConfig) -> String {
    let text = format!("P{priority}");
    if !config.use_colors {
        return text;
    }
    match priority {
        0 => text.red().bold().to_string(),
        1 => text.yellow().to_string(),
        _ => text,
    }
}

pub(crate) fn colorize_status(status: IssueStatus, config: &OutputConfig) -> String {
    let text = status.to_string();
    if !config.use_colors {
        return text;
    }
    match status {
        IssueStatus::Open => text.white().to_string(),
        IssueStatus::InProgress => text.yellow().to_string(),
        IssueStatus::Blocked => text.red().to_string(),
        IssueStatus::Resolved | IssueStatus::Closed => text.green().to_string(),
        IssueStatus::Archived => text.dimmed().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IssueType, NewIssue};
    use chrono::Utc;

    fn plain() -> OutputConfig {
        OutputConfig {
            use_ascii: true,
            use_colors: false,
        }
    }

    fn sample_issue() -> Issue {
        let new = NewIssue::titled("Fix login");
        Issue {
            id: IssueId::new("bd-a3f8"),
            title: new.title,
            description: String::new(),
            status: IssueStatus::Open,
            priority: 1,
            issue_type: IssueType::Bug,
            epic_id: None,
            assignee: None,
            labels: vec!["auth".to_string()],
            close_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            closed_at: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn issue_line_contains_id_priority_status() {
        let line = issue_line(&sample_issue(), &plain());
        assert_eq!(line, "bd-a3f8 [P1] [open] Fix login (auth)");
    }

    #[test]
    fn chain_uses_ascii_arrows_when_asked() {
        let path = vec![IssueId::new("bd-1"), IssueId::new("bd-2")];
        assert_eq!(chain_line(&path, &plain()), "bd-1 -> bd-2");
    }
}
