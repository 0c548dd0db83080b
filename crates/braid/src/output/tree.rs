//! Hierarchy tree rendering for `braid tree` output.

use std::io::{self, Write};

use colored::Colorize;

use super::{OutputConfig, OutputMode, colorize_id, colorize_priority, print_json};
use crate::store::TreeNode;

/// Print a hierarchy tree with ASCII/Unicode connectors.
///
/// Renders a tree like:
/// ```text
/// ◆ bd-a3f8 [P1] Ship auth epic
/// ├── bd-a3f8.1 [P2] Login form
/// │   └── bd-a3f8.1.1 [P2] Validation
/// └── bd-a3f8.2 [P3] Logout
/// ```
///
/// # Errors
///
/// Returns an error when writing to stdout fails.
pub fn print_tree(root: &TreeNode, mode: OutputMode, config: &OutputConfig) -> io::Result<()> {
    match mode {
        OutputMode::Json => print_json(root),
        OutputMode::Text => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            print_tree_text(&mut handle, root, config)
        }
    }
}

fn print_tree_text<W: Write>(w: &mut W, root: &TreeNode, config: &OutputConfig) -> io::Result<()> {
    let icon = if config.use_ascii { "*" } else { "◆" };
    let icon = if config.use_colors {
        icon.cyan().bold().to_string()
    } else {
        icon.to_string()
    };

    writeln!(
        w,
        "{} {} [{}] {}",
        icon,
        colorize_id(root.issue.id.as_str(), config),
        colorize_priority(root.issue.priority, config),
        root.issue.title
    )?;

    print_children(w, &root.children, &[], config)
}

/// `prefix_segments` records, per ancestor level, whether more siblings
/// follow below it (drawing `│` vs blank).
fn print_children<W: Write>(
    w: &mut W,
    children: &[TreeNode],
    prefix_segments: &[bool],
    config: &OutputConfig,
) -> io::Result<()> {
    let (branch, corner, pipe, space) = if config.use_ascii {
        ("|-- ", "`-- ", "|   ", "    ")
    } else {
        ("├── ", "└── ", "│   ", "    ")
    };

    for (i, child) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;

        let mut prefix = String::new();
        for &has_more in prefix_segments {
            let segment = if has_more { pipe } else { space };
            if config.use_colors {
                prefix.push_str(&segment.dimmed().to_string());
            } else {
                prefix.push_str(segment);
            }
        }

        let connector = if is_last { corner } else { branch };
        let connector = if config.use_colors {
            connector.dimmed().to_string()
        } else {
            connector.to_string()
        };

        writeln!(
            w,
            "{}{}{} [{}] {}",
            prefix,
            connector,
            colorize_id(child.issue.id.as_str(), config),
            colorize_priority(child.issue.priority, config),
            child.issue.title
        )?;

        let mut next_segments = prefix_segments.to_vec();
        next_segments.push(!is_last);
        print_children(w, &child.children, &next_segments, config)?;
    }

    Ok(())
}
