//! Git plumbing for the reconciliation cycle.
//!
//! Each helper shells out to `git` in the workspace root and maps failure
//! to a plain message; the caller tags it with the pipeline step. Only the
//! interchange file is ever staged — braid never commits unrelated changes.

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

/// Run `git` with the given args, capturing stdout.
async fn git(root: &Path, args: &[&str]) -> Result<String, String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .await
        .map_err(|e| format!("failed to spawn git: {e}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!(
            "git {} exited with {}: {}",
            args.first().copied().unwrap_or(""),
            output.status,
            stderr.trim()
        ))
    }
}

/// Whether `root` is inside a git work tree.
pub(crate) async fn is_git_repo(root: &Path) -> bool {
    git(root, &["rev-parse", "--is-inside-work-tree"])
        .await
        .map(|out| out.trim() == "true")
        .unwrap_or(false)
}

/// Whether the repository has any remote configured.
pub(crate) async fn has_remote(root: &Path) -> bool {
    git(root, &["remote"])
        .await
        .map(|out| !out.trim().is_empty())
        .unwrap_or(false)
}

/// Stage the interchange file and commit it if it changed.
///
/// Returns `Ok(false)` when there was nothing to commit.
pub(crate) async fn stage_and_commit(
    root: &Path,
    file: &Path,
    message: &str,
) -> Result<bool, String> {
    let file_arg = file.to_string_lossy();
    git(root, &["add", "--", &file_arg]).await?;

    // diff --cached --quiet exits 1 when something is staged.
    let staged = Command::new("git")
        .args(["diff", "--cached", "--quiet", "--", &file_arg])
        .current_dir(root)
        .status()
        .await
        .map_err(|e| format!("failed to spawn git: {e}"))?;
    if staged.success() {
        debug!("nothing staged, skipping commit");
        return Ok(false);
    }

    git(root, &["commit", "-m", message, "--", &file_arg]).await?;
    Ok(true)
}

/// Rebase local history onto the remote.
pub(crate) async fn pull_rebase(root: &Path) -> Result<(), String> {
    git(root, &["pull", "--rebase", "--autostash"]).await.map(|_| ())
}

/// Push local history.
pub(crate) async fn push(root: &Path) -> Result<(), String> {
    git(root, &["push"]).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_directory_is_not_a_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_git_repo(dir.path()).await);
    }
}
