use std::path::{Path, PathBuf};

use cw_core::AssignedAgent;
use tokio::process::Command;
use tracing::warn;

use crate::error::{AgentError, Result};

/// Build `agent/<type>/<slug(title)>-<shortCardId>`.
pub fn branch_name(agent: AssignedAgent, title: &str, short_card_id: &str) -> String {
    format!("agent/{}/{}-{}", agent, slug(title), short_card_id)
}

fn slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_dash = false;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = slug.trim_end_matches('-');
    if trimmed.is_empty() {
        "card".to_string()
    } else {
        trimmed.chars().take(40).collect()
    }
}

/// Create (or attach to) a worktree at `<repo>/.worktrees/<shortCardId>/` on
/// `branch`. Shells out to `git` rather than introducing a `git2`
/// dependency — one process-spawning style for CLI agents, `git`, and `gh`
/// alike.
pub async fn create_worktree(repo_path: &Path, short_card_id: &str, branch: &str) -> Result<PathBuf> {
    let worktree_path = repo_path.join(".worktrees").join(short_card_id);

    if worktree_path.exists() {
        return Ok(worktree_path);
    }

    let branch_exists = Command::new("git")
        .args(["rev-parse", "--verify", branch])
        .current_dir(repo_path)
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false);

    let mut cmd = Command::new("git");
    cmd.arg("worktree").arg("add");
    if branch_exists {
        cmd.arg(&worktree_path).arg(branch);
    } else {
        cmd.arg("-b").arg(branch).arg(&worktree_path);
    }
    cmd.current_dir(repo_path);

    let output = cmd
        .output()
        .await
        .map_err(|e| AgentError::WorktreeFailed(format!("failed to spawn git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AgentError::WorktreeFailed(format!(
            "git worktree add failed: {stderr}"
        )));
    }

    Ok(worktree_path)
}

/// Remove a smoke-test subdirectory then force-remove the worktree itself.
/// Best-effort: failures are logged, not propagated, so a stuck worktree
/// never blocks a terminal transition — the next GC pass retries it.
pub async fn remove_worktree(repo_path: &Path, worktree_path: &Path) {
    let smoke_data = worktree_path.join(".smoke-data");
    if smoke_data.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(&smoke_data).await {
            warn!(error = %e, path = %smoke_data.display(), "failed to remove smoke-data directory");
        }
    }

    let output = Command::new("git")
        .args(["worktree", "remove", "--force"])
        .arg(worktree_path)
        .current_dir(repo_path)
        .output()
        .await;

    match output {
        Ok(o) if o.status.success() => {}
        Ok(o) => {
            warn!(
                stderr = %String::from_utf8_lossy(&o.stderr),
                path = %worktree_path.display(),
                "git worktree remove failed, left for next GC pass"
            );
        }
        Err(e) => {
            warn!(error = %e, path = %worktree_path.display(), "failed to spawn git worktree remove");
        }
    }
}

/// Remove any `.worktrees/*` directory not present in `live_card_ids`.
/// Directories named `merge-*` are preserved for the synthesize phase.
pub async fn gc_worktrees(repo_path: &Path, live_short_card_ids: &[String]) -> Result<Vec<String>> {
    let worktrees_dir = repo_path.join(".worktrees");
    if !worktrees_dir.exists() {
        return Ok(vec![]);
    }

    let mut removed = vec![];
    let mut entries = tokio::fs::read_dir(&worktrees_dir)
        .await
        .map_err(|e| AgentError::WorktreeFailed(e.to_string()))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AgentError::WorktreeFailed(e.to_string()))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("merge-") {
            continue;
        }
        if live_short_card_ids.iter().any(|id| id == &name) {
            continue;
        }
        remove_worktree(repo_path, &entry.path()).await;
        removed.push(name);
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_lowercases_and_dashes() {
        assert_eq!(slug("Add /health Endpoint!"), "add-health-endpoint");
    }

    #[test]
    fn slug_empty_title_falls_back() {
        assert_eq!(slug("!!!"), "card");
    }

    #[test]
    fn branch_name_matches_expected_shape() {
        let name = branch_name(AssignedAgent::Claude, "Add /health", "a1b2c3d4");
        assert_eq!(name, "agent/claude/add-health-a1b2c3d4");
    }
}
