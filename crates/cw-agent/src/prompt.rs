//! Prompt assembly. Builds the single prompt string handed to an agent CLI
//! on each spawn, respecting a hard character budget and section drop
//! order: ordered section concatenation, each section individually
//! truncated before the whole is checked against the budget.

use std::sync::Arc;

use cw_core::config::{
    PROMPT_BUDGET_CHARS, PROMPT_DOCUMENT_CHARS, PROMPT_RECENT_DONE_CARDS, PROMPT_TOP_DECISIONS,
};
use cw_core::Column;
use cw_store::{KanbanCard, Project, Store};
use cw_steering::SteeringEngine;

use crate::truncate::truncate_head;

const RESEARCH_PROTOCOL: &str = "\
## Research Protocol

Before writing any code, complete three passes:

1. **Survey** — read the surrounding module(s) to learn existing patterns, \
naming, and architecture before introducing your own.
2. **Cross-check** — compare at least one other call site or test that \
exercises the area you are about to change.
3. **Confirm** — state the specific invariant or contract you are about to \
rely on before touching it.

Do not skip a pass because the change looks small.";

const COMPLETION_CHECKLIST: &str = "\
## Completion Checklist

Before finishing this session:

- [ ] Type-check the project.
- [ ] Run the linter and fix warnings you introduced.
- [ ] Write `verification-prompt.md` in the worktree root summarizing what \
you changed and how to verify it.
- [ ] Commit your work with a clear message.
- [ ] Do **not** push and do **not** open a pull request — that is handled \
for you after this session ends.";

fn identity_block(agent_label: &str) -> String {
    format!(
        "## Identity\n\nYou are the `{agent_label}` agent on an autonomous \
kanban pipeline. You work inside a dedicated git worktree on your own \
branch. You may read, write, and run commands freely within this worktree. \
You must never push, never open a pull request, and never touch another \
card's worktree or branch."
    )
}

fn project_section(project: &Project, documents: &[cw_store::ProjectDocument]) -> String {
    let mut out = format!(
        "## Project\n\n**{}**\n\n{}\n",
        project.name, project.description
    );
    for doc in documents {
        if matches!(
            doc.doc_type,
            cw_store::DocumentType::Brief
                | cw_store::DocumentType::Instructions
                | cw_store::DocumentType::Assumptions
        ) {
            out.push_str(&format!(
                "\n### {}\n\n{}\n",
                doc.title,
                truncate_head(&doc.content, PROMPT_DOCUMENT_CHARS)
            ));
        }
    }
    out
}

fn decisions_section(decisions: &[cw_store::Decision]) -> String {
    if decisions.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Architecture Decisions\n\n");
    for d in decisions {
        out.push_str(&format!("- **{}**: {}\n", d.title, d.reasoning));
    }
    out
}

fn board_section(siblings: &[KanbanCard], recent_done: &[KanbanCard]) -> String {
    if siblings.is_empty() && recent_done.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Board Context\n\n");
    if !siblings.is_empty() {
        out.push_str("### Other in-progress cards\n\n");
        for c in siblings {
            out.push_str(&format!("- {}\n", c.title));
        }
    }
    if !recent_done.is_empty() {
        out.push_str("\n### Recently completed\n\n");
        for c in recent_done {
            out.push_str(&format!("- {}\n", c.title));
        }
    }
    out
}

fn card_brief_section(card: &KanbanCard) -> String {
    let mut out = format!("## Your Card\n\n**{}**\n\n{}\n", card.title, card.description);
    if let Some(snapshot) = &card.context_snapshot {
        out.push_str(&format!("\n### Context from a previous session\n\n{snapshot}\n"));
    }
    out
}

/// Assemble the full prompt for one spawn. `card` and `project` must already
/// be loaded by the caller; this function issues the remaining reads
/// (documents, decisions, sibling cards, steering corrections) itself.
pub fn build_prompt(
    store: &Arc<Store>,
    steering: &SteeringEngine,
    project: &Project,
    card: &KanbanCard,
    agent_label: &str,
) -> Result<String, cw_store::StoreError> {
    let documents = store.list_documents(&project.id)?;
    let decisions = store.list_recent_decisions(&project.id, PROMPT_TOP_DECISIONS)?;

    let in_progress = store
        .list_cards_by_column(&project.id, Column::InProgress, 50, 0)?
        .into_iter()
        .filter(|c| c.id != card.id)
        .collect::<Vec<_>>();

    let mut done = store.list_cards_by_column(&project.id, Column::Done, 200, 0)?;
    done.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    done.truncate(PROMPT_RECENT_DONE_CARDS as usize);

    let steering_block = steering.build_prompt_block(&project.id)?;

    let identity = identity_block(agent_label);
    let project_sec = project_section(project, &documents);
    let decisions_sec = decisions_section(&decisions);
    let board_sec = board_section(&in_progress, &done);
    let card_sec = card_brief_section(card);

    Ok(assemble(
        &identity,
        &project_sec,
        &decisions_sec,
        &board_sec,
        &card_sec,
        &steering_block,
    ))
}

/// Concatenate sections honoring the hard character budget. If the total
/// exceeds the budget, sections are dropped in this order: decisions,
/// board, project. Identity, card brief, research protocol, and the
/// completion checklist are never dropped.
fn assemble(
    identity: &str,
    project: &str,
    decisions: &str,
    board: &str,
    card: &str,
    steering: &str,
) -> String {
    let mandatory_len = identity.len()
        + card.len()
        + RESEARCH_PROTOCOL.len()
        + COMPLETION_CHECKLIST.len()
        + steering.len();

    let mut optional: Vec<(&str, &str)> = vec![
        ("decisions", decisions),
        ("board", board),
        ("project", project),
    ];

    let mut budget_remaining = PROMPT_BUDGET_CHARS.saturating_sub(mandatory_len);
    let mut kept = std::collections::HashMap::new();
    // Drop order is decisions, board, project — so we consider them in the
    // *reverse* drop order (project, board, decisions) when deciding what
    // still fits, keeping the highest-priority optional sections first.
    optional.reverse();
    for (name, section) in &optional {
        if section.len() <= budget_remaining {
            kept.insert(*name, *section);
            budget_remaining -= section.len();
        }
    }

    let mut out = String::new();
    out.push_str(identity);
    out.push_str("\n\n");
    if let Some(s) = kept.get("project") {
        out.push_str(s);
        out.push_str("\n\n");
    }
    if let Some(s) = kept.get("decisions") {
        out.push_str(s);
        out.push_str("\n\n");
    }
    if let Some(s) = kept.get("board") {
        out.push_str(s);
        out.push_str("\n\n");
    }
    out.push_str(card);
    out.push_str("\n\n");
    if !steering.is_empty() {
        out.push_str(steering);
        out.push_str("\n\n");
    }
    out.push_str(RESEARCH_PROTOCOL);
    out.push_str("\n\n");
    out.push_str(COMPLETION_CHECKLIST);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_keeps_mandatory_sections_under_tiny_budget() {
        let identity = "ID";
        let card = "CARD";
        let out = assemble(identity, "PROJECT", "DECISIONS", "BOARD", card, "");
        assert!(out.contains("ID"));
        assert!(out.contains("CARD"));
        assert!(out.contains("Research Protocol"));
        assert!(out.contains("Completion Checklist"));
    }

    #[test]
    fn assemble_drops_project_before_mandatory_sections() {
        let huge_project = "P".repeat(PROMPT_BUDGET_CHARS * 2);
        let out = assemble("ID", &huge_project, "DEC", "BOARD", "CARD", "");
        assert!(!out.contains(&huge_project));
        assert!(out.contains("ID"));
        assert!(out.contains("CARD"));
    }
}
