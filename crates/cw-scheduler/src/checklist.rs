//! Parser for the user-editable `HEARTBEAT.md` checklist that drives which
//! scheduler jobs run. Deliberately a single-line-format parser —
//! `- [x] label` / `- [ ] label` — rather than a full Markdown parser,
//! since nothing else in this workspace needs one.

use std::collections::HashSet;

pub const DAILY_DIGEST: &str = "daily digest";
pub const MORNING_BRIEFING: &str = "morning briefing";
pub const EVENING_REFLECTION: &str = "evening reflection";
pub const DEADLINE_SCAN: &str = "deadline scan";

/// The set of checklist labels currently enabled (checkbox ticked).
#[derive(Debug, Default, Clone)]
pub struct HeartbeatChecklist {
    enabled: HashSet<String>,
}

impl HeartbeatChecklist {
    pub fn parse(text: &str) -> Self {
        let mut enabled = HashSet::new();
        for line in text.lines() {
            let trimmed = line.trim();
            let Some(rest) = trimmed.strip_prefix("- [") else { continue };
            let Some((mark, label)) = rest.split_once(']') else { continue };
            if mark.trim() == "x" || mark.trim() == "X" {
                enabled.insert(label.trim().to_lowercase());
            }
        }
        Self { enabled }
    }

    /// Load from disk; a missing file means every job is disabled (matches
    /// "a job runs iff its checkbox is enabled" — absence is not a default-on).
    pub async fn load(path: &str) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse(&text),
            Err(_) => Self::default(),
        }
    }

    pub fn is_enabled(&self, label: &str) -> bool {
        self.enabled.contains(&label.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_checked_and_unchecked_lines() {
        let text = "\
- [x] Daily digest
- [ ] Morning briefing
- [X] Evening reflection
not a checklist line
";
        let checklist = HeartbeatChecklist::parse(text);
        assert!(checklist.is_enabled(DAILY_DIGEST));
        assert!(!checklist.is_enabled(MORNING_BRIEFING));
        assert!(checklist.is_enabled(EVENING_REFLECTION));
        assert!(!checklist.is_enabled(DEADLINE_SCAN));
    }

    #[test]
    fn empty_text_enables_nothing() {
        let checklist = HeartbeatChecklist::parse("");
        assert!(!checklist.is_enabled(DAILY_DIGEST));
    }
}
