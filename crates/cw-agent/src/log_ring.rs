use std::collections::VecDeque;

/// Size-capped FIFO for one agent's stdout/stderr lines. Bounded so a
/// chatty or stuck agent can't grow this unboundedly in memory.
pub const MAX_LOG_LINES: usize = 500;

#[derive(Debug, Default)]
pub struct LogRing {
    lines: VecDeque<String>,
}

impl LogRing {
    pub fn new() -> Self {
        Self {
            lines: VecDeque::with_capacity(MAX_LOG_LINES),
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() >= MAX_LOG_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Tail of the ring, most-recent last, capped at `limit` (or the whole
    /// ring when `limit` is `None`) — backs `getAgentLogs(cardId, limit?)`.
    pub fn tail(&self, limit: Option<usize>) -> Vec<String> {
        let n = limit.unwrap_or(self.lines.len()).min(self.lines.len());
        self.lines.iter().skip(self.lines.len() - n).cloned().collect()
    }

    /// Last `n` lines, used for the stderr tail attached to `agent.failed`.
    pub fn last_n(&self, n: usize) -> Vec<String> {
        self.tail(Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_beyond_capacity_drops_oldest() {
        let mut ring = LogRing::new();
        for i in 0..(MAX_LOG_LINES + 10) {
            ring.push(format!("line {i}"));
        }
        assert_eq!(ring.len(), MAX_LOG_LINES);
        assert_eq!(ring.tail(Some(1)), vec![format!("line {}", MAX_LOG_LINES + 9)]);
    }

    #[test]
    fn tail_respects_limit() {
        let mut ring = LogRing::new();
        for i in 0..10 {
            ring.push(format!("line {i}"));
        }
        let tail = ring.tail(Some(3));
        assert_eq!(tail, vec!["line 7", "line 8", "line 9"]);
    }

    #[test]
    fn last_n_caps_at_available_lines() {
        let mut ring = LogRing::new();
        ring.push("only one".to_string());
        assert_eq!(ring.last_n(20), vec!["only one"]);
    }
}
