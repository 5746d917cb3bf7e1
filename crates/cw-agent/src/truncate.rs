//! Output truncation helpers for prompt assembly and log display.
//!
//! Middle-omission preserves both head and tail for anything whose tail
//! matters as much as its head (subprocess stdout); plain head-truncation
//! covers prompt document sections, where only the character budget
//! matters.

/// Truncate `text` to at most `max_chars` characters using middle-omission,
/// preserving both head and tail. Character-boundary safe.
pub fn truncate_middle(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total <= max_chars {
        return text.to_owned();
    }

    let half = max_chars / 2;
    let head: String = chars[..half].iter().collect();
    let tail: String = chars[total - half..].iter().collect();
    let omitted = total - max_chars;

    format!("{head}\n\n... [OUTPUT TRUNCATED: {omitted} chars omitted] ...\n\n{tail}")
}

/// Truncate `text` to at most `max_chars` characters, dropping the tail.
/// Used for per-document prompt sections.
pub fn truncate_head(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_owned();
    }
    let head: String = chars[..max_chars].iter().collect();
    format!("{head}\n... [truncated]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_short_input_returned_as_is() {
        assert_eq!(truncate_middle("hello", 100), "hello");
    }

    #[test]
    fn middle_large_input_preserves_head_and_tail() {
        let input = format!("{}{}{}", "A".repeat(100), "B".repeat(200), "C".repeat(100));
        let result = truncate_middle(&input, 100);
        assert!(result.starts_with('A'));
        assert!(result.ends_with('C'));
        assert!(result.contains("TRUNCATED"));
    }

    #[test]
    fn middle_unicode_does_not_panic() {
        let input = "€".repeat(400);
        let result = truncate_middle(&input, 100);
        assert!(result.contains("TRUNCATED"));
    }

    #[test]
    fn head_truncates_and_marks() {
        let input = "x".repeat(3000);
        let result = truncate_head(&input, 2000);
        assert!(result.contains("[truncated]"));
        assert_eq!(result.chars().filter(|&c| c == 'x').count(), 2000);
    }

    #[test]
    fn head_short_input_returned_as_is() {
        assert_eq!(truncate_head("short", 2000), "short");
    }
}
