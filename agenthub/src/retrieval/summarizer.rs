//! Extractive, query-focused summary by line.
//!
//! Pure lexical overlap: lines are ranked with the term scorer and the best
//! few are returned as bullets. No reordering back into document order.

use super::scorer::{score_terms, tokenize};

/// Maximum number of bullet lines in a summary.
pub const MAX_SUMMARY_LINES: usize = 4;
/// Characters kept when no line matches.
pub const FALLBACK_CHARS: usize = 200;
pub const BULLET: &str = "• ";

/// Summarize `text` with respect to `query`.
pub fn summarize(text: &str, query: &str) -> String {
    let terms = tokenize(query);

    let mut scored: Vec<(u32, &str)> = text
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| (score_terms(&terms, &line.to_lowercase()), line))
        .filter(|(score, _)| *score > 0)
        .collect();

    if scored.is_empty() {
        return text.chars().take(FALLBACK_CHARS).collect();
    }

    // Stable: equal scores keep their original line order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .iter()
        .take(MAX_SUMMARY_LINES)
        .map(|(_, line)| format!("{BULLET}{}", line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
