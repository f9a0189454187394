//! Lexical term scoring.
//!
//! A query is split into terms on Unicode non-alphanumeric boundaries and a
//! text scores the sum over terms of `occurrences * weight`, where terms
//! longer than four characters weigh double.

use std::sync::LazyLock;

use regex::Regex;

static TERM_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("term split regex is valid"));

/// Terms longer than this many characters get [`LONG_TERM_WEIGHT`].
const LONG_TERM_CHARS: usize = 4;
const LONG_TERM_WEIGHT: u32 = 2;
const SHORT_TERM_WEIGHT: u32 = 1;

/// Lowercase `query` and split it into non-empty terms.
pub fn tokenize(query: &str) -> Vec<String> {
    TERM_SPLIT_RE
        .split(&query.to_lowercase())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Weight of a single term.
pub fn term_weight(term: &str) -> u32 {
    if term.chars().count() > LONG_TERM_CHARS {
        LONG_TERM_WEIGHT
    } else {
        SHORT_TERM_WEIGHT
    }
}

/// Score already-lowercased `text` against pre-tokenized `terms`.
///
/// Occurrences are counted left to right without overlap.
pub fn score_terms(terms: &[String], text: &str) -> u32 {
    terms
        .iter()
        .map(|term| {
            let hits = u32::try_from(text.matches(term.as_str()).count()).unwrap_or(u32::MAX);
            hits.saturating_mul(term_weight(term))
        })
        .fold(0, u32::saturating_add)
}

/// Score `text` against `query`. Both are lowercased first.
pub fn score(query: &str, text: &str) -> u32 {
    score_terms(&tokenize(query), &text.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_punctuation_and_space() {
        assert_eq!(tokenize("How, do  I-use OWASP?"), vec!["how", "do", "i", "use", "owasp"]);
        assert!(tokenize(" ,.!? ").is_empty());
    }

    #[test]
    fn tokenize_keeps_cjk_runs() {
        assert_eq!(tokenize("安全 手册"), vec!["安全", "手册"]);
    }

    #[test]
    fn cjk_short_term_weight_one() {
        let chunk = "Web 安全手册：常见漏洞与 OWASP Top 10";
        assert_eq!(score("安全", chunk), 1);
        assert_eq!(score("安全", "部署指南"), 0);
    }

    #[test]
    fn long_terms_weigh_double() {
        assert_eq!(term_weight("owasp"), 2);
        assert_eq!(term_weight("top"), 1);
        assert_eq!(score("owasp top", "OWASP Top 10, owasp again"), 2 * 2 + 1);
    }

    #[test]
    fn occurrences_do_not_overlap() {
        assert_eq!(score("aa", "aaaa"), 2);
        assert_eq!(score("aa", "aaa"), 1);
    }

    #[test]
    fn zero_when_no_term_appears() {
        assert_eq!(score("kubernetes", "a text about cooking"), 0);
        assert_eq!(score("", "anything"), 0);
    }

    #[test]
    fn deterministic() {
        let text = "Rust ownership rules; ownership and borrowing.";
        assert_eq!(score("ownership rust", text), score("ownership rust", text));
        assert_eq!(score("ownership rust", text), 2 * 2 + 1);
    }
}
