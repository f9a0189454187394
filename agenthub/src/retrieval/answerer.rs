//! Local retrieval answer over a knowledge base.
//!
//! Scores every chunk, keeps the best few, summarizes them and lists short
//! previews as references. This stands in for a model-backed pipeline when
//! chatting against uploaded documents without a backend.

use std::fmt::Write;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::scorer::{score_terms, tokenize};
use super::summarizer::summarize;
use crate::models::{Chunk, KnowledgeBase};

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Number of chunks used to build an answer.
pub const TOP_K: usize = 3;
/// Characters kept in a reference preview before the ellipsis.
pub const PREVIEW_CHARS: usize = 72;
const ELLIPSIS: char = '…';

/// Returned verbatim when nothing in the knowledge base matches.
pub const NO_MATCH_ANSWER: &str =
    "No relevant content was found in the knowledge base. Try rephrasing the question or uploading more documents.";
const ANSWER_HEADER: &str = "Here is what I found in the knowledge base:";
const REFERENCES_HEADER: &str = "Reference snippets:";

/// A chunk with its score.
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    pub document: &'a str,
    pub score: u32,
}

/// Outcome of a retrieval pass before formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    NoMatch,
    Found {
        summary: String,
        snippets: Vec<String>,
    },
}

impl Retrieval {
    /// Render as the text shown to the user.
    pub fn render(&self) -> String {
        match self {
            Self::NoMatch => NO_MATCH_ANSWER.to_string(),
            Self::Found { summary, snippets } => {
                let mut out = format!("{ANSWER_HEADER}\n\n{summary}\n\n{REFERENCES_HEADER}");
                for (i, snippet) in snippets.iter().enumerate() {
                    let _ = write!(out, "\n{}. {snippet}", i + 1);
                }
                out
            }
        }
    }
}

/// Score all chunks and return the top matches, best first.
///
/// Only chunks scoring above zero are kept. Ties keep encounter order
/// (document order, then chunk index).
pub fn top_chunks<'a>(kb: &'a KnowledgeBase, query: &str) -> Vec<ScoredChunk<'a>> {
    let terms = tokenize(query);

    let mut scored: Vec<ScoredChunk<'a>> = kb
        .documents
        .iter()
        .flat_map(|doc| {
            doc.chunks.iter().map(|chunk| ScoredChunk {
                chunk,
                document: doc.name.as_str(),
                score: 0,
            })
        })
        .map(|mut hit| {
            hit.score = score_terms(&terms, &hit.chunk.content.to_lowercase());
            hit
        })
        .filter(|hit| hit.score > 0)
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(TOP_K);
    scored
}

/// Run retrieval and summarization without formatting.
pub fn retrieve(kb: &KnowledgeBase, query: &str) -> Retrieval {
    let hits = top_chunks(kb, query);
    if hits.is_empty() {
        return Retrieval::NoMatch;
    }

    let joined = hits
        .iter()
        .map(|hit| hit.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    Retrieval::Found {
        summary: summarize(&joined, query),
        snippets: hits.iter().map(|hit| preview(&hit.chunk.content)).collect(),
    }
}

/// Answer `query` from `kb` as formatted text.
pub fn answer(kb: &KnowledgeBase, query: &str) -> String {
    retrieve(kb, query).render()
}

/// [`answer`], after waiting `latency` to mimic a remote round trip.
pub async fn answer_with_latency(kb: &KnowledgeBase, query: &str, latency: Duration) -> String {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
    let started = std::time::Instant::now();
    let text = answer(kb, query);
    tracing::debug!(
        chunks = kb.chunk_count(),
        elapsed_us = started.elapsed().as_micros(),
        "answered from knowledge base"
    );
    text
}

/// Collapse whitespace and cut to [`PREVIEW_CHARS`], adding an ellipsis when cut.
pub fn preview(content: &str) -> String {
    let normalized = WHITESPACE_RE.replace_all(content.trim(), " ");
    if normalized.chars().count() <= PREVIEW_CHARS {
        return normalized.into_owned();
    }
    let mut out: String = normalized.chars().take(PREVIEW_CHARS).collect();
    out.push(ELLIPSIS);
    out
}
