//! Local lexical retrieval over uploaded documents.

mod answerer;
pub mod chunker;
mod scorer;
mod summarizer;

pub use answerer::{
    answer, answer_with_latency, preview, retrieve, top_chunks, Retrieval, ScoredChunk,
    NO_MATCH_ANSWER, PREVIEW_CHARS, TOP_K,
};
pub use scorer::{score, score_terms, term_weight, tokenize};
pub use summarizer::{summarize, BULLET, MAX_SUMMARY_LINES};
