//! Knowledge base, documents and chunks used by local retrieval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::retrieval::chunker::{chunk_text, estimate_tokens};

/// A retrieval unit: one slice of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Position within the owning document.
    pub index: usize,
    pub content: String,
    /// Rough token estimate for display.
    pub token_count: usize,
}

/// An uploaded document split into ordered chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub chunks: Vec<Chunk>,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    /// Build a document from pre-split chunk texts.
    pub fn from_chunks<I, S>(name: impl Into<String>, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chunks = chunks
            .into_iter()
            .enumerate()
            .map(|(index, content)| {
                let content = content.into();
                Chunk {
                    id: Uuid::now_v7().to_string(),
                    index,
                    token_count: estimate_tokens(&content),
                    content,
                }
            })
            .collect();

        Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            chunks,
            uploaded_at: Utc::now(),
        }
    }

    pub fn token_count(&self) -> usize {
        self.chunks.iter().map(|c| c.token_count).sum()
    }
}

/// An ordered set of documents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub name: String,
    pub documents: Vec<Document>,
}

impl KnowledgeBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            documents: Vec::new(),
        }
    }

    /// Chunk `text` and append it as a new document.
    pub fn add_document(&mut self, name: impl Into<String>, text: &str, max_chars: usize) -> &Document {
        let doc = Document::from_chunks(name, chunk_text(text, max_chars));
        self.documents.push(doc);
        &self.documents[self.documents.len() - 1]
    }

    pub fn push_document(&mut self, document: Document) {
        self.documents.push(document);
    }

    /// Every chunk, in document order then chunk order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.documents.iter().flat_map(|d| d.chunks.iter())
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks().count()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_iterate_in_document_order() {
        let mut kb = KnowledgeBase::new("kb");
        kb.push_document(Document::from_chunks("a", ["a0", "a1"]));
        kb.push_document(Document::from_chunks("b", ["b0"]));

        let contents: Vec<&str> = kb.chunks().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["a0", "a1", "b0"]);
        assert_eq!(kb.documents[0].chunks[1].index, 1);
    }

    #[test]
    fn add_document_chunks_text() {
        let mut kb = KnowledgeBase::new("kb");
        let doc = kb.add_document("notes.md", "first paragraph\n\nsecond paragraph", 20);
        assert_eq!(doc.chunks.len(), 2);
        assert!(doc.token_count() > 0);
        assert!(!kb.is_empty());
    }
}
