use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A document stored in an embedding store.
///
/// Documents are the unit of retrieval. The embedding lives in the store's
/// index at the same position, so a document never changes once added.
///
/// # Example
///
/// ```
/// # use polarity_core::rag::Document;
/// let doc = Document::new("left_doc_0", "Preventive measures were lacking.")
///     .with_metadata("source", "left")
///     .with_metadata("idx", "0");
/// assert_eq!(doc.metadata["source"], "left");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A retrieved document with its similarity to the query.
///
/// `score` is the cosine similarity of the normalised query and document
/// vectors, so it lies in `[-1.0, 1.0]` and higher means closer. Results are
/// always ordered by descending score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub document: Document,
    pub score: f32,
}
