//! Retrieval for stance-specific corpora.
//!
//! Each dialogue agent that runs in RAG mode owns one [`RetrievalAgent`]: a
//! labelled [`EmbeddingStore`] over the snippets of a single community. The
//! agent looks up the snippets closest to the incoming message, and the
//! prompt composer folds them into the request.
//!
//! # Architecture
//!
//! - [`embedder`]: the [`Encoder`] trait with a remote and an offline encoder
//! - [`store`]: flat in-memory index with cosine scoring
//! - [`persist`]: binary index plus JSON side-car on disk
//! - [`corpus`]: snippet files and chunking
//!
//! # How It Works
//!
//! 1. **Indexing**: snippets are labelled, encoded, normalised, and appended
//!    to the store. A batch is all-or-nothing.
//! 2. **Retrieval**: the query is encoded the same way and every stored vector
//!    is scored by dot product. The top `k` come back, best first.

pub mod corpus;
pub mod embedder;
pub mod persist;
pub mod store;
mod types;

pub use corpus::{chunk_snippets, chunk_text, load_snippets, CorpusError};
pub use embedder::{Encoder, EmbedderError, HashingEncoder, ProviderEncoder};
pub use persist::IndexError;
pub use store::{cosine_similarity, EmbeddingStore};
pub use types::{Document, RetrievalResult};

use crate::config::EncoderMode;
use crate::provider::Provider;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Embedder error: {0}")]
    Embedder(#[from] EmbedderError),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Encoder '{0}' has dimension 0; configure a positive dimension")]
    ZeroDimension(String),

    #[error("Encoder '{0}' needs a provider; pass one or switch to the hashing encoder")]
    EncoderUnavailable(String),
}

pub type Result<T> = std::result::Result<T, RagError>;

/// Builds the encoder selected in configuration.
///
/// The remote encoder shares the chat provider's credentials, so it is only
/// available when a provider is.
pub fn build_encoder(
    mode: &EncoderMode,
    provider: Option<Arc<dyn Provider>>,
) -> Result<Arc<dyn Encoder>> {
    if mode.dimension() == 0 {
        return Err(RagError::ZeroDimension(mode.model_id()));
    }
    match mode {
        EncoderMode::Hashing { dimension } => Ok(Arc::new(HashingEncoder::new(*dimension))),
        EncoderMode::Clova {
            model_id,
            dimension,
        } => match provider {
            Some(provider) => Ok(Arc::new(ProviderEncoder::new(
                provider,
                model_id.clone(),
                *dimension,
            ))),
            None => Err(RagError::EncoderUnavailable(model_id.clone())),
        },
    }
}

/// A labelled store holding one stance's corpus.
///
/// Documents added through [`add_texts`](Self::add_texts) get ids of the form
/// `{label}_doc_{n}` with `n` counting from zero over the agent's lifetime.
///
/// # Example
///
/// ```
/// # use polarity_core::rag::{HashingEncoder, RetrievalAgent};
/// # use std::sync::Arc;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> polarity_core::rag::Result<()> {
/// let mut agent = RetrievalAgent::with_encoder("left", Arc::new(HashingEncoder::new(64)));
/// agent.add_texts(["A causes B", "B causes C"]).await?;
///
/// let results = agent.retrieve("What causes C?", 1).await?;
/// assert_eq!(results[0].document.id, "left_doc_1");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RetrievalAgent {
    label: String,
    store: EmbeddingStore,
}

impl RetrievalAgent {
    pub fn new(label: impl Into<String>, store: EmbeddingStore) -> Self {
        Self {
            label: label.into(),
            store,
        }
    }

    /// Creates an agent over an empty store.
    pub fn with_encoder(label: impl Into<String>, encoder: Arc<dyn Encoder>) -> Self {
        Self::new(label, EmbeddingStore::new(encoder))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Adds plain snippets, labelling each with this agent's source.
    pub async fn add_texts<I, S>(&mut self, texts: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let start = self.store.len();
        let documents = texts
            .into_iter()
            .enumerate()
            .map(|(offset, text)| {
                let n = start + offset;
                Document::new(format!("{}_doc_{}", self.label, n), text)
                    .with_metadata("source", self.label.as_str())
                    .with_metadata("idx", n.to_string())
            })
            .collect();
        self.add_documents(documents).await
    }

    /// Adds caller-built documents as they are.
    pub async fn add_documents(&mut self, documents: Vec<Document>) -> Result<()> {
        let count = documents.len();
        self.store.add(documents).await?;
        info!(label = %self.label, added = count, total = self.len(), "Indexed documents");
        Ok(())
    }

    /// Returns up to `k` snippets closest to `query`, best first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        self.store.search(query, k).await
    }

    /// Persists the store as `name.index` and `name.docs.json` under `dir`.
    pub async fn save(&self, dir: impl AsRef<Path>, name: &str) -> Result<()> {
        persist::save_store(&self.store, dir, name).await?;
        Ok(())
    }

    /// Loads a store saved with [`save`](Self::save); the label becomes `name`.
    pub async fn load(dir: impl AsRef<Path>, name: &str, encoder: Arc<dyn Encoder>) -> Result<Self> {
        let store = persist::load_store(dir, name, encoder).await?;
        Ok(Self::new(name, store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn agent(label: &str) -> RetrievalAgent {
        RetrievalAgent::with_encoder(label, Arc::new(HashingEncoder::new(128)))
    }

    #[tokio::test]
    async fn test_add_texts_labels_documents() {
        let mut agent = agent("right");
        agent.add_texts(["first", "second"]).await.unwrap();
        agent.add_texts(vec!["third".to_string()]).await.unwrap();

        let docs = agent.store().documents();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[2].id, "right_doc_2");
        assert_eq!(docs[2].metadata["source"], "right");
        assert_eq!(docs[2].metadata["idx"], "2");
    }

    #[tokio::test]
    async fn test_retrieve_on_empty_agent() {
        let agent = agent("left");
        assert!(agent.is_empty());
        assert!(agent.retrieve("anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_prefers_overlap() {
        let mut agent = agent("left");
        agent.add_texts(["A causes B", "B causes C"]).await.unwrap();

        let results = agent.retrieve("What causes C?", 2).await.unwrap();
        assert_eq!(results[0].document.text, "B causes C");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_save_and_load_keeps_label_and_ids() {
        let dir = TempDir::new().unwrap();
        let mut original = agent("left");
        original.add_texts(["A causes B", "B causes C"]).await.unwrap();
        original.save(dir.path(), "left").await.unwrap();

        let loaded = RetrievalAgent::load(dir.path(), "left", Arc::new(HashingEncoder::new(128)))
            .await
            .unwrap();
        assert_eq!(loaded.label(), "left");
        assert_eq!(loaded.len(), 2);

        let results = loaded.retrieve("What causes C?", 1).await.unwrap();
        assert_eq!(results[0].document.id, "left_doc_1");
    }

    #[test]
    fn test_build_encoder() {
        let hashing = build_encoder(&EncoderMode::Hashing { dimension: 16 }, None).unwrap();
        assert_eq!(hashing.dimension(), 16);

        let err = build_encoder(&EncoderMode::default(), None).err().unwrap();
        assert!(matches!(err, RagError::EncoderUnavailable(id) if id == "clova-embedding-v2"));
    }

    #[test]
    fn test_build_encoder_rejects_zero_dimension() {
        let config: crate::config::Config =
            serde_yaml::from_str("rag:\n  encoder:\n    kind: hashing\n    dimension: 0\n").unwrap();
        let err = build_encoder(&config.rag.encoder, None).err().unwrap();
        assert!(matches!(err, RagError::ZeroDimension(id) if id == "hashing-sha256-0"));
    }
}
