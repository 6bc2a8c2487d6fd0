//! In-memory embedding store with a flat nearest-neighbour index.
//!
//! Vectors are normalised to unit length on the way in, both for documents
//! and for queries. For unit vectors the squared L2 distance is
//! `d² = 2 - 2·cos`, so ranking by ascending distance and ranking by
//! descending dot product are the same order. The store reports the dot
//! product as the score.

use super::embedder::Encoder;
use super::types::{Document, RetrievalResult};
use super::{RagError, Result};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Contiguous row-major storage of unit vectors.
#[derive(Debug, Clone)]
pub(crate) struct FlatIndex {
    dimension: usize,
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.vectors.len() / self.dimension
        }
    }

    pub(crate) fn push(&mut self, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dimension);
        self.vectors.extend_from_slice(vector);
    }

    pub(crate) fn raw(&self) -> &[f32] {
        &self.vectors
    }

    /// Dot product of `query` with every stored vector, in insertion order.
    fn scores<'a>(&'a self, query: &'a [f32]) -> impl Iterator<Item = f32> + 'a {
        self.vectors
            .chunks_exact(self.dimension)
            .map(move |row| row.iter().zip(query).map(|(a, b)| a * b).sum())
    }
}

/// Scale a vector to unit length; zero vectors stay zero.
pub(crate) fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

/// Computes cosine similarity between two vectors.
///
/// Returns values from -1.0 (opposite) to 1.0 (identical), with 0.0 indicating
/// orthogonal vectors. Returns 0.0 for mismatched lengths or zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// An append-only document store with similarity search.
///
/// The documents and the index always have the same length: a batch passed to
/// [`add`](Self::add) is fully encoded and validated before any of it is
/// inserted.
///
/// # Example
///
/// ```
/// # use polarity_core::rag::{Document, EmbeddingStore, HashingEncoder};
/// # use std::sync::Arc;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> polarity_core::rag::Result<()> {
/// let mut store = EmbeddingStore::new(Arc::new(HashingEncoder::new(64)));
/// store.add(vec![Document::new("1", "B causes C")]).await?;
///
/// let results = store.search("What causes C?", 1).await?;
/// assert_eq!(results[0].document.id, "1");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EmbeddingStore {
    encoder: Arc<dyn Encoder>,
    documents: Vec<Document>,
    index: FlatIndex,
}

impl fmt::Debug for EmbeddingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingStore")
            .field("model_id", &self.model_id())
            .field("dimension", &self.dimension())
            .field("len", &self.len())
            .finish()
    }
}

impl EmbeddingStore {
    /// Creates an empty store; the encoder's dimension is fixed from here on.
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        let index = FlatIndex::new(encoder.dimension());
        Self {
            encoder,
            documents: Vec::new(),
            index,
        }
    }

    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    pub fn model_id(&self) -> &str {
        self.encoder.model_id()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub(crate) fn index(&self) -> &FlatIndex {
        &self.index
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if self.index.dimension == 0 {
            return Err(RagError::ZeroDimension(self.model_id().to_string()));
        }
        if actual != self.index.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.index.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Encodes and appends documents.
    ///
    /// Ids are not checked for uniqueness; callers own that. If any document
    /// fails to encode, nothing from the batch is added.
    pub async fn add(&mut self, documents: Vec<Document>) -> Result<()> {
        let mut vectors = Vec::with_capacity(documents.len());
        for document in &documents {
            let vector = self.encoder.encode(&document.text).await?;
            self.check_dimension(vector.len())?;
            vectors.push(normalize(vector));
        }

        for (document, vector) in documents.into_iter().zip(vectors) {
            self.index.push(&vector);
            self.documents.push(document);
        }
        debug!(count = self.len(), model = %self.model_id(), "Documents added to store");
        Ok(())
    }

    /// Appends a document with a precomputed vector.
    pub fn add_embedded(&mut self, document: Document, vector: Vec<f32>) -> Result<()> {
        self.check_dimension(vector.len())?;
        self.index.push(&normalize(vector));
        self.documents.push(document);
        Ok(())
    }

    /// Appends a vector that is already unit length, as read back from disk.
    pub(crate) fn push_unit(&mut self, document: Document, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector.len())?;
        self.index.push(vector);
        self.documents.push(document);
        Ok(())
    }

    /// Returns up to `k` documents most similar to `query`.
    ///
    /// Results are sorted by descending score; equal scores keep insertion
    /// order. An empty store or `k == 0` yields an empty list without
    /// touching the encoder.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.encoder.encode(query).await?;
        self.check_dimension(query_vector.len())?;
        let query_vector = normalize(query_vector);

        let mut scored: Vec<(usize, f32)> = self.index.scores(&query_vector).enumerate().collect();
        // sort_by is stable, so ties stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| RetrievalResult {
                document: self.documents[position].clone(),
                score,
            })
            .collect())
    }
}
