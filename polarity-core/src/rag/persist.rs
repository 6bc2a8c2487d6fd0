//! On-disk format for embedding stores.
//!
//! A store named `name` is saved as two files in one directory:
//!
//! - `name.index`: little-endian binary vectors
//! - `name.docs.json`: the documents, in index order
//!
//! Binary layout:
//!
//! ```text
//! magic      4 bytes   "PLRX"
//! version    u32       1
//! model_len  u32
//! model_id   model_len bytes, UTF-8
//! dimension  u32
//! count      u64
//! vectors    count * dimension f32
//! ```
//!
//! Both files record the model id; a load refuses files whose ids disagree
//! with each other or with the encoder they are loaded for.

use super::embedder::Encoder;
use super::store::EmbeddingStore;
use super::types::Document;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::info;

const MAGIC: &[u8; 4] = b"PLRX";
const VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid document file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing index file: {}", .0.display())]
    MissingCompanion(PathBuf),

    #[error("Model mismatch: expected '{expected}', found '{found}'")]
    ModelMismatch { expected: String, found: String },

    #[error("Dimension mismatch: expected {expected}, found {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Corrupt index: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Serialize)]
struct ManifestRef<'a> {
    model_id: &'a str,
    dimension: usize,
    documents: &'a [Document],
}

#[derive(Deserialize)]
struct Manifest {
    model_id: String,
    dimension: usize,
    documents: Vec<Document>,
}

/// Decoded contents of an `.index` file.
#[derive(Debug, PartialEq)]
struct RawIndex {
    model_id: String,
    dimension: usize,
    count: usize,
    vectors: Vec<f32>,
}

/// Paths of the binary index and its document side-car.
pub fn index_paths(dir: impl AsRef<Path>, name: &str) -> (PathBuf, PathBuf) {
    let dir = dir.as_ref();
    (
        dir.join(format!("{}.index", name)),
        dir.join(format!("{}.docs.json", name)),
    )
}

fn encode_index(model_id: &str, dimension: usize, vectors: &[f32]) -> Vec<u8> {
    let count = if dimension == 0 { 0 } else { vectors.len() / dimension };
    let mut bytes = Vec::with_capacity(24 + model_id.len() + vectors.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(&(model_id.len() as u32).to_le_bytes());
    bytes.extend_from_slice(model_id.as_bytes());
    bytes.extend_from_slice(&(dimension as u32).to_le_bytes());
    bytes.extend_from_slice(&(count as u64).to_le_bytes());
    for value in vectors {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Forward-only reader over a byte slice.
struct Cursor<'a> {
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(IndexError::Corrupt(format!("truncated {}", what)));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        let raw = self.take(4, what)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        let raw = self.take(8, what)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(u64::from_le_bytes(buf))
    }
}

fn decode_index(bytes: &[u8]) -> Result<RawIndex> {
    let mut cursor = Cursor { bytes };

    if cursor.take(4, "magic")? != MAGIC {
        return Err(IndexError::Corrupt("bad magic".to_string()));
    }
    let version = cursor.u32("version")?;
    if version != VERSION {
        return Err(IndexError::Corrupt(format!("unsupported version {}", version)));
    }

    let model_len = cursor.u32("model id length")? as usize;
    let model_id = std::str::from_utf8(cursor.take(model_len, "model id")?)
        .map_err(|_| IndexError::Corrupt("model id is not UTF-8".to_string()))?
        .to_string();
    let dimension = cursor.u32("dimension")? as usize;
    let count = usize::try_from(cursor.u64("count")?)
        .map_err(|_| IndexError::Corrupt("count out of range".to_string()))?;
    if dimension == 0 && count > 0 {
        return Err(IndexError::Corrupt(format!(
            "{} vectors of dimension 0",
            count
        )));
    }

    let values = count
        .checked_mul(dimension)
        .ok_or_else(|| IndexError::Corrupt("count overflow".to_string()))?;
    let byte_len = values
        .checked_mul(4)
        .ok_or_else(|| IndexError::Corrupt("count overflow".to_string()))?;
    let raw = cursor.take(byte_len, "vectors")?;
    if !cursor.bytes.is_empty() {
        return Err(IndexError::Corrupt(format!(
            "{} trailing bytes",
            cursor.bytes.len()
        )));
    }

    let vectors = raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(RawIndex {
        model_id,
        dimension,
        count,
        vectors,
    })
}

/// Writes `store` to `dir` as `name.index` and `name.docs.json`.
pub async fn save_store(store: &EmbeddingStore, dir: impl AsRef<Path>, name: &str) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).await?;
    let (index_path, docs_path) = index_paths(dir, name);

    let bytes = encode_index(store.model_id(), store.dimension(), store.index().raw());
    let manifest = ManifestRef {
        model_id: store.model_id(),
        dimension: store.dimension(),
        documents: store.documents(),
    };

    fs::write(&index_path, bytes).await?;
    fs::write(&docs_path, serde_json::to_vec_pretty(&manifest)?).await?;

    info!(
        path = %index_path.display(),
        documents = store.len(),
        model = %store.model_id(),
        "Saved index"
    );
    Ok(())
}

/// Reads a store saved by [`save_store`] for use with `encoder`.
pub async fn load_store(
    dir: impl AsRef<Path>,
    name: &str,
    encoder: Arc<dyn Encoder>,
) -> Result<EmbeddingStore> {
    let (index_path, docs_path) = index_paths(dir, name);
    for path in [&index_path, &docs_path] {
        if !fs::try_exists(path).await? {
            return Err(IndexError::MissingCompanion(path.clone()));
        }
    }

    let raw = decode_index(&fs::read(&index_path).await?)?;
    let manifest: Manifest = serde_json::from_slice(&fs::read(&docs_path).await?)?;

    if manifest.model_id != raw.model_id {
        return Err(IndexError::ModelMismatch {
            expected: raw.model_id,
            found: manifest.model_id,
        });
    }
    if encoder.model_id() != raw.model_id {
        return Err(IndexError::ModelMismatch {
            expected: encoder.model_id().to_string(),
            found: raw.model_id,
        });
    }
    if manifest.dimension != raw.dimension {
        return Err(IndexError::Corrupt(format!(
            "document file says dimension {}, index says {}",
            manifest.dimension, raw.dimension
        )));
    }
    if encoder.dimension() != raw.dimension {
        return Err(IndexError::DimensionMismatch {
            expected: encoder.dimension(),
            actual: raw.dimension,
        });
    }
    if manifest.documents.len() != raw.count {
        return Err(IndexError::Corrupt(format!(
            "{} documents for {} vectors",
            manifest.documents.len(),
            raw.count
        )));
    }

    if raw.dimension == 0 {
        return Err(IndexError::Corrupt("index has dimension 0".to_string()));
    }

    let mut store = EmbeddingStore::new(encoder);
    let rows = raw.vectors.chunks_exact(raw.dimension);
    for (document, vector) in manifest.documents.into_iter().zip(rows) {
        store
            .push_unit(document, vector)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
    }

    info!(path = %index_path.display(), documents = store.len(), "Loaded index");
    Ok(store)
}
