//! Flat on-disk vector index with brute-force cosine search.
//!
//! Two files per index directory:
//!
//! | File | Contents |
//! |------|----------|
//! | `index.vectors` | `DPVX` magic, u32 version, u32 dims, u64 count, then `count × dims` little-endian f32 |
//! | `index.entries.json` | JSON array of `{ "text", "metadata" }`, same order as the vectors |
//!
//! Both are written to a temporary sibling and renamed into place, entries
//! first. Appends only grow both files, so when an interrupted save leaves
//! them with different lengths, loading keeps the common prefix.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::metadata::write_atomic;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::error::{Error, Result};
use crate::models::{Chunk, Metadata, SearchHit};

pub const VECTORS_FILE: &str = "index.vectors";
pub const ENTRIES_FILE: &str = "index.entries.json";

const MAGIC: &[u8; 4] = b"DPVX";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

/// In-memory vector index bound to an embedder.
#[derive(Clone)]
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    dims: usize,
    vectors: Vec<Vec<f32>>,
    entries: Vec<Entry>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("model", &self.embedder.model_name())
            .field("dims", &self.dims)
            .field("len", &self.entries.len())
            .finish()
    }
}

impl VectorIndex {
    /// True when both index files are present in `dir`.
    pub fn exists(dir: &Path) -> bool {
        dir.join(VECTORS_FILE).is_file() && dir.join(ENTRIES_FILE).is_file()
    }

    /// Embeds `texts` and builds a new index. `metadatas` is matched by
    /// position; missing entries get empty metadata.
    pub async fn from_texts(
        embedder: Arc<dyn Embedder>,
        texts: &[String],
        metadatas: &[Metadata],
    ) -> Result<Self> {
        let mut index = Self {
            dims: embedder.dims(),
            embedder,
            vectors: Vec::new(),
            entries: Vec::new(),
        };
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(t.clone(), metadatas.get(i).cloned().unwrap_or_default()))
            .collect();
        index.add_documents(&chunks).await?;
        Ok(index)
    }

    /// Reads a persisted index from `dir`.
    pub fn load(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let vectors_path = dir.join(VECTORS_FILE);
        let entries_path = dir.join(ENTRIES_FILE);

        let blob = std::fs::read(&vectors_path).map_err(|source| Error::VectorIndexIo {
            path: vectors_path.clone(),
            source,
        })?;
        let (dims, mut vectors) = decode_vectors(&blob).map_err(|reason| Error::InvalidIndex {
            path: vectors_path.clone(),
            reason,
        })?;

        let json = std::fs::read(&entries_path).map_err(|source| Error::VectorIndexIo {
            path: entries_path.clone(),
            source,
        })?;
        let mut entries: Vec<Entry> = serde_json::from_slice(&json).map_err(|e| Error::InvalidIndex {
            path: entries_path.clone(),
            reason: e.to_string(),
        })?;

        if entries.len() != vectors.len() {
            // Interrupted save: both files agree on their common prefix.
            let keep = entries.len().min(vectors.len());
            warn!(
                dir = %dir.display(),
                vectors = vectors.len(),
                entries = entries.len(),
                keep,
                "index files disagree, truncating to common prefix"
            );
            vectors.truncate(keep);
            entries.truncate(keep);
        }
        if !vectors.is_empty() && embedder.dims() != 0 && embedder.dims() != dims {
            return Err(Error::InvalidIndex {
                path: vectors_path,
                reason: format!(
                    "index has {} dims but embedder {} produces {}",
                    dims,
                    embedder.model_name(),
                    embedder.dims()
                ),
            });
        }

        debug!(dir = %dir.display(), len = entries.len(), dims, "loaded vector index");
        Ok(Self {
            embedder,
            dims,
            vectors,
            entries,
        })
    }

    /// Embeds and appends chunks in order.
    pub async fn add_documents(&mut self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.page_content.clone()).collect();
        let vectors = self
            .embedder
            .embed_documents(&texts)
            .await
            .map_err(Error::Embedding)?;
        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(anyhow::anyhow!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                chunks.len()
            )));
        }
        for v in &vectors {
            if self.dims == 0 && self.vectors.is_empty() {
                self.dims = v.len();
            }
            if v.len() != self.dims {
                return Err(Error::Embedding(anyhow::anyhow!(
                    "embedding has {} dims, index expects {}",
                    v.len(),
                    self.dims
                )));
            }
        }
        self.vectors.extend(vectors);
        self.entries.extend(chunks.iter().map(|c| Entry {
            text: c.page_content.clone(),
            metadata: c.metadata.clone(),
        }));
        Ok(())
    }

    /// Persists both files into `dir`, entries first.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|source| Error::VectorIndexIo {
            path: dir.to_path_buf(),
            source,
        })?;
        let json = serde_json::to_vec(&self.entries)?;
        write_atomic(&dir.join(ENTRIES_FILE), &json)?;
        write_atomic(&dir.join(VECTORS_FILE), &encode_vectors(self.dims, &self.vectors))
    }

    /// Top-`k` entries by cosine similarity to `query`, best first.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let q = self
            .embedder
            .embed_query(query)
            .await
            .map_err(Error::Embedding)?;
        Ok(self.rank(&q, k))
    }

    fn rank(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| SearchHit {
                text: self.entries[i].text.clone(),
                metadata: self.entries[i].metadata.clone(),
                score,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }
}

fn encode_vectors(dims: usize, vectors: &[Vec<f32>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + vectors.len() * dims * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(dims as u32).to_le_bytes());
    out.extend_from_slice(&(vectors.len() as u64).to_le_bytes());
    for v in vectors {
        out.extend_from_slice(&vec_to_blob(v));
    }
    out
}

fn decode_vectors(blob: &[u8]) -> std::result::Result<(usize, Vec<Vec<f32>>), String> {
    if blob.len() < HEADER_LEN {
        return Err(format!("file too short ({} bytes)", blob.len()));
    }
    if &blob[..4] != MAGIC {
        return Err("bad magic".to_string());
    }
    let version = u32::from_le_bytes([blob[4], blob[5], blob[6], blob[7]]);
    if version != VERSION {
        return Err(format!("unsupported version {}", version));
    }
    let dims = u32::from_le_bytes([blob[8], blob[9], blob[10], blob[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&blob[12..20]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let body = &blob[HEADER_LEN..];
    let expected = count
        .checked_mul(dims)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| "size overflow".to_string())?;
    if body.len() != expected {
        return Err(format!(
            "expected {} bytes of vectors, found {}",
            expected,
            body.len()
        ));
    }
    let vectors = if dims == 0 {
        vec![Vec::new(); count]
    } else {
        body.chunks_exact(dims * 4).map(blob_to_vec).collect()
    };
    Ok((dims, vectors))
}
