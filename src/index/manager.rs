//! Incremental, deduplicating index management.
//!
//! [`IndexManager`] owns one index directory. It loads the fingerprint set
//! at construction, then moves from [`IndexState::Uninitialized`] to either
//! [`IndexState::Loaded`] (index files already on disk) or
//! [`IndexState::Created`] (built from seed texts) on the first
//! [`load_or_create`](IndexManager::load_or_create). Both targets are
//! terminal.
//!
//! Every write persists the index files first and the fingerprint file
//! second. A crash in between leaves fingerprints understating what is
//! embedded: loading trims the index files to their common prefix, and
//! chunks past the recorded fingerprints are embedded again on the next
//! run.
//!
//! The manager holds no lock. Two managers writing the same directory can
//! lose each other's updates; callers that share a directory serialize
//! through [`IndexLocks`](crate::ingest::IndexLocks).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::metadata::MetadataStore;
use super::store::VectorIndex;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::fingerprint::fingerprint;
use crate::models::{Chunk, Metadata, SearchHit};

#[derive(Debug)]
pub enum IndexState {
    Uninitialized,
    Loaded(VectorIndex),
    Created(VectorIndex),
}

impl IndexState {
    fn index(&self) -> Option<&VectorIndex> {
        match self {
            IndexState::Uninitialized => None,
            IndexState::Loaded(index) | IndexState::Created(index) => Some(index),
        }
    }

    fn index_mut(&mut self) -> Option<&mut VectorIndex> {
        match self {
            IndexState::Uninitialized => None,
            IndexState::Loaded(index) | IndexState::Created(index) => Some(index),
        }
    }

    fn into_index(self) -> Option<VectorIndex> {
        match self {
            IndexState::Uninitialized => None,
            IndexState::Loaded(index) | IndexState::Created(index) => Some(index),
        }
    }
}

pub struct IndexManager {
    dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    metadata: MetadataStore,
    state: IndexState,
}

impl IndexManager {
    /// Creates `dir` if needed and reads its fingerprint file. Missing or
    /// corrupt metadata starts empty.
    pub fn new(dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| Error::VectorIndexIo {
            path: dir.clone(),
            source,
        })?;
        let metadata = MetadataStore::load(&dir);
        debug!(dir = %dir.display(), fingerprints = metadata.len(), "index manager ready");
        Ok(Self {
            dir,
            embedder,
            metadata,
            state: IndexState::Uninitialized,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state(&self) -> &IndexState {
        &self.state
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self.state, IndexState::Uninitialized)
    }

    /// True when this manager built the index rather than loading it.
    pub fn was_created(&self) -> bool {
        matches!(self.state, IndexState::Created(_))
    }

    /// Number of vectors in the index (0 before initialization).
    pub fn len(&self) -> usize {
        self.state.index().map_or(0, VectorIndex::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Loads the on-disk index, or builds one from `texts` when none exists.
    ///
    /// Seed texts are deduplicated by fingerprint and recorded, so adding
    /// the same chunks afterwards is a no-op. Once initialized, later calls
    /// return the existing index and ignore their arguments.
    ///
    /// # Errors
    ///
    /// [`Error::NoDataToInitialize`] when there is no index on disk and
    /// `texts` is empty.
    pub async fn load_or_create(
        &mut self,
        texts: &[String],
        metadatas: &[Metadata],
    ) -> Result<&VectorIndex> {
        if self.is_initialized() {
            return self.state.index().ok_or(Error::NotInitialized);
        }

        if VectorIndex::exists(&self.dir) {
            let index = VectorIndex::load(&self.dir, self.embedder.clone())?;
            info!(dir = %self.dir.display(), len = index.len(), "loaded existing index");
            self.state = IndexState::Loaded(index);
        } else {
            if texts.is_empty() {
                return Err(Error::NoDataToInitialize);
            }
            // No vectors on disk, so any recorded fingerprint is stale.
            if !self.metadata.is_empty() {
                warn!(
                    dir = %self.dir.display(),
                    stale = self.metadata.len(),
                    "discarding fingerprints without an index"
                );
                self.metadata.clear();
            }
            let mut keys = Vec::with_capacity(texts.len());
            let mut seed_texts = Vec::with_capacity(texts.len());
            let mut seed_metas = Vec::with_capacity(texts.len());
            let mut seen = HashSet::new();
            for (i, text) in texts.iter().enumerate() {
                let md = metadatas.get(i).cloned().unwrap_or_default();
                let key = fingerprint(text, &md);
                if seen.insert(key.clone()) {
                    keys.push(key);
                    seed_texts.push(text.clone());
                    seed_metas.push(md);
                }
            }
            let index =
                VectorIndex::from_texts(self.embedder.clone(), &seed_texts, &seed_metas).await?;
            index.save(&self.dir)?;
            for key in keys {
                self.metadata.insert(key);
            }
            self.metadata.save()?;
            info!(dir = %self.dir.display(), len = index.len(), "created new index");
            self.state = IndexState::Created(index);
        }

        self.state.index().ok_or(Error::NotInitialized)
    }

    /// Embeds and persists the chunks whose fingerprints are not yet
    /// recorded. Returns how many were added.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before [`load_or_create`](Self::load_or_create).
    pub async fn add_documents(&mut self, chunks: &[Chunk]) -> Result<usize> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }

        let mut seen = HashSet::new();
        let mut new_keys = Vec::new();
        let mut new_chunks = Vec::new();
        for chunk in chunks {
            let key = fingerprint(&chunk.page_content, &chunk.metadata);
            if self.metadata.contains(&key) || !seen.insert(key.clone()) {
                continue;
            }
            new_keys.push(key);
            new_chunks.push(chunk.clone());
        }

        if new_chunks.is_empty() {
            debug!(dir = %self.dir.display(), offered = chunks.len(), "nothing new to index");
            return Ok(0);
        }

        let index = self.state.index_mut().ok_or(Error::NotInitialized)?;
        index.add_documents(&new_chunks).await?;
        index.save(&self.dir)?;
        for key in new_keys {
            self.metadata.insert(key);
        }
        self.metadata.save()?;

        info!(
            dir = %self.dir.display(),
            offered = chunks.len(),
            added = new_chunks.len(),
            "index updated"
        );
        Ok(new_chunks.len())
    }

    /// Snapshot retriever over the current index.
    pub fn retriever(&self, k: usize) -> Result<Retriever> {
        let index = self.state.index().ok_or(Error::NotInitialized)?;
        Ok(Retriever::new(Arc::new(index.clone()), k))
    }

    /// Consumes the manager, handing its index to a retriever.
    pub fn into_retriever(self, k: usize) -> Result<Retriever> {
        let index = self.state.into_index().ok_or(Error::NotInitialized)?;
        Ok(Retriever::new(Arc::new(index), k))
    }
}

/// Read-only similarity search over an index, returning the top `k` hits.
#[derive(Debug, Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    k: usize,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, k: usize) -> Self {
        Self { index, k }
    }

    /// Loads the persisted index in `dir`.
    pub fn open(dir: &Path, embedder: Arc<dyn Embedder>, k: usize) -> Result<Self> {
        let index = VectorIndex::load(dir, embedder)?;
        Ok(Self::new(Arc::new(index), k))
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.index.similarity_search(query, k).await
    }

    /// Searches with the configured `k`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.search(query, self.k).await
    }
}
