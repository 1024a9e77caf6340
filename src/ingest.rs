//! Session-scoped ingestion: uploads in, retriever out.
//!
//! ```text
//! uploads ─▶ session temp dir ─▶ extract ─▶ chunk ─▶ IndexManager ─▶ Retriever
//! ```
//!
//! Each step runs to completion before the next starts. Whatever fails
//! along the way is returned once, wrapped in [`Error::Ingestion`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use tracing::{error, info};

use crate::chunk::TextSplitter;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::extract::load_documents;
use crate::index::{IndexManager, Retriever};
use crate::models::Metadata;
use crate::session::Session;
use crate::upload::{save_uploaded_files, UploadedFile};

/// Result of one ingestion call.
#[derive(Debug)]
pub struct IngestOutcome {
    pub retriever: Retriever,
    /// Chunks produced from the uploads.
    pub total_chunks: usize,
    /// Chunks that were new to the index.
    pub chunks_added: usize,
}

/// Ingests uploads for one chat session into its own index directory.
pub struct ChatIngestor {
    session: Session,
    embedder: Arc<dyn Embedder>,
}

impl ChatIngestor {
    /// Resolves the session's upload and index directories.
    pub fn new(
        temp_base: &Path,
        index_base: &Path,
        session_id: Option<&str>,
        use_session_dirs: bool,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let session = Session::open(temp_base, index_base, session_id, use_session_dirs)
            .map_err(|e| {
                error!(error = %e, "failed to initialize ingestor");
                Error::ingestion(e)
            })?;
        Ok(Self { session, embedder })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn index_dir(&self) -> &Path {
        &self.session.index_dir
    }

    /// Saves, extracts, chunks and indexes `uploads`, then returns a
    /// top-`k` retriever over the session index.
    pub async fn build_retriever<U: UploadedFile>(
        &self,
        uploads: &[U],
        chunk_size: usize,
        chunk_overlap: usize,
        k: usize,
    ) -> Result<IngestOutcome> {
        self.run(uploads, chunk_size, chunk_overlap, k)
            .await
            .map_err(|e| {
                error!(session_id = %self.session.id, error = %e, "failed to build retriever");
                Error::ingestion(e)
            })
    }

    async fn run<U: UploadedFile>(
        &self,
        uploads: &[U],
        chunk_size: usize,
        chunk_overlap: usize,
        k: usize,
    ) -> Result<IngestOutcome> {
        let splitter = TextSplitter::new(chunk_size, chunk_overlap)?;

        let paths = save_uploaded_files(&self.session.temp_dir, uploads)?;
        let docs = load_documents(&paths)?;
        if docs.is_empty() {
            return Err(Error::NoValidDocuments);
        }

        let chunks = splitter.split_documents_numbered(&docs);
        info!(
            session_id = %self.session.id,
            documents = docs.len(),
            chunks = chunks.len(),
            chunk_size,
            chunk_overlap,
            "documents split"
        );

        let mut manager = IndexManager::new(&self.session.index_dir, self.embedder.clone())?;
        let texts: Vec<String> = chunks.iter().map(|c| c.page_content.clone()).collect();
        let metas: Vec<Metadata> = chunks.iter().map(|c| c.metadata.clone()).collect();
        manager.load_or_create(&texts, &metas).await?;
        let seeded = if manager.was_created() { manager.len() } else { 0 };
        let added = seeded + manager.add_documents(&chunks).await?;

        info!(
            session_id = %self.session.id,
            index = %self.session.index_dir.display(),
            added,
            "index updated"
        );

        Ok(IngestOutcome {
            retriever: manager.into_retriever(k)?,
            total_chunks: chunks.len(),
            chunks_added: added,
        })
    }
}

/// Per-index-directory async locks.
///
/// [`IndexManager`] does not guard its directory; callers that may ingest
/// into the same directory concurrently hold the lock across
/// `load_or_create` and `add_documents`. A directory's entry is removed
/// when its last guard is released and nobody is waiting on it.
#[derive(Debug, Clone, Default)]
pub struct IndexLocks {
    inner: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
}

impl IndexLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `dir`.
    pub async fn lock(&self, dir: &Path) -> IndexLockGuard {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            map.entry(dir.to_path_buf()).or_default().clone()
        };
        IndexLockGuard {
            locks: self.inner.clone(),
            dir: dir.to_path_buf(),
            guard: Some(entry.lock_owned().await),
        }
    }

    /// Number of directories currently locked or awaited.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one index directory; released on drop.
#[derive(Debug)]
pub struct IndexLockGuard {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
    dir: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IndexLockGuard {
    fn drop(&mut self) {
        let mut map = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        drop(self.guard.take());
        // Clones are only taken under the map lock, so a count of one
        // means no holder and no waiter.
        if map
            .get(&self.dir)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            map.remove(&self.dir);
        }
    }
}
