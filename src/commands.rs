//! Implementations of the `portal` CLI commands that work on local files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::history::ChatHistoryStore;
use crate::index::{Retriever, VectorIndex};
use crate::ingest::ChatIngestor;
use crate::llm::create_chat_model;
use crate::models::{plain_value, FILE_NAME_KEY, SOURCE_KEY};
use crate::rag::ConversationalRag;
use crate::session::index_dir_for;
use crate::upload::InMemoryUpload;

/// Options shared by `ingest`, `search` and `ask`.
#[derive(Debug, Clone, Default)]
pub struct SessionArgs {
    pub session: Option<String>,
    /// Overrides `[storage].use_session_dirs` when set.
    pub no_session_dirs: bool,
}

impl SessionArgs {
    fn use_session_dirs(&self, cfg: &Config) -> bool {
        cfg.storage.use_session_dirs && !self.no_session_dirs
    }
}

fn enabled_embedder(cfg: &Config) -> Result<Arc<dyn Embedder>> {
    if !cfg.embedding.is_enabled() {
        bail!("No embedding provider configured. Set [embedding].provider in the config file.");
    }
    create_embedder(&cfg.embedding)
}

fn open_retriever(cfg: &Config, args: &SessionArgs, k: usize) -> Result<Retriever> {
    let use_sessions = args.use_session_dirs(cfg);
    if use_sessions && args.session.is_none() {
        bail!("--session is required when session directories are enabled");
    }
    let dir = index_dir_for(&cfg.storage.index_base, args.session.as_deref(), use_sessions)?;
    if !VectorIndex::exists(&dir) {
        bail!("Index not found at: {}", dir.display());
    }
    Ok(Retriever::open(&dir, enabled_embedder(cfg)?, k)?)
}

/// `portal ingest <files...>`
pub async fn run_ingest(
    cfg: &Config,
    files: &[PathBuf],
    args: &SessionArgs,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
) -> Result<()> {
    let embedder = enabled_embedder(cfg)?;
    let uploads = files
        .iter()
        .map(|path| read_upload(path))
        .collect::<Result<Vec<_>>>()?;

    let use_sessions = args.use_session_dirs(cfg);
    let ingestor = ChatIngestor::new(
        &cfg.storage.upload_base,
        &cfg.storage.index_base,
        args.session.as_deref(),
        use_sessions,
        embedder,
    )?;
    let outcome = ingestor
        .build_retriever(
            &uploads,
            chunk_size.unwrap_or(cfg.chunking.chunk_size),
            chunk_overlap.unwrap_or(cfg.chunking.chunk_overlap),
            cfg.retrieval.k,
        )
        .await?;

    println!("Ingest session: {}", ingestor.session_id());
    println!("  files: {}", uploads.len());
    println!("  chunks: {}", outcome.total_chunks);
    println!("  chunks added: {}", outcome.chunks_added);
    println!("  index size: {}", outcome.retriever.len());
    println!("  index dir: {}", ingestor.index_dir().display());
    Ok(())
}

fn read_upload(path: &Path) -> Result<InMemoryUpload> {
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    Ok(InMemoryUpload::new(name, data))
}

/// `portal search <query>`
pub async fn run_search(cfg: &Config, query: &str, args: &SessionArgs, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let k = k.unwrap_or(cfg.retrieval.k);
    let hits = open_retriever(cfg, args, k)?.retrieve(query).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let source = hit
            .metadata
            .get(FILE_NAME_KEY)
            .or_else(|| hit.metadata.get(SOURCE_KEY))
            .map(plain_value)
            .unwrap_or_else(|| "(unknown)".to_string());
        println!("{}. [{:.2}] {}", i + 1, hit.score, source);
        println!("    excerpt: \"{}\"", excerpt(&hit.text, 240));
        println!();
    }
    Ok(())
}

/// `portal ask <question>`: one RAG turn against a session index.
pub async fn run_ask(cfg: &Config, question: &str, args: &SessionArgs, k: Option<usize>) -> Result<()> {
    let retriever = open_retriever(cfg, args, k.unwrap_or(cfg.retrieval.k))?;
    let llm = create_chat_model(&cfg.llm)?;
    let rag = ConversationalRag::new(llm, retriever, ChatHistoryStore::new());
    let key = args.session.as_deref().unwrap_or("default");
    let answer = rag.invoke(key, question).await?;
    println!("{}", answer);
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        flat.to_string()
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
