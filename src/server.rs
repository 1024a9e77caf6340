//! HTTP API for the document portal.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/analyze` | Extract structured metadata from one PDF (`file`) |
//! | `POST` | `/compare` | Page-wise diff of two PDFs (`reference`, `actual`) |
//! | `POST` | `/chat/index` | Ingest `files` into a session index |
//! | `POST` | `/chat/query` | Answer `question` from a session index |
//!
//! All `POST` routes take `multipart/form-data`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embeddings_disabled` (400),
//! `not_found` (404), `llm_error` (500), `ingestion_failed` (500),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::analysis::{DocumentAnalyzer, DocumentMetadata};
use crate::compare::{ChangeRow, DocumentComparator};
use crate::config::Config;
use crate::documents::{ComparisonIngestor, DocHandler};
use crate::embedding::{create_embedder, Embedder};
use crate::error::Error;
use crate::history::ChatHistoryStore;
use crate::index::{Retriever, VectorIndex};
use crate::ingest::{ChatIngestor, IndexLocks};
use crate::llm::{create_chat_model, ChatModel};
use crate::rag::ConversationalRag;
use crate::session::index_dir_for;
use crate::upload::InMemoryUpload;

/// Uploads larger than this are rejected by the multipart extractor.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// History key for queries made without a session id.
const DEFAULT_HISTORY_KEY: &str = "default";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
    history: ChatHistoryStore,
    locks: IndexLocks,
}

impl AppState {
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, llm: Arc<dyn ChatModel>) -> Self {
        Self {
            config: Arc::new(config),
            embedder,
            llm,
            history: ChatHistoryStore::new(),
            locks: IndexLocks::new(),
        }
    }

    /// Builds the embedder and chat model named in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let llm = create_chat_model(&config.llm)?;
        Ok(Self::new(config.clone(), embedder, llm))
    }
}

/// Routes with CORS and the upload size limit applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/analyze", post(handle_analyze))
        .route("/compare", post(handle_compare))
        .route("/chat/index", post(handle_chat_index))
        .route("/chat/query", post(handle_chat_query))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Starts the portal server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    info!(
        embedding = %state.embedder.model_name(),
        llm = %state.llm.name(),
        "providers ready"
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "document portal listening");
    axum::serve(listener, router(state)).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

fn embeddings_disabled() -> AppError {
    app_error(
        StatusCode::BAD_REQUEST,
        "embeddings_disabled",
        "an embedding provider must be configured for chat routes",
    )
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        if err.is_client_error() || matches!(err, Error::Config(_)) {
            return bad_request(message);
        }
        error!(error = %message, "request failed");
        let code = match err.root() {
            Error::Llm(_) | Error::OutputParse(_) => "llm_error",
            _ if matches!(err, Error::Ingestion { .. }) => "ingestion_failed",
            _ => "internal",
        };
        app_error(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }
}

// ============ Multipart forms ============

/// Text fields and uploaded files of one multipart request.
#[derive(Default)]
struct Form {
    fields: HashMap<String, String>,
    files: Vec<(String, InMemoryUpload)>,
}

impl Form {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let invalid = |e: axum::extract::multipart::MultipartError| {
            bad_request(format!("invalid multipart body: {}", e))
        };
        let mut form = Form::default();
        while let Some(field) = multipart.next_field().await.map_err(invalid)? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field.bytes().await.map_err(invalid)?;
                    form.files
                        .push((name, InMemoryUpload::new(file_name, data.to_vec())));
                }
                None => {
                    let value = field.text().await.map_err(invalid)?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    /// Non-blank text field.
    fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn number<T: FromStr>(&self, name: &str, default: T) -> Result<T, AppError> {
        match self.text(name) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| bad_request(format!("{} must be a non-negative integer", name))),
        }
    }

    fn flag(&self, name: &str, default: bool) -> Result<bool, AppError> {
        match self.text(name).map(str::to_ascii_lowercase).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes" | "on") => Ok(true),
            Some("false" | "0" | "no" | "off") => Ok(false),
            Some(_) => Err(bad_request(format!("{} must be a boolean", name))),
        }
    }

    /// First file uploaded under `name`.
    fn take_file(&mut self, name: &str) -> Option<InMemoryUpload> {
        let pos = self.files.iter().position(|(n, _)| n == name)?;
        Some(self.files.remove(pos).1)
    }

    /// Every file uploaded under any of `names`, in request order.
    fn files_named(&self, names: &[&str]) -> Vec<InMemoryUpload> {
        self.files
            .iter()
            .filter(|(n, _)| names.contains(&n.as_str()))
            .map(|(_, f)| f.clone())
            .collect()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    message: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "API is healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /analyze ============

async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<DocumentMetadata>, AppError> {
    let mut form = Form::read(multipart).await?;
    let upload = form
        .take_file("file")
        .ok_or_else(|| bad_request("missing file field `file`"))?;

    let handler = DocHandler::new(&state.config.storage.analysis_base, None)?;
    let path = handler.save_pdf(&upload)?;
    let text = handler.read_pdf(&path)?;

    let metadata = DocumentAnalyzer::new(state.llm.clone())
        .analyze_document(&text)
        .await?;
    Ok(Json(metadata))
}

// ============ POST /compare ============

#[derive(Serialize)]
struct CompareResponse {
    rows: Vec<ChangeRow>,
    session_id: String,
}

async fn handle_compare(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CompareResponse>, AppError> {
    let mut form = Form::read(multipart).await?;
    let reference = form
        .take_file("reference")
        .ok_or_else(|| bad_request("missing file field `reference`"))?;
    let actual = form
        .take_file("actual")
        .ok_or_else(|| bad_request("missing file field `actual`"))?;

    let ingestor = ComparisonIngestor::new(&state.config.storage.compare_base, None)?;
    ingestor.save_uploaded_files(&reference, &actual)?;
    let combined = ingestor.combine_documents()?;

    let rows = DocumentComparator::new(state.llm.clone())
        .compare_documents(&combined)
        .await?;
    Ok(Json(CompareResponse {
        rows,
        session_id: ingestor.session_id().to_string(),
    }))
}

// ============ POST /chat/index ============

#[derive(Serialize)]
struct IndexResponse {
    session_id: String,
    k: usize,
    use_session_dirs: bool,
    chunks_added: usize,
}

async fn handle_chat_index(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<IndexResponse>, AppError> {
    if !state.config.embedding.is_enabled() {
        return Err(embeddings_disabled());
    }
    let form = Form::read(multipart).await?;
    let cfg = &state.config;
    let use_session_dirs = form.flag("use_session_dirs", cfg.storage.use_session_dirs)?;
    let chunk_size = form.number("chunk_size", cfg.chunking.chunk_size)?;
    let chunk_overlap = form.number("chunk_overlap", cfg.chunking.chunk_overlap)?;
    let k = form.number("k", cfg.retrieval.k)?;

    let uploads = form.files_named(&["files", "files[]"]);
    if uploads.is_empty() {
        return Err(bad_request("no files uploaded"));
    }

    let ingestor = ChatIngestor::new(
        &cfg.storage.upload_base,
        &cfg.storage.index_base,
        form.text("session_id"),
        use_session_dirs,
        state.embedder.clone(),
    )?;

    let outcome = {
        let _guard = state.locks.lock(ingestor.index_dir()).await;
        ingestor
            .build_retriever(&uploads, chunk_size, chunk_overlap, k)
            .await?
    };

    Ok(Json(IndexResponse {
        session_id: ingestor.session_id().to_string(),
        k,
        use_session_dirs,
        chunks_added: outcome.chunks_added,
    }))
}

// ============ POST /chat/query ============

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    session_id: Option<String>,
    k: usize,
    engine: String,
}

async fn handle_chat_query(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<QueryResponse>, AppError> {
    if !state.config.embedding.is_enabled() {
        return Err(embeddings_disabled());
    }
    let form = Form::read(multipart).await?;
    let question = form
        .text("question")
        .ok_or_else(|| bad_request("question must not be empty"))?;
    let session_id = form.text("session_id");
    let use_session_dirs = form.flag("use_session_dirs", state.config.storage.use_session_dirs)?;
    let k = form.number("k", state.config.retrieval.k)?;

    if use_session_dirs && session_id.is_none() {
        return Err(bad_request(
            "session_id is required when use_session_dirs=true",
        ));
    }

    let dir = index_dir_for(&state.config.storage.index_base, session_id, use_session_dirs)?;
    let retriever = {
        let _guard = state.locks.lock(&dir).await;
        if !dir.is_dir() || !VectorIndex::exists(&dir) {
            return Err(not_found(format!("index not found at: {}", dir.display())));
        }
        Retriever::open(&dir, state.embedder.clone(), k)?
    };

    let rag = ConversationalRag::new(state.llm.clone(), retriever, state.history.clone());
    let answer = rag
        .invoke(session_id.unwrap_or(DEFAULT_HISTORY_KEY), question)
        .await?;

    Ok(Json(QueryResponse {
        answer,
        session_id: session_id.map(str::to_string),
        k,
        engine: state.llm.name().to_string(),
    }))
}
