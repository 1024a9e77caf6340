//! # Document Portal
//!
//! Upload documents, index them per session with content-addressed
//! deduplication, and answer questions about them with an LLM. Also
//! extracts structured metadata from a single PDF and compares two PDFs
//! page by page.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌──────────────┐
//! │ Uploads  │──▶│ Extract  │──▶│  Chunk  │──▶│ IndexManager │
//! │ (session)│   │ PDF/DOCX │   │         │   │ dedup+persist│
//! └──────────┘   └──────────┘   └─────────┘   └──────┬───────┘
//!                                                    │
//!                           ┌────────────────────────┤
//!                           ▼                        ▼
//!                      ┌──────────┐            ┌──────────┐
//!                      │   CLI    │            │   HTTP   │
//!                      │ (portal) │            │  (axum)  │
//!                      └──────────┘            └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Documents, chunks, search hits |
//! | [`error`] | Library error type |
//! | [`fingerprint`] | Stable chunk identity |
//! | [`chunk`] | Recursive character text splitting |
//! | [`session`] | Per-session directory allocation |
//! | [`upload`] | Uploaded file abstraction |
//! | [`extract`] | PDF/DOCX/TXT text extraction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index, ingestion metadata, incremental manager |
//! | [`ingest`] | Session-scoped ingestion pipeline |
//! | [`llm`] | Chat model providers |
//! | [`prompts`] | Prompt templates and JSON output parsing |
//! | [`history`] | Per-session chat history |
//! | [`rag`] | Conversational retrieval chain |
//! | [`analysis`] | Document metadata extraction |
//! | [`compare`] | Page-wise document comparison |
//! | [`documents`] | PDF handlers for analysis and comparison |
//! | [`commands`] | CLI command implementations |
//! | [`server`] | HTTP API |

pub mod analysis;
pub mod chunk;
pub mod commands;
pub mod compare;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod history;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod rag;
pub mod server;
pub mod session;
pub mod upload;
