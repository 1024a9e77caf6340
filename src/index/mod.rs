//! Persisted vector indexes with fingerprint-based deduplication.
//!
//! - [`metadata`]: the `ingested_meta.json` fingerprint set
//! - [`store`]: the on-disk vector index and cosine search
//! - [`manager`]: create-or-load plus deduplicated appends

pub mod manager;
pub mod metadata;
pub mod store;

pub use manager::{IndexManager, IndexState, Retriever};
pub use metadata::{MetadataStore, METADATA_FILE};
pub use store::VectorIndex;
