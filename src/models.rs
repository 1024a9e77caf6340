//! Core data types that flow through extraction, chunking, indexing and
//! retrieval.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata attached to documents and chunks.
///
/// Extraction always sets `source`; PDFs add `page` and `total_pages`.
pub type Metadata = serde_json::Map<String, Value>;

/// Primary metadata key holding a chunk's source identifier.
pub const SOURCE_KEY: &str = "source";
/// Fallback source key used when `source` is absent or empty.
pub const FILE_NAME_KEY: &str = "file_name";
/// Row/segment identifier within a source.
pub const ROW_ID_KEY: &str = "row_id";
/// 0-based page number set by the PDF extractor.
pub const PAGE_KEY: &str = "page";

/// Extracted text of one page or file, plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(page_content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    /// Document with a single `source` metadata entry.
    pub fn with_source(page_content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), Value::String(source.into()));
        Self::new(page_content, metadata)
    }
}

/// A bounded span of a document's text. Same shape as [`Document`]; the
/// alias marks values that went through the chunker.
pub type Chunk = Document;

/// A retrieval result, most similar first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: Metadata,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Renders a metadata value the way it should appear inside identifiers:
/// strings verbatim, everything else as JSON text.
pub fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_value_strings_are_verbatim() {
        assert_eq!(plain_value(&json!("a.pdf")), "a.pdf");
        assert_eq!(plain_value(&json!(3)), "3");
        assert_eq!(plain_value(&json!(true)), "true");
    }

    #[test]
    fn with_source_sets_source_only() {
        let doc = Document::with_source("hello", "/tmp/a.txt");
        assert_eq!(doc.metadata.len(), 1);
        assert_eq!(doc.metadata[SOURCE_KEY], json!("/tmp/a.txt"));
    }
}
