//! Recursive character text splitter.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters
//! with roughly `chunk_overlap` characters carried over between consecutive
//! chunks of the same document. Splitting prefers paragraph breaks, then
//! line breaks, then spaces, and only cuts inside a word when nothing else
//! fits. Every chunk inherits its document's metadata unchanged.
//!
//! Sizes are measured in Unicode scalar values, not bytes.

use std::collections::VecDeque;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{plain_value, Chunk, Document, PAGE_KEY, ROW_ID_KEY};

/// Separators tried in order; the empty separator splits into characters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidChunking("chunk_size must be > 0".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::InvalidChunking(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits raw text. Text that already fits is returned as a single,
    /// unmodified chunk.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }
        self.split_recursive(text, &SEPARATORS)
    }

    /// Splits one document; every chunk carries a copy of its metadata.
    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        self.split_text(&doc.page_content)
            .into_iter()
            .map(|text| Chunk::new(text, doc.metadata.clone()))
            .collect()
    }

    /// Splits documents in order, preserving metadata.
    pub fn split_documents(&self, docs: &[Document]) -> Vec<Chunk> {
        docs.iter().flat_map(|d| self.split_document(d)).collect()
    }

    /// Like [`split_documents`](Self::split_documents), but stamps each chunk
    /// lacking a `row_id` with `"{page}:{n}"`, where `n` counts chunks
    /// within the originating document. Without it every chunk of a file
    /// would share the fingerprint `"{source}::"`.
    pub fn split_documents_numbered(&self, docs: &[Document]) -> Vec<Chunk> {
        let mut out = Vec::new();
        for doc in docs {
            let page = doc
                .metadata
                .get(PAGE_KEY)
                .map(plain_value)
                .unwrap_or_else(|| "0".to_string());
            for (n, mut chunk) in self.split_document(doc).into_iter().enumerate() {
                if !chunk.metadata.contains_key(ROW_ID_KEY) {
                    chunk
                        .metadata
                        .insert(ROW_ID_KEY.to_string(), Value::String(format!("{}:{}", page, n)));
                }
                out.push(chunk);
            }
        }
        out
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let idx = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len() - 1);
        let separator = separators[idx];
        let finer = &separators[idx + 1..];

        let mut out = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keep_start(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            } else {
                out.extend(self.split_recursive(piece, finer));
            }
        }

        if !fitting.is_empty() {
            out.extend(self.merge(&fitting));
        }
        out
    }

    /// Greedily packs pieces into chunks, keeping a tail of at most
    /// `chunk_overlap` characters as the start of the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(first) => total -= char_len(first),
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }
        push_joined(&mut docs, &current);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, current: &VecDeque<&str>) {
    let joined: String = current.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// Splits on `separator`, keeping it at the start of the following piece.
/// The empty separator yields single characters.
fn split_keep_start<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, _) in text.match_indices(separator) {
        if i > start {
            pieces.push(&text[start..i]);
        }
        start = i;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, SOURCE_KEY};
    use serde_json::json;

    fn doc(text: &str, source: &str) -> Document {
        Document::with_source(text, source)
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(matches!(TextSplitter::new(0, 0), Err(Error::InvalidChunking(_))));
        assert!(matches!(TextSplitter::new(10, 10), Err(Error::InvalidChunking(_))));
        assert!(TextSplitter::new(10, 9).is_ok());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let splitter = TextSplitter::new(1000, 200).unwrap();
        let text = "  Hello, world!\n\nSecond paragraph.  ";
        let chunks = splitter.split_documents(&[doc(text, "a.txt")]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_content, text);
        assert_eq!(chunks[0].metadata[SOURCE_KEY], json!("a.txt"));
    }

    #[test]
    fn test_long_text_respects_size_and_metadata() {
        let splitter = TextSplitter::new(100, 20).unwrap();
        let text = "This is a single sentence. ".repeat(40); // 1080 chars
        let mut md = Metadata::new();
        md.insert("source".into(), json!("test_file.txt"));
        md.insert("page".into(), json!(3));
        let chunks = splitter.split_documents(&[Document::new(text, md.clone())]);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.page_content.chars().count() <= 100, "chunk too long: {}", c.page_content.len());
            assert!(!c.page_content.is_empty());
            assert_eq!(c.metadata, md);
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let splitter = TextSplitter::new(50, 15).unwrap();
        let text = (0..40).map(|i| format!("w{:02}", i)).collect::<Vec<_>>().join(" ");
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let first_word = pair[1].split(' ').next().unwrap();
            assert!(
                pair[0].split(' ').any(|w| w == first_word),
                "expected {:?} to overlap with {:?}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let splitter = TextSplitter::new(30, 0).unwrap();
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird one.";
        let chunks = splitter.split_text(text);
        assert_eq!(
            chunks,
            vec!["First paragraph here.", "Second paragraph here.", "Third one."]
        );
    }

    #[test]
    fn test_hard_split_without_separators() {
        let splitter = TextSplitter::new(10, 2).unwrap();
        let text = "x".repeat(35);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() >= 4);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_multibyte_counts_characters() {
        let splitter = TextSplitter::new(10, 0).unwrap();
        let text = "éééé àààà üüüü";
        let chunks = splitter.split_text(text);
        assert_eq!(chunks, vec!["éééé àààà", "üüüü"]);
    }

    #[test]
    fn test_order_follows_documents() {
        let splitter = TextSplitter::new(1000, 0).unwrap();
        let chunks = splitter.split_documents(&[doc("one", "a"), doc("two", "b"), doc("three", "c")]);
        let texts: Vec<_> = chunks.iter().map(|c| c.page_content.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_numbered_row_ids() {
        let splitter = TextSplitter::new(20, 0).unwrap();
        let mut md = Metadata::new();
        md.insert("source".into(), json!("a.pdf"));
        md.insert("page".into(), json!(2));
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let chunks = splitter.split_documents_numbered(&[Document::new(text, md)]);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.metadata["row_id"], json!(format!("2:{}", i)));
        }
    }

    #[test]
    fn test_numbering_keeps_existing_row_id() {
        let splitter = TextSplitter::new(100, 0).unwrap();
        let mut md = Metadata::new();
        md.insert("source".into(), json!("a.csv"));
        md.insert("row_id".into(), json!("r7"));
        let chunks = splitter.split_documents_numbered(&[Document::new("short", md)]);
        assert_eq!(chunks[0].metadata["row_id"], json!("r7"));
    }

    #[test]
    fn test_deterministic() {
        let splitter = TextSplitter::new(16, 4).unwrap();
        let text = "Alpha\n\nBeta gamma delta\n\nGamma\n\nDelta epsilon zeta eta";
        assert_eq!(splitter.split_text(text), splitter.split_text(text));
    }
}
