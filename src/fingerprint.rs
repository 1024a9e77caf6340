//! Stable chunk identities for deduplication.
//!
//! A chunk that knows where it came from is identified by
//! `"{source}::{row_id}"`. A chunk without a source falls back to the
//! SHA-256 of its text, so identical anonymous text always collapses to one
//! entry no matter what other metadata it carries.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::{plain_value, Metadata, FILE_NAME_KEY, ROW_ID_KEY, SOURCE_KEY};

/// Computes the dedup key for a chunk.
pub fn fingerprint(text: &str, metadata: &Metadata) -> String {
    match source_of(metadata) {
        Some(source) => {
            let row_id = metadata
                .get(ROW_ID_KEY)
                .filter(|v| !v.is_null())
                .map(plain_value)
                .unwrap_or_default();
            format!("{}::{}", plain_value(source), row_id)
        }
        None => content_hash(text),
    }
}

/// Lowercase hex SHA-256 of the UTF-8 text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// `source` when it is set to something non-empty, else `file_name` when
/// present at all.
fn source_of(metadata: &Metadata) -> Option<&Value> {
    metadata
        .get(SOURCE_KEY)
        .filter(|v| is_truthy(v))
        .or_else(|| metadata.get(FILE_NAME_KEY).filter(|v| !v.is_null()))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn source_and_row_id() {
        let md = meta(json!({"source": "a.pdf", "row_id": "0:3"}));
        assert_eq!(fingerprint("whatever", &md), "a.pdf::0:3");
    }

    #[test]
    fn missing_row_id_is_empty() {
        let md = meta(json!({"source": "a.pdf"}));
        assert_eq!(fingerprint("x", &md), "a.pdf::");
        let md = meta(json!({"source": "a.pdf", "row_id": null}));
        assert_eq!(fingerprint("x", &md), "a.pdf::");
    }

    #[test]
    fn numeric_row_id_uses_json_text() {
        let md = meta(json!({"source": "a.pdf", "row_id": 7}));
        assert_eq!(fingerprint("x", &md), "a.pdf::7");
    }

    #[test]
    fn file_name_is_fallback_key() {
        let md = meta(json!({"file_name": "b.docx", "row_id": "1"}));
        assert_eq!(fingerprint("x", &md), "b.docx::1");
        let md = meta(json!({"source": "", "file_name": "b.docx"}));
        assert_eq!(fingerprint("x", &md), "b.docx::");
    }

    #[test]
    fn deterministic() {
        let md = meta(json!({"source": "a.pdf", "row_id": "2"}));
        assert_eq!(fingerprint("t", &md), fingerprint("t", &md));
        assert_eq!(fingerprint("t", &Metadata::new()), fingerprint("t", &Metadata::new()));
    }

    #[test]
    fn row_id_changes_fingerprint() {
        let a = meta(json!({"source": "a.pdf", "row_id": "1"}));
        let b = meta(json!({"source": "a.pdf", "row_id": "2"}));
        assert_ne!(fingerprint("same", &a), fingerprint("same", &b));
    }

    #[test]
    fn no_source_hashes_content() {
        let md = meta(json!({"page": 4}));
        assert_eq!(
            fingerprint("hello", &md),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn content_hash_ignores_other_metadata() {
        let a = meta(json!({"page": 1}));
        let b = meta(json!({"author": "someone", "row_id": "9"}));
        assert_eq!(fingerprint("same text", &a), fingerprint("same text", &b));
        assert_ne!(fingerprint("text one", &a), fingerprint("text two", &a));
    }
}
