//! Page-wise comparison of two documents.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::{Error, Result};
use crate::llm::{ChatMessage, ChatModel};
use crate::prompts::{json_format_instructions, parse_json_output, PromptType};

/// Differences found on one page. `changes` is `"NO CHANGE"` when the
/// page is identical in both documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRow {
    #[serde(rename = "Page", deserialize_with = "string_or_number")]
    pub page: String,
    #[serde(rename = "Changes")]
    pub changes: String,
}

fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Array of rows, or an object wrapping one (`{"rows": [...]}`).
#[derive(Deserialize)]
#[serde(untagged)]
enum ComparisonReply {
    Rows(Vec<ChangeRow>),
    Wrapped(serde_json::Map<String, Value>),
}

pub struct DocumentComparator {
    llm: Arc<dyn ChatModel>,
}

impl DocumentComparator {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    fn schema() -> Value {
        json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "Page": {"type": "string"},
                    "Changes": {"type": "string"}
                },
                "required": ["Page", "Changes"]
            }
        })
    }

    /// Compares the documents in `combined_docs` (as produced by
    /// [`crate::documents::combine_texts`]).
    pub async fn compare_documents(&self, combined_docs: &str) -> Result<Vec<ChangeRow>> {
        let instructions = json_format_instructions(&Self::schema());
        let prompt = PromptType::DocumentComparison.render(&[
            ("combined_docs", combined_docs),
            ("format_instruction", &instructions),
        ]);

        let reply = self
            .llm
            .complete(&[ChatMessage::user(prompt)])
            .await
            .map_err(Error::Llm)?;
        let rows = match parse_json_output::<ComparisonReply>(&reply)? {
            ComparisonReply::Rows(rows) => rows,
            ComparisonReply::Wrapped(map) => unwrap_rows(map)?,
        };

        info!(rows = rows.len(), "document comparison completed");
        Ok(rows)
    }
}

fn unwrap_rows(map: serde_json::Map<String, Value>) -> Result<Vec<ChangeRow>> {
    let array = map
        .into_iter()
        .find_map(|(_, v)| matches!(v, Value::Array(_)).then_some(v))
        .ok_or_else(|| Error::OutputParse("comparison output has no row array".to_string()))?;
    serde_json::from_value(array).map_err(|e| Error::OutputParse(e.to_string()))
}
