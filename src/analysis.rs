//! Structured metadata extraction for a single document.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::{Error, Result};
use crate::llm::{ChatMessage, ChatModel};
use crate::prompts::{json_format_instructions, parse_json_output, PromptType};

/// Fields the model is asked to fill in. Missing fields deserialize to
/// their defaults so partial answers still parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DocumentMetadata {
    pub summary: Vec<String>,
    pub title: String,
    pub author: String,
    pub date_created: String,
    pub last_modified: String,
    pub publisher: String,
    /// Integer or free text ("Not Available").
    pub page_count: Value,
    pub language: String,
    pub sentiment_tone: String,
}

impl DocumentMetadata {
    /// JSON schema sent to the model as format instructions.
    pub fn schema() -> Value {
        json!({
            "title": "Metadata",
            "type": "object",
            "properties": {
                "Summary": {"type": "array", "items": {"type": "string"}},
                "Title": {"type": "string"},
                "Author": {"type": "string"},
                "DateCreated": {"type": "string"},
                "LastModified": {"type": "string"},
                "Publisher": {"type": "string"},
                "PageCount": {"anyOf": [{"type": "integer"}, {"type": "string"}]},
                "Language": {"type": "string"},
                "SentimentTone": {"type": "string"}
            },
            "required": [
                "Summary", "Title", "Author", "DateCreated", "LastModified",
                "Publisher", "PageCount", "Language", "SentimentTone"
            ]
        })
    }
}

pub struct DocumentAnalyzer {
    llm: Arc<dyn ChatModel>,
}

impl DocumentAnalyzer {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    /// Asks the model for the document's metadata and summary.
    pub async fn analyze_document(&self, document_text: &str) -> Result<DocumentMetadata> {
        let instructions = json_format_instructions(&DocumentMetadata::schema());
        let prompt = PromptType::DocumentAnalysis.render(&[
            ("format_instructions", &instructions),
            ("document", document_text),
        ]);

        let reply = self
            .llm
            .complete(&[ChatMessage::user(prompt)])
            .await
            .map_err(Error::Llm)?;
        let metadata: DocumentMetadata = parse_json_output(&reply)?;

        info!(
            model = self.llm.name(),
            title = %metadata.title,
            summary_points = metadata.summary.len(),
            "metadata extraction successful"
        );
        Ok(metadata)
    }
}
