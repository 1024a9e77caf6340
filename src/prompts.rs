//! Prompt templates.
//!
//! Templates use `{name}` placeholders filled by [`render`]. Unknown
//! placeholders are left as-is. [`parse_json_output`] reads structured
//! answers back out of model text.

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptType {
    DocumentAnalysis,
    DocumentComparison,
    ContextualizeQuestion,
    ContextQa,
}

impl PromptType {
    pub fn template(self) -> &'static str {
        match self {
            PromptType::DocumentAnalysis => DOCUMENT_ANALYSIS,
            PromptType::DocumentComparison => DOCUMENT_COMPARISON,
            PromptType::ContextualizeQuestion => CONTEXTUALIZE_QUESTION,
            PromptType::ContextQa => CONTEXT_QA,
        }
    }

    pub fn render(self, vars: &[(&str, &str)]) -> String {
        render(self.template(), vars)
    }
}

const DOCUMENT_ANALYSIS: &str = "\
You are a highly capable assistant trained to analyze and summarize documents.
Return ONLY valid JSON matching the exact schema below.

{format_instructions}

Analyze the following document.

Document:
{document}
Return the analysis in JSON format.";

const DOCUMENT_COMPARISON: &str = "\
You will be provided with content from two PDFs. Your tasks are as follows:

1. Compare the content in the two PDFs.
2. Identify the differences and note down the page number.
3. The output you provide must be page wise comparison content.
4. If any page does not have any change, mention it as 'NO CHANGE'.

Input documents:

{combined_docs}

Your response should follow this format:

{format_instruction}";

const CONTEXTUALIZE_QUESTION: &str = "\
Given a conversation history and the most recent user query, rewrite the query as a standalone question
that makes sense without relying on the previous context. Do not provide an answer. Only reformulate the
question if necessary; otherwise, return it unchanged.";

const CONTEXT_QA: &str = "\
You are an assistant designed to answer questions using the provided context. Rely only on the retrieved
information to form your response. If the answer is not found in the context, respond with \"I don't know.\"
Keep your answer concise and no longer than three sentences.

{context}";

/// Substitutes each `{key}` in `template` with its value.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

/// JSON schema description appended to structured-output prompts.
pub fn json_format_instructions(schema: &serde_json::Value) -> String {
    format!(
        "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\n\
         Here is the output schema:\n```\n{}\n```",
        schema
    )
}

/// Parses the JSON value embedded in a model reply.
///
/// Accepts bare JSON, JSON inside a fenced code block, or JSON surrounded
/// by prose (the outermost `{...}` or `[...]` span is used).
pub fn parse_json_output<T: DeserializeOwned>(text: &str) -> Result<T> {
    let trimmed = strip_code_fence(text.trim());
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    let span = json_span(trimmed).ok_or_else(|| {
        Error::OutputParse(format!("no JSON found in model output: {}", preview(trimmed)))
    })?;
    serde_json::from_str(span).map_err(|e| Error::OutputParse(format!("{}: {}", e, preview(span))))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map_or("", |(_, b)| b);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn render_fills_placeholders() {
        let out = PromptType::ContextQa.render(&[("context", "CTX")]);
        assert!(out.ends_with("CTX"));
        assert!(!out.contains("{context}"));
    }

    #[test]
    fn render_leaves_unknown_placeholders() {
        assert_eq!(render("{a} {b}", &[("a", "1")]), "1 {b}");
    }

    #[test]
    fn templates_have_expected_slots() {
        assert!(PromptType::DocumentAnalysis.template().contains("{document}"));
        assert!(PromptType::DocumentComparison.template().contains("{combined_docs}"));
        assert!(!PromptType::ContextualizeQuestion.template().contains('{'));
    }

    #[test]
    fn parses_bare_and_fenced_json() {
        let v: Value = parse_json_output("{\"a\": 1}").unwrap();
        assert_eq!(v, json!({"a": 1}));
        let v: Value = parse_json_output("```json\n[{\"Page\": \"1\"}]\n```").unwrap();
        assert_eq!(v, json!([{"Page": "1"}]));
    }

    #[test]
    fn parses_json_inside_prose() {
        let v: Value = parse_json_output("Sure! Here it is: {\"Title\": \"X\"} Hope that helps.").unwrap();
        assert_eq!(v["Title"], "X");
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_json_output::<Value>("I cannot do that.").unwrap_err();
        assert!(matches!(err, Error::OutputParse(_)));
    }
}
