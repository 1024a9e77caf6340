//! Conversational retrieval-augmented generation.
//!
//! One [`ConversationalRag::invoke`] call:
//! 1. With prior turns, asks the model to rewrite the question as a
//!    standalone one; otherwise uses it unchanged.
//! 2. Retrieves the top-k chunks for that question.
//! 3. Answers from the retrieved context, with history.
//! 4. Records the turn in the [`ChatHistoryStore`].

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::history::ChatHistoryStore;
use crate::index::Retriever;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::SearchHit;
use crate::prompts::PromptType;

pub const NO_ANSWER: &str = "No answer.";

pub struct ConversationalRag {
    llm: Arc<dyn ChatModel>,
    retriever: Retriever,
    history: ChatHistoryStore,
}

impl ConversationalRag {
    pub fn new(llm: Arc<dyn ChatModel>, retriever: Retriever, history: ChatHistoryStore) -> Self {
        Self {
            llm,
            retriever,
            history,
        }
    }

    /// Answers `question` within `session_id`'s conversation.
    pub async fn invoke(&self, session_id: &str, question: &str) -> Result<String> {
        let history = self.history.messages(session_id);

        let standalone = if history.is_empty() {
            question.to_string()
        } else {
            self.contextualize(&history, question).await?
        };

        let hits = self.retriever.retrieve(&standalone).await?;
        let context = format_context(&hits);

        let mut messages = vec![ChatMessage::system(
            PromptType::ContextQa.render(&[("context", &context)]),
        )];
        messages.extend(history);
        messages.push(ChatMessage::user(question));

        let answer = self.llm.complete(&messages).await.map_err(Error::Llm)?;
        let answer = if answer.trim().is_empty() {
            warn!(session_id, "empty answer received");
            NO_ANSWER.to_string()
        } else {
            answer
        };

        self.history.record_turn(session_id, question, &answer);
        info!(
            session_id,
            retrieved = hits.len(),
            answer = %preview(&answer, 111),
            "answer generated"
        );
        Ok(answer)
    }

    async fn contextualize(&self, history: &[ChatMessage], question: &str) -> Result<String> {
        let mut messages = vec![ChatMessage::system(
            PromptType::ContextualizeQuestion.template(),
        )];
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(question));
        let rewritten = self.llm.complete(&messages).await.map_err(Error::Llm)?;
        let rewritten = rewritten.trim();
        Ok(if rewritten.is_empty() {
            question.to_string()
        } else {
            rewritten.to_string()
        })
    }
}

/// Joins retrieved chunk texts, separated by blank lines.
pub fn format_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
