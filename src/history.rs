//! In-memory chat history keyed by session id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::llm::ChatMessage;

/// Shared, cloneable store of per-session message logs.
#[derive(Debug, Clone, Default)]
pub struct ChatHistoryStore {
    sessions: Arc<Mutex<HashMap<String, Vec<ChatMessage>>>>,
}

impl ChatHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages recorded for `session_id`, oldest first. Unknown sessions
    /// have an empty history.
    pub fn messages(&self, session_id: &str) -> Vec<ChatMessage> {
        let sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        sessions.get(session_id).cloned().unwrap_or_default()
    }

    /// Appends one question/answer exchange.
    pub fn record_turn(&self, session_id: &str, question: &str, answer: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        let history = sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session_id, "new chat session history");
            Vec::new()
        });
        history.push(ChatMessage::user(question));
        history.push(ChatMessage::assistant(answer));
    }

    pub fn clear(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        sessions.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn sessions_are_separate() {
        let store = ChatHistoryStore::new();
        store.record_turn("a", "q1", "a1");
        store.record_turn("a", "q2", "a2");
        store.record_turn("b", "x", "y");

        let a = store.messages("a");
        assert_eq!(a.len(), 4);
        assert_eq!(a[0].role, Role::User);
        assert_eq!(a[3].content, "a2");
        assert_eq!(store.messages("b").len(), 2);
        assert!(store.messages("c").is_empty());
    }

    #[test]
    fn clones_share_state() {
        let store = ChatHistoryStore::new();
        let other = store.clone();
        other.record_turn("s", "q", "a");
        assert_eq!(store.messages("s").len(), 2);
        store.clear("s");
        assert!(other.messages("s").is_empty());
    }
}
