//! Chat model abstraction and HTTP providers.
//!
//! A [`ChatModel`] turns a list of [`ChatMessage`]s into one completion.
//! Providers are picked once at startup from `[llm]` config:
//!
//! | Provider | Endpoint | Key |
//! |----------|----------|-----|
//! | `openai` | `api.openai.com/v1/chat/completions` | `OPENAI_API_KEY` |
//! | `groq` | `api.groq.com/openai/v1/chat/completions` | `GROQ_API_KEY` |
//! | `google` | `generativelanguage.googleapis.com/v1beta/models/{model}:generateContent` | `GOOGLE_API_KEY` |
//!
//! Transient failures (429, 5xx, network) are retried with exponential
//! backoff; other 4xx responses fail immediately.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Identifier used in logs and responses, e.g. `"groq:llama-3.1-8b-instant"`.
    fn name(&self) -> &str;

    /// Returns the assistant's reply to `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Groq,
    Google,
}

impl LlmProvider {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "openai" => Some(LlmProvider::OpenAi),
            "groq" => Some(LlmProvider::Groq),
            "google" => Some(LlmProvider::Google),
            _ => None,
        }
    }

    pub fn api_key_var(self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::Groq => "GROQ_API_KEY",
            LlmProvider::Google => "GOOGLE_API_KEY",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-4o-mini",
            LlmProvider::Groq => "llama-3.1-8b-instant",
            LlmProvider::Google => "gemini-2.0-flash",
        }
    }

    fn endpoint(self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com/v1/chat/completions",
            LlmProvider::Groq => "https://api.groq.com/openai/v1/chat/completions",
            LlmProvider::Google => "https://generativelanguage.googleapis.com/v1beta/models",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Groq => "groq",
            LlmProvider::Google => "google",
        })
    }
}

/// Chat model used when `llm.provider = "disabled"`.
pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    fn name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}

/// HTTP chat model for any of the supported providers.
pub struct HttpChatModel {
    provider: LlmProvider,
    model: String,
    name: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpChatModel {
    /// Builds a client, reading the provider's API key from the environment.
    pub fn new(provider: LlmProvider, config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(provider.api_key_var()).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", provider.api_key_var())
        })?;
        Self::with_api_key(provider, config, api_key)
    }

    pub fn with_api_key(provider: LlmProvider, config: &LlmConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            name: format!("{}:{}", provider, model),
            provider,
            model,
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            max_retries: config.max_retries,
            client,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    fn request(&self, messages: &[ChatMessage]) -> reqwest::RequestBuilder {
        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Groq => self
                .client
                .post(self.provider.endpoint())
                .bearer_auth(&self.api_key)
                .json(&openai_request(
                    &self.model,
                    messages,
                    self.temperature,
                    self.max_output_tokens,
                )),
            LlmProvider::Google => self
                .client
                .post(format!(
                    "{}/{}:generateContent",
                    self.provider.endpoint(),
                    self.model
                ))
                .header("x-goog-api-key", &self.api_key)
                .json(&gemini_request(messages, self.temperature, self.max_output_tokens)),
        }
    }

    fn parse(&self, json: &serde_json::Value) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Groq => parse_openai_completion(json),
            LlmProvider::Google => parse_gemini_completion(json),
        }
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.request(messages).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        debug!(model = %self.name, "completion received");
                        return self.parse(&json);
                    }
                    let body = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(model = %self.name, %status, attempt, "chat request failed, retrying");
                        last_err = Some(anyhow::anyhow!("{} API error {}: {}", self.provider, status, body));
                        continue;
                    }
                    bail!("{} API error {}: {}", self.provider, status, body);
                }
                Err(e) => {
                    warn!(model = %self.name, error = %e, attempt, "chat request errored, retrying");
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("chat completion failed after retries")))
    }
}

/// Chooses the chat model for `[llm]`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    if config.provider == "disabled" {
        return Ok(Arc::new(DisabledChatModel));
    }
    let provider = LlmProvider::parse(&config.provider)
        .ok_or_else(|| anyhow::anyhow!("Unsupported LLM provider: {}", config.provider))?;
    let model = HttpChatModel::new(provider, config)?;
    tracing::info!(
        provider = %provider,
        model = %model.model,
        temperature = config.temperature,
        max_tokens = config.max_output_tokens,
        "loaded chat model"
    );
    Ok(Arc::new(model))
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

fn openai_request<'a>(
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
) -> OpenAiRequest<'a> {
    OpenAiRequest {
        model,
        messages,
        temperature,
        max_tokens,
    }
}

fn parse_openai_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid chat completion response: missing choices[0].message.content"))
}

#[derive(Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

fn gemini_request(messages: &[ChatMessage], temperature: f32, max_output_tokens: u32) -> GeminiRequest {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let system_instruction = (!system.is_empty()).then(|| GeminiContent {
        role: None,
        parts: vec![GeminiPart {
            text: system.join("\n\n"),
        }],
    });
    let contents = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| GeminiContent {
            role: Some(if m.role == Role::Assistant { "model" } else { "user" }),
            parts: vec![GeminiPart {
                text: m.content.clone(),
            }],
        })
        .collect();
    GeminiRequest {
        system_instruction,
        contents,
        generation_config: GeminiGenerationConfig {
            temperature,
            max_output_tokens,
        },
    }
}

fn parse_gemini_completion(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: no candidates"))?;
    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_names_round_trip() {
        for p in [LlmProvider::OpenAi, LlmProvider::Groq, LlmProvider::Google] {
            assert_eq!(LlmProvider::parse(&p.to_string()), Some(p));
        }
        assert_eq!(LlmProvider::parse("anthropic"), None);
    }

    #[test]
    fn openai_request_shape() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let body = serde_json::to_value(openai_request("gpt-4o-mini", &messages, 0.2, 100)).unwrap();
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_tokens"], 100);
    }

    #[test]
    fn gemini_request_moves_system_out() {
        let messages = vec![
            ChatMessage::system("rules"),
            ChatMessage::user("q1"),
            ChatMessage::assistant("a1"),
        ];
        let body = serde_json::to_value(gemini_request(&messages, 0.0, 64)).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "rules");
        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
    }

    #[test]
    fn parses_completions() {
        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]});
        assert_eq!(parse_openai_completion(&openai).unwrap(), "hello");
        assert!(parse_openai_completion(&json!({"choices": []})).is_err());

        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "he"}, {"text": "llo"}]}}]});
        assert_eq!(parse_gemini_completion(&gemini).unwrap(), "hello");
        assert!(parse_gemini_completion(&json!({})).is_err());
    }

    #[test]
    fn model_name_includes_provider() {
        let config = LlmConfig::default();
        let m = HttpChatModel::with_api_key(LlmProvider::Groq, &config, "k".into()).unwrap();
        assert_eq!(m.name(), "groq:llama-3.1-8b-instant");
    }

    #[tokio::test]
    async fn disabled_model_errors() {
        let m = create_chat_model(&LlmConfig::default()).unwrap();
        assert_eq!(m.name(), "disabled");
        assert!(m.complete(&[ChatMessage::user("x")]).await.is_err());
    }
}
