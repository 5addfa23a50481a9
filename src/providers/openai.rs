// ABOUTME: OpenAI chat-completions client implementing CompletionProvider.
// ABOUTME: Folds chat history into the system message and sends fixed sampling parameters.

use super::truncate_body;
use anyhow::{Context, Result};
use async_trait::async_trait;
use goob_core::config::ReplyConfig;
use goob_core::{CompletionProvider, CompletionRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const TEMPERATURE: f64 = 0.7;
const TOP_P: f64 = 1.0;
const FREQUENCY_PENALTY: f64 = 0.2;
const PRESENCE_PENALTY: f64 = 0.2;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiCompletion {
    api_key: String,
    model: String,
    history_preamble: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompletion")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiCompletion {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, history_preamble: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            history_preamble: history_preamble.into(),
            http,
        })
    }

    /// Client for the reply settings, or None when no API key is configured
    pub fn from_settings(settings: &ReplyConfig) -> Result<Option<Self>> {
        match settings.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => Ok(Some(Self::new(key, &settings.model, &settings.history_preamble)?)),
            None => Ok(None),
        }
    }

    /// System prompt followed by the preamble and one "author: text" line per history entry
    pub fn system_message(&self, request: &CompletionRequest) -> String {
        if request.history.is_empty() {
            return request.system_prompt.clone();
        }
        let mut message = format!("{}\n\n{}\n", request.system_prompt, self.history_preamble);
        for line in &request.history {
            message.push_str(&line.author);
            message.push_str(": ");
            message.push_str(&line.text);
            message.push('\n');
        }
        message
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let system = self.system_message(request);
        let body = ChatRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            frequency_penalty: FREQUENCY_PENALTY,
            presence_penalty: PRESENCE_PENALTY,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
        };

        tracing::debug!(model = %self.model, history = request.history.len(), "Sending chat completion");
        let response = self
            .http
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat completion failed: {} {}", status, truncate_body(&body, 200));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Invalid chat completion response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("Chat completion returned no choices")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goob_core::HistoryLine;

    fn client() -> OpenAiCompletion {
        OpenAiCompletion::new("sk-test", "gpt-4o", "Earlier in this chat:").unwrap()
    }

    #[test]
    fn test_system_message_without_history() {
        let request = CompletionRequest {
            system_prompt: "Be brief.".to_string(),
            user_prompt: "hi".to_string(),
            history: Vec::new(),
        };
        assert_eq!(client().system_message(&request), "Be brief.");
    }

    #[test]
    fn test_system_message_with_history() {
        let request = CompletionRequest {
            system_prompt: "Be brief.".to_string(),
            user_prompt: "hi".to_string(),
            history: vec![
                HistoryLine {
                    author: "ann".to_string(),
                    text: "hello".to_string(),
                },
                HistoryLine {
                    author: "Bob Ray".to_string(),
                    text: "yo".to_string(),
                },
            ],
        };
        assert_eq!(
            client().system_message(&request),
            "Be brief.\n\nEarlier in this chat:\nann: hello\nBob Ray: yo\n"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "gpt-4o",
            temperature: TEMPERATURE,
            top_p: TOP_P,
            frequency_penalty: FREQUENCY_PENALTY,
            presence_penalty: PRESENCE_PENALTY,
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["top_p"], 1.0);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_debug_redacts_key() {
        assert!(!format!("{:?}", client()).contains("sk-test"));
    }

    #[test]
    fn test_from_settings_requires_key() {
        assert!(OpenAiCompletion::from_settings(&ReplyConfig::default()).unwrap().is_none());
    }
}
