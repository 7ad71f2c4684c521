use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, instrument};

use crate::transcript::Message;

// Structures matching the /chat/completions endpoint of OpenAI-compatible APIs
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    // usage, id, etc. are ignored
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Thin client for a hosted chat-completion API.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: Client,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("Failed to build HTTP client for the chat-completion API")?;
        Ok(Self { http, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Therapist reply: system instruction, prior history, then the new user turn.
    #[instrument(skip_all, fields(history_len = history.len()))]
    pub async fn respond(&self, system: &str, history: &[Message], user_input: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
        messages.extend(history.iter().map(|m| ChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));
        messages.push(ChatMessage {
            role: "user",
            content: user_input,
        });
        self.complete(messages).await
    }

    /// Single-prompt completion, used for the style rewrite.
    #[instrument(skip_all)]
    pub async fn complete_prompt(&self, prompt: &str) -> Result<String> {
        debug!(%prompt, "Sending single-prompt completion");
        self.complete(vec![ChatMessage {
            role: "user",
            content: prompt,
        }])
        .await
    }

    async fn complete(&self, messages: Vec<ChatMessage<'_>>) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );
        let request_payload = ChatCompletionRequest {
            model: &self.settings.model,
            messages,
            temperature: self.settings.temperature,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&request_payload)
            .send()
            .await
            .context(format!("Failed to send request to chat-completion API at {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Chat-completion request failed");
            return Err(anyhow::anyhow!(
                "Chat-completion request failed with status {}: {}",
                status,
                error_body
            ));
        }

        let completion = response
            .json::<ChatCompletionResponse>()
            .await
            .context("Failed to parse JSON response from chat-completion API")?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat-completion response contained no message"))?;

        debug!(response = %content, "Received completion");
        Ok(content.trim().to_string())
    }
}
