use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ChatConfig;

pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Format your responses using markdown when appropriate.";
const TEMPERATURE: f32 = 1.0;
const MAX_TOKENS: u32 = 150;
const EMPTY_REPLY: &str = "Sorry, I couldn't generate a response.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// One prior turn as sent to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: &'static str,
    pub content: String,
}

#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn complete(&self, history: &[ChatTurn]) -> Result<String, ChatError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl CompletionResponse {
    fn text(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| EMPTY_REPLY.to_string())
    }
}

#[derive(Clone)]
pub struct OpenAiChatClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(cfg: &ChatConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()?,
            api_url: cfg.api_url.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        })
    }

    fn request<'a>(&'a self, history: &[ChatTurn]) -> CompletionRequest<'a> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatTurn {
            role: "system",
            content: SYSTEM_PROMPT.to_string(),
        });
        messages.extend_from_slice(history);
        CompletionRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

#[async_trait]
impl ChatGateway for OpenAiChatClient {
    async fn complete(&self, history: &[ChatTurn]) -> Result<String, ChatError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.request(history))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(%status, body = %message, "chat completion rejected");
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: CompletionResponse = response.json().await?;
        debug!(turns = history.len(), "chat completion succeeded");
        Ok(body.text())
    }
}
