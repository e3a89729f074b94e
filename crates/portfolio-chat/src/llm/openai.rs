//! OpenAI chat completions client

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::{http_client, send_json, try_models, AttemptError, ChatProvider, ChatReply};
use crate::memory::Message;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-5-mini";

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    /// Primary model first, then fallbacks
    pub models: Vec<String>,
    pub max_tokens: u32,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage<'a>],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

pub struct OpenAIClient {
    config: OpenAIConfig,
    http_client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(config: OpenAIConfig) -> Self {
        info!(
            "OpenAI client configured with {} model(s): {:?}, max_tokens: {}",
            config.models.len(),
            config.models,
            config.max_tokens
        );
        let http_client = http_client(config.timeout);
        Self { config, http_client }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// gpt-5 models only accept `max_completion_tokens` and the default temperature
    fn uses_completion_tokens(model: &str) -> bool {
        model.starts_with("gpt-5")
    }

    fn to_chat_messages<'a>(
        system_prompt: &'a str,
        history: &'a [Message],
        message: &'a str,
    ) -> Vec<ChatMessage<'a>> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: system_prompt,
        });
        messages.extend(history.iter().map(|m| ChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));
        messages.push(ChatMessage {
            role: "user",
            content: message,
        });
        messages
    }

    fn build_request<'a>(&self, model: &'a str, messages: &'a [ChatMessage<'a>]) -> ChatCompletionRequest<'a> {
        if Self::uses_completion_tokens(model) {
            ChatCompletionRequest {
                model,
                messages,
                max_tokens: None,
                max_completion_tokens: Some(self.config.max_tokens),
                temperature: None,
            }
        } else {
            ChatCompletionRequest {
                model,
                messages,
                max_tokens: Some(self.config.max_tokens),
                max_completion_tokens: None,
                temperature: Some(0.9),
            }
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAIClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(
        &self,
        system_prompt: &str,
        history: &[Message],
        message: &str,
    ) -> anyhow::Result<ChatReply> {
        let messages = Self::to_chat_messages(system_prompt, history, message);
        let messages = messages.as_slice();

        try_models(self.name(), &self.config.models, |model| async move {
            let payload = self.build_request(&model, messages);
            let request = self
                .http_client
                .post(self.completions_url())
                .bearer_auth(&self.config.api_key)
                .json(&payload);
            let body = send_json(request).await?;

            if let Some(usage) = body.get("usage") {
                debug!("OpenAI {} usage: {}", model, usage);
            }
            let Some(first) = body.pointer("/choices/0") else {
                return Err(AttemptError::Fatal(anyhow::anyhow!(
                    "OpenAI response has no choices: {}",
                    body
                )));
            };
            let text = first.pointer("/message/content").and_then(|t| t.as_str());
            Ok(ChatReply::from_model_text(text, &model))
        })
        .await
    }
}
