//! Google Gemini `generateContent` client

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::{http_client, send_json, try_models, AttemptError, ChatProvider, ChatReply};
use crate::memory::{Message, Role};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Primary model first, then fallbacks
    pub models: Vec<String>,
    pub max_tokens: u32,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

pub struct GeminiClient {
    config: GeminiConfig,
    http_client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        info!(
            "Gemini client configured with {} model(s): {:?}, max_tokens: {}",
            config.models.len(),
            config.models,
            config.max_tokens
        );
        let http_client = http_client(config.timeout);
        Self { config, http_client }
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    fn gemini_role(role: Role) -> &'static str {
        match role {
            Role::Assistant => "model",
            Role::User | Role::System => "user",
        }
    }

    fn build_request<'a>(
        &self,
        system_prompt: &'a str,
        history: &'a [Message],
        message: &'a str,
    ) -> GenerateContentRequest<'a> {
        let mut contents: Vec<Content<'a>> = history
            .iter()
            .map(|m| Content {
                role: Some(Self::gemini_role(m.role)),
                parts: vec![Part { text: &m.content }],
            })
            .collect();
        contents.push(Content {
            role: Some("user"),
            parts: vec![Part { text: message }],
        });

        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: system_prompt }],
            },
            contents,
            generation_config: GenerationConfig {
                max_output_tokens: self.config.max_tokens,
                temperature: 0.9,
            },
        }
    }

    fn log_usage(body: &serde_json::Value, model: &str) {
        if let Some(usage) = body.get("usageMetadata") {
            debug!(
                "Gemini {} usage: prompt={}, output={}, total={}",
                model,
                usage.get("promptTokenCount").and_then(|v| v.as_u64()).unwrap_or(0),
                usage.get("candidatesTokenCount").and_then(|v| v.as_u64()).unwrap_or(0),
                usage.get("totalTokenCount").and_then(|v| v.as_u64()).unwrap_or(0)
            );
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn chat(
        &self,
        system_prompt: &str,
        history: &[Message],
        message: &str,
    ) -> anyhow::Result<ChatReply> {
        let payload = self.build_request(system_prompt, history, message);
        let payload = &payload;

        try_models(self.name(), &self.config.models, |model| async move {
            let request = self
                .http_client
                .post(self.url(&model))
                .header(API_KEY_HEADER, &self.config.api_key)
                .json(payload);
            let body = send_json(request).await?;
            Self::log_usage(&body, &model);

            let candidates = body.get("candidates").and_then(|c| c.as_array());
            if candidates.map(|c| c.is_empty()).unwrap_or(true) {
                return Err(AttemptError::Fatal(anyhow::anyhow!(
                    "Gemini response has no candidates: {}",
                    body
                )));
            }
            let text = body
                .pointer("/candidates/0/content/parts/0/text")
                .and_then(|t| t.as_str());
            Ok(ChatReply::from_model_text(text, &model))
        })
        .await
    }
}
