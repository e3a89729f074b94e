//! LLM providers - HTTP clients for the hosted chat models

pub mod gemini;
pub mod openai;
pub mod router;

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::memory::Message;
use crate::metrics;

pub use gemini::{GeminiClient, GeminiConfig};
pub use openai::{OpenAIClient, OpenAIConfig};
pub use router::LlmRouter;

/// Shown when the provider answered with an empty text
pub const EMPTY_REPLY_PLACEHOLDER: &str = "(no reply)";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub reply: String,
    /// Concrete model that produced the reply
    pub model_used: Option<String>,
}

impl ChatReply {
    pub fn new(reply: impl Into<String>, model_used: Option<String>) -> Self {
        Self {
            reply: reply.into(),
            model_used,
        }
    }

    pub fn empty() -> Self {
        Self::new("", None)
    }

    /// Trimmed provider text, or the placeholder when it is blank
    pub(crate) fn from_model_text(text: Option<&str>, model: &str) -> Self {
        let text = text.map(str::trim).unwrap_or_default();
        let reply = if text.is_empty() { EMPTY_REPLY_PLACEHOLDER } else { text };
        Self::new(reply, Some(model.to_string()))
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn chat(
        &self,
        system_prompt: &str,
        history: &[Message],
        message: &str,
    ) -> anyhow::Result<ChatReply>;
}

/// Primary model followed by the comma separated fallbacks, blanks and repeats dropped
pub fn parse_model_chain(primary: &str, fallbacks: &str) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    for model in std::iter::once(primary).chain(fallbacks.split(',')) {
        let model = model.trim();
        if !model.is_empty() && !chain.iter().any(|m| m == model) {
            chain.push(model.to_string());
        }
    }
    chain
}

/// Rate limits, quota exhaustion and gateway errors are worth retrying on the next model
pub(crate) fn is_recoverable(status: StatusCode, body: &str) -> bool {
    if matches!(status.as_u16(), 429 | 502 | 503 | 504) {
        return true;
    }
    if status.is_client_error() {
        let body = body.to_lowercase();
        return body.contains("rate limit") || body.contains("quota") || body.contains("resource_exhausted");
    }
    false
}

/// `error.message` from a provider error body, or the start of the raw body
pub(crate) fn error_message(body: &str) -> String {
    if body.trim().is_empty() {
        return "unknown error".to_string();
    }
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    if let Some(message) = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(|m| m.as_str())
    {
        return message.to_string();
    }
    match body.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Outcome of one model attempt that did not produce a reply
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Move on to the next model in the chain
    Recoverable(anyhow::Error),
    Fatal(anyhow::Error),
}

/// Sends the request and returns the JSON body of a successful response.
/// Errors never carry the request URL.
pub(crate) async fn send_json(request: reqwest::RequestBuilder) -> Result<serde_json::Value, AttemptError> {
    let response = request
        .send()
        .await
        .map_err(|e| AttemptError::Recoverable(anyhow::anyhow!("request failed: {}", e.without_url())))?;

    let status = response.status();
    if status.is_success() {
        return response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| AttemptError::Fatal(anyhow::anyhow!("failed to parse response: {}", e.without_url())));
    }

    let body = response.text().await.unwrap_or_default();
    let err = anyhow::anyhow!("status {}: {}", status, error_message(&body));
    if is_recoverable(status, &body) {
        Err(AttemptError::Recoverable(err))
    } else {
        Err(AttemptError::Fatal(err))
    }
}

/// Tries each model in order until one answers. Recoverable failures move to the
/// next model, anything else aborts the chain.
pub(crate) async fn try_models<F, Fut>(
    provider: &str,
    models: &[String],
    mut attempt: F,
) -> anyhow::Result<ChatReply>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<ChatReply, AttemptError>>,
{
    let mut last_error: Option<anyhow::Error> = None;

    for (i, model) in models.iter().enumerate() {
        info!("Trying {} model {} ({}/{})", provider, model, i + 1, models.len());
        let started = Instant::now();
        match attempt(model.clone()).await {
            Ok(reply) => {
                metrics::observe_llm_latency(provider, started.elapsed().as_secs_f64());
                info!("{} model {} answered in {:.2}s", provider, model, started.elapsed().as_secs_f64());
                return Ok(reply);
            }
            Err(AttemptError::Recoverable(e)) => {
                warn!("{} model {} unavailable: {}", provider, model, e);
                last_error = Some(e);
            }
            Err(AttemptError::Fatal(e)) => {
                error!("{} model {} failed: {}", provider, model, e);
                return Err(e.context(format!("{} model {} failed", provider, model)));
            }
        }
    }

    Err(match last_error {
        Some(e) => e.context(format!("All {} models failed", provider)),
        None => anyhow::anyhow!("No {} models configured", provider),
    })
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_chain() {
        assert_eq!(
            parse_model_chain("gemini-2.5-flash", " gemini-2.0-flash, ,gemini-2.5-flash,gemini-2.0-flash-lite"),
            vec!["gemini-2.5-flash", "gemini-2.0-flash", "gemini-2.0-flash-lite"]
        );
        assert_eq!(parse_model_chain("gpt-5-mini", ""), vec!["gpt-5-mini"]);
        assert!(parse_model_chain("", "").is_empty());
    }

    #[test]
    fn test_recoverable_statuses() {
        assert!(is_recoverable(StatusCode::TOO_MANY_REQUESTS, ""));
        assert!(is_recoverable(StatusCode::SERVICE_UNAVAILABLE, ""));
        assert!(is_recoverable(StatusCode::FORBIDDEN, r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#));
        assert!(!is_recoverable(StatusCode::BAD_REQUEST, "invalid argument"));
        assert!(!is_recoverable(StatusCode::INTERNAL_SERVER_ERROR, "quota"));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"error":{"message":"Quota exceeded"}}"#), "Quota exceeded");
        assert_eq!(error_message(""), "unknown error");
        let long = "x".repeat(300);
        assert_eq!(error_message(&long).len(), 203);
    }

    #[test]
    fn test_blank_model_text_gets_placeholder() {
        let reply = ChatReply::from_model_text(Some("  "), "m");
        assert_eq!(reply.reply, EMPTY_REPLY_PLACEHOLDER);
        assert_eq!(ChatReply::from_model_text(None, "m").reply, EMPTY_REPLY_PLACEHOLDER);
        assert_eq!(ChatReply::from_model_text(Some(" oi "), "m").reply, "oi");
    }
}
