//! Picks the provider for a chat request

use std::sync::Arc;

use tracing::{info, warn};

use super::{ChatProvider, ChatReply};
use crate::memory::Message;

pub const NO_PROVIDER_REPLY: &str =
    "No AI provider is configured. Set GEMINI_API_KEY or OPENAI_API_KEY.";

/// Gemini is the default; `gpt`/`openai` requests go to OpenAI when it is configured
#[derive(Clone, Default)]
pub struct LlmRouter {
    gemini: Option<Arc<dyn ChatProvider>>,
    openai: Option<Arc<dyn ChatProvider>>,
}

impl LlmRouter {
    pub fn new(gemini: Option<Arc<dyn ChatProvider>>, openai: Option<Arc<dyn ChatProvider>>) -> Self {
        info!(
            "LLM router configured - Gemini: {}, OpenAI: {}",
            if gemini.is_some() { "available" } else { "unavailable" },
            if openai.is_some() { "available" } else { "unavailable" }
        );
        Self { gemini, openai }
    }

    pub fn has_gemini(&self) -> bool {
        self.gemini.is_some()
    }

    pub fn has_openai(&self) -> bool {
        self.openai.is_some()
    }

    fn wants_openai(model: Option<&str>) -> bool {
        model
            .map(|m| m.trim().eq_ignore_ascii_case("gpt") || m.trim().eq_ignore_ascii_case("openai"))
            .unwrap_or(false)
    }

    pub async fn chat(
        &self,
        system_prompt: &str,
        history: &[Message],
        message: &str,
        model: Option<&str>,
    ) -> anyhow::Result<ChatReply> {
        let provider = if Self::wants_openai(model) {
            match (&self.openai, &self.gemini) {
                (Some(openai), _) => Some(openai),
                (None, gemini) => {
                    warn!("OpenAI requested but not configured, falling back to Gemini");
                    gemini.as_ref()
                }
            }
        } else {
            match (&self.gemini, &self.openai) {
                (Some(gemini), _) => Some(gemini),
                (None, openai) => {
                    if openai.is_some() {
                        warn!("Gemini not configured, falling back to OpenAI");
                    }
                    openai.as_ref()
                }
            }
        };

        match provider {
            Some(provider) => {
                info!("Routing chat to {} (requested: {})", provider.name(), model.unwrap_or("default"));
                provider.chat(system_prompt, history, message).await
            }
            None => {
                warn!("No LLM provider configured");
                Ok(ChatReply::new(NO_PROVIDER_REPLY, None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::FakeProvider;

    fn dyn_provider(fake: &Arc<FakeProvider>) -> Option<Arc<dyn ChatProvider>> {
        Some(fake.clone() as Arc<dyn ChatProvider>)
    }

    fn fakes() -> (Arc<FakeProvider>, Arc<FakeProvider>) {
        (
            Arc::new(FakeProvider::replying("gemini", "from gemini")),
            Arc::new(FakeProvider::replying("openai", "from openai")),
        )
    }

    #[tokio::test]
    async fn test_default_goes_to_gemini() {
        let (gemini, openai) = fakes();
        let router = LlmRouter::new(dyn_provider(&gemini), dyn_provider(&openai));
        let reply = router.chat("s", &[], "m", None).await.unwrap();
        assert_eq!(reply.reply, "from gemini");
        let reply = router.chat("s", &[], "m", Some("gemini")).await.unwrap();
        assert_eq!(reply.reply, "from gemini");
        assert_eq!(openai.calls(), 0);
    }

    #[tokio::test]
    async fn test_gpt_goes_to_openai() {
        let (gemini, openai) = fakes();
        let router = LlmRouter::new(dyn_provider(&gemini), dyn_provider(&openai));
        assert_eq!(router.chat("s", &[], "m", Some("GPT")).await.unwrap().reply, "from openai");
        assert_eq!(router.chat("s", &[], "m", Some("openai")).await.unwrap().reply, "from openai");
        assert_eq!(gemini.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_provider_falls_back_to_the_other() {
        let (gemini, openai) = fakes();
        let only_gemini = LlmRouter::new(dyn_provider(&gemini), None);
        assert_eq!(only_gemini.chat("s", &[], "m", Some("gpt")).await.unwrap().reply, "from gemini");

        let only_openai = LlmRouter::new(None, dyn_provider(&openai));
        assert_eq!(only_openai.chat("s", &[], "m", None).await.unwrap().reply, "from openai");
    }

    #[tokio::test]
    async fn test_no_provider_reply() {
        let router = LlmRouter::default();
        let reply = router.chat("s", &[], "m", None).await.unwrap();
        assert_eq!(reply.reply, NO_PROVIDER_REPLY);
        assert!(reply.model_used.is_none());
    }

    #[tokio::test]
    async fn test_provider_errors_propagate() {
        let router = LlmRouter::new(dyn_provider(&Arc::new(FakeProvider::failing("gemini", "boom"))), None);
        assert!(router.chat("s", &[], "m", None).await.is_err());
    }
}
