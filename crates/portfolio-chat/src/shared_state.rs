//! Shared state handed to every HTTP handler

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::{
    config::Config,
    content::{ContentProvider, FilesystemContentProvider},
    context_engine::{ChatOrchestrator, KeywordOverrides},
    llm::{ChatProvider, GeminiClient, LlmRouter, OpenAIClient},
    memory::{InMemoryMemoryStore, MemoryStore},
};

#[derive(Clone)]
pub struct UnifiedAppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub started_at: Instant,
}

impl UnifiedAppState {
    pub fn new(config: Arc<Config>, orchestrator: Arc<ChatOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
            started_at: Instant::now(),
        }
    }

    /// Wires the filesystem content, the in-memory sessions and the configured providers
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let overrides = KeywordOverrides::load(config.keyword_overrides_path.as_deref())?;
        info!("Loaded keyword overrides for {} projects", overrides.len());

        let provider: Arc<dyn ContentProvider> =
            Arc::new(FilesystemContentProvider::new(config.content_dir.clone()));
        let sessions: Arc<dyn MemoryStore> = Arc::new(InMemoryMemoryStore::new(config.session_config()));

        let gemini = config
            .gemini_config()
            .map(|c| Arc::new(GeminiClient::new(c)) as Arc<dyn ChatProvider>);
        let openai = config
            .openai_config()
            .map(|c| Arc::new(OpenAIClient::new(c)) as Arc<dyn ChatProvider>);
        let router = LlmRouter::new(gemini, openai);

        let orchestrator = ChatOrchestrator::new(
            provider,
            sessions,
            router,
            overrides,
            config.orchestrator_config(),
        );
        Ok(Self::new(Arc::new(config), Arc::new(orchestrator)))
    }
}
