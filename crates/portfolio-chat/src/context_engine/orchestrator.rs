use crate::content::{ContentProvider, Language};
use crate::context_engine::{
    keyword_detector::{KeywordOverrides, ProjectKeywordDetector},
    prompt_builder::{ProjectDocument, PromptBuilder},
    search_index::{SearchConfig, SearchIndex},
    token_budget::{BudgetConfig, TokenBudget},
};
use crate::llm::{ChatReply, LlmRouter};
use crate::memory::{MemoryStore, Message};
use crate::metrics;
use crate::utils::TextUtils;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns a visitor message into a model reply: retrieval, prompt assembly,
/// budget trimming, dispatch and session bookkeeping.
pub struct ChatOrchestrator {
    provider: Arc<dyn ContentProvider>,
    pt_index: Arc<SearchIndex>,
    en_index: Arc<SearchIndex>,
    detector: Arc<ProjectKeywordDetector>,
    sessions: Arc<dyn MemoryStore>,
    budget: TokenBudget,
    prompts: PromptBuilder,
    router: LlmRouter,
    config: OrchestratorConfig,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub owner: String,
    pub default_language: Language,
    pub search_limit: usize,
    pub search: SearchConfig,
    pub budget: BudgetConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            owner: "Wesley Correia".to_string(),
            default_language: Language::Pt,
            search_limit: 3,
            search: SearchConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub language: Language,
    pub chunks: usize,
    pub fallback: usize,
    pub seconds_since_reload: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatStatus {
    pub indexes: Vec<IndexStatus>,
    pub projects: usize,
    pub keywords_seconds_since_reload: Option<u64>,
    pub sessions: usize,
    pub gemini_configured: bool,
    pub openai_configured: bool,
}

impl ChatOrchestrator {
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        sessions: Arc<dyn MemoryStore>,
        router: LlmRouter,
        overrides: KeywordOverrides,
        config: OrchestratorConfig,
    ) -> Self {
        let index_for =
            |language| Arc::new(SearchIndex::new(provider.clone(), language, config.search.clone()));
        let pt_index = index_for(Language::Pt);
        let en_index = index_for(Language::En);
        let detector = Arc::new(ProjectKeywordDetector::new(
            provider.clone(),
            config.default_language,
            overrides,
            config.search.reload_interval,
        ));

        info!(
            "Chat orchestrator initialized (owner: {}, default language: {}, search limit: {})",
            config.owner, config.default_language, config.search_limit
        );
        Self {
            provider,
            pt_index,
            en_index,
            detector,
            sessions,
            budget: TokenBudget::new(config.budget.clone()),
            prompts: PromptBuilder::new(config.owner.clone()),
            router,
            config,
        }
    }

    fn index(&self, language: Language) -> &Arc<SearchIndex> {
        match language {
            Language::Pt => &self.pt_index,
            Language::En => &self.en_index,
        }
    }

    pub fn detector(&self) -> &Arc<ProjectKeywordDetector> {
        &self.detector
    }

    pub fn sessions(&self) -> &Arc<dyn MemoryStore> {
        &self.sessions
    }

    /// Answers one chat message.
    ///
    /// A blank message yields an empty reply without touching the provider or the
    /// session. A missing session id gets a generated one, so the exchange is still
    /// answered but cannot be continued.
    pub async fn process_chat(
        &self,
        message: &str,
        session_id: Option<&str>,
        language: Language,
        model: Option<&str>,
    ) -> anyhow::Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            debug!("Blank chat message ignored");
            metrics::inc_chat_request("empty");
            return Ok(ChatReply::empty());
        }

        let session_id = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                let generated = format!("session-{}", uuid::Uuid::new_v4());
                warn!("Chat request without session id, using {}", generated);
                generated
            }
        };

        let history = self.sessions.get_recent(&session_id);
        let contexts = self
            .index(language)
            .search(message, self.config.search_limit)
            .await;
        let projects = self.load_mentioned_projects(message, language).await;

        let base = self.prompts.base_prompt(language);
        let prompt = PromptBuilder::build(&base, &contexts, &projects);

        let budget = self.budget.optimize(&prompt, &history, message);
        if budget.was_reduced {
            metrics::inc_budget_reduction();
        }
        info!(
            "Session {}: {} contexts, {} projects, {} history messages, ~{} tokens{}",
            session_id,
            contexts.len(),
            projects.len(),
            budget.history.len(),
            budget.token_estimate,
            if budget.was_reduced { " (reduced)" } else { "" }
        );

        let reply = match self
            .router
            .chat(&budget.prompt, &budget.history, message, model)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                metrics::inc_chat_request("error");
                return Err(e);
            }
        };

        self.sessions.append(&session_id, Message::user(message));
        if !TextUtils::is_blank(&reply.reply) {
            self.sessions.append(&session_id, Message::assistant(reply.reply.clone()));
        }
        metrics::set_sessions(self.sessions.session_count());
        metrics::inc_chat_request("ok");
        Ok(reply)
    }

    async fn load_mentioned_projects(&self, message: &str, language: Language) -> Vec<ProjectDocument> {
        let mut projects = Vec::new();
        for id in self.detector.detect(message).await {
            match self.provider.load_project_markdown(&id, language).await {
                Ok(Some(content)) => projects.push(ProjectDocument { id, content }),
                Ok(None) => debug!("No markdown for mentioned project {}", id),
                Err(e) => warn!("Failed to load markdown for project {}: {:#}", id, e),
            }
        }
        projects
    }

    pub fn clear_session(&self, session_id: &str) {
        if TextUtils::is_blank(session_id) {
            return;
        }
        self.sessions.clear(session_id.trim());
        metrics::set_sessions(self.sessions.session_count());
    }

    pub fn sweep_sessions(&self) -> usize {
        let removed = self.sessions.sweep_expired();
        metrics::set_sessions(self.sessions.session_count());
        removed
    }

    /// Reloads every index and the keyword detector. All of them are attempted;
    /// the first failure is returned after the rest ran.
    pub async fn reload_all(&self) -> anyhow::Result<()> {
        let mut first_error = None;
        for language in Language::ALL {
            if let Err(e) = self.index(language).reload().await {
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.detector.reload().await {
            first_error.get_or_insert(e);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn status(&self) -> ChatStatus {
        let indexes = Language::ALL
            .iter()
            .map(|&language| {
                let index = self.index(language);
                IndexStatus {
                    language,
                    chunks: index.chunk_count(),
                    fallback: index.fallback_count(),
                    seconds_since_reload: index.since_reload().map(|d| d.as_secs()),
                }
            })
            .collect();
        ChatStatus {
            indexes,
            projects: self.detector.project_count(),
            keywords_seconds_since_reload: self.detector.since_reload().map(|d| d.as_secs()),
            sessions: self.sessions.session_count(),
            gemini_configured: self.router.has_gemini(),
            openai_configured: self.router.has_openai(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::testing::{doc, StaticContentProvider};
    use crate::context_engine::prompt_builder::CONTEXT_SECTION_MARKER;
    use crate::llm::testing::FakeProvider;
    use crate::llm::ChatProvider;
    use crate::memory::{InMemoryMemoryStore, Role};
    use std::sync::atomic::Ordering;

    struct Harness {
        content: Arc<StaticContentProvider>,
        llm: Arc<FakeProvider>,
        sessions: Arc<InMemoryMemoryStore>,
        orchestrator: ChatOrchestrator,
    }

    fn harness_with(llm: FakeProvider, config: OrchestratorConfig) -> Harness {
        let content = Arc::new(StaticContentProvider::new(vec![
            doc("curriculo", "Wesley é desenvolvedor Java e Angular.", false, true, &["curriculo"]),
            doc("stacks", "Stacks: Spring Boot, Docker, PostgreSQL.", false, false, &["stack"]),
            doc(
                "lol-matchmaking-fazenda",
                "Sistema de matchmaking para partidas de LoL.",
                true,
                false,
                &["lol", "matchmaking"],
            ),
        ]));
        let llm = Arc::new(llm);
        let sessions = Arc::new(InMemoryMemoryStore::default());
        let orchestrator = ChatOrchestrator::new(
            content.clone(),
            sessions.clone(),
            LlmRouter::new(Some(llm.clone() as Arc<dyn ChatProvider>), None),
            KeywordOverrides::default(),
            config,
        );
        Harness {
            content,
            llm,
            sessions,
            orchestrator,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeProvider::replying("gemini", "Resposta do modelo"), OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn test_blank_message_is_a_no_op() {
        let h = harness();
        let reply = h.orchestrator.process_chat("   ", Some("s1"), Language::Pt, None).await.unwrap();
        assert_eq!(reply, ChatReply::empty());
        assert_eq!(h.llm.calls(), 0);
        assert_eq!(h.sessions.session_count(), 0);
        assert_eq!(h.content.calls(), 0);
    }

    #[tokio::test]
    async fn test_prompt_carries_contexts_and_mentioned_project() {
        let h = harness();
        let reply = h
            .orchestrator
            .process_chat("Me fala do projeto de matchmaking do lol", Some("s1"), Language::Pt, None)
            .await
            .unwrap();
        assert_eq!(reply.reply, "Resposta do modelo");
        assert_eq!(reply.model_used.as_deref(), Some("gemini-model"));

        let prompt = h.llm.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.starts_with(&h.orchestrator.prompts.base_prompt(Language::Pt)));
        assert!(prompt.contains(CONTEXT_SECTION_MARKER));
        assert!(prompt.contains("Sistema de matchmaking para partidas de LoL."));
    }

    #[tokio::test]
    async fn test_history_is_recorded_and_replayed() {
        let h = harness();
        h.orchestrator.process_chat("Quais stacks?", Some("s1"), Language::Pt, None).await.unwrap();
        assert!(h.llm.last_history.lock().unwrap().is_empty());

        h.orchestrator.process_chat("E Docker?", Some("s1"), Language::Pt, None).await.unwrap();
        let seen = h.llm.last_history.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].role, Role::User);
        assert_eq!(seen[0].content, "Quais stacks?");
        assert_eq!(seen[1].role, Role::Assistant);

        assert_eq!(h.sessions.get_recent("s1").len(), 4);
    }

    #[tokio::test]
    async fn test_missing_session_id_gets_generated() {
        let h = harness();
        h.orchestrator.process_chat("Olá", None, Language::En, None).await.unwrap();
        assert_eq!(h.sessions.session_count(), 1);
        h.orchestrator.process_chat("Olá", Some("  "), Language::En, None).await.unwrap();
        assert_eq!(h.sessions.session_count(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_stores_nothing() {
        let h = harness_with(FakeProvider::failing("gemini", "upstream down"), OrchestratorConfig::default());
        let result = h.orchestrator.process_chat("Olá", Some("s1"), Language::Pt, None).await;
        assert!(result.is_err());
        assert!(h.sessions.get_recent("s1").is_empty());
    }

    #[tokio::test]
    async fn test_blank_model_text_is_stored_as_placeholder() {
        let h = harness_with(FakeProvider::replying("gemini", "   "), OrchestratorConfig::default());
        let reply = h.orchestrator.process_chat("Olá", Some("s1"), Language::Pt, None).await.unwrap();
        assert_eq!(reply.reply, crate::llm::EMPTY_REPLY_PLACEHOLDER);
        assert_eq!(h.sessions.get_recent("s1").len(), 2);
    }

    #[tokio::test]
    async fn test_no_provider_reply_is_stored() {
        let content = Arc::new(StaticContentProvider::new(Vec::new()));
        let sessions = Arc::new(InMemoryMemoryStore::default());
        let orchestrator = ChatOrchestrator::new(
            content,
            sessions.clone(),
            LlmRouter::default(),
            KeywordOverrides::default(),
            OrchestratorConfig::default(),
        );
        let reply = orchestrator.process_chat("Olá", Some("s1"), Language::Pt, None).await.unwrap();
        assert_eq!(reply.reply, crate::llm::router::NO_PROVIDER_REPLY);
        assert_eq!(sessions.get_recent("s1").len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_history_is_trimmed_before_dispatch() {
        let config = OrchestratorConfig {
            budget: BudgetConfig {
                context_limit: 2_000,
                response_reserve: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let h = harness_with(FakeProvider::replying("gemini", "ok"), config);
        for i in 0..10 {
            h.sessions.append("s1", Message::user(format!("{i} {}", "x".repeat(800))));
        }

        h.orchestrator.process_chat("Olá", Some("s1"), Language::Pt, None).await.unwrap();
        assert_eq!(h.llm.last_history.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_session_and_status() {
        let h = harness();
        h.orchestrator.process_chat("Olá", Some("s1"), Language::Pt, None).await.unwrap();
        h.orchestrator.reload_all().await.unwrap();

        let status = h.orchestrator.status();
        assert_eq!(status.sessions, 1);
        assert_eq!(status.projects, 1);
        assert_eq!(status.indexes.len(), 2);
        assert!(status.indexes.iter().all(|i| i.chunks == 3));
        assert!(status.gemini_configured);
        assert!(!status.openai_configured);

        h.orchestrator.clear_session("s1");
        h.orchestrator.clear_session("");
        assert_eq!(h.orchestrator.status().sessions, 0);
    }

    #[tokio::test]
    async fn test_reload_all_reports_failure_and_keeps_state() {
        let h = harness();
        h.orchestrator.reload_all().await.unwrap();
        h.content.fail.store(true, Ordering::SeqCst);

        assert!(h.orchestrator.reload_all().await.is_err());
        assert_eq!(h.orchestrator.status().indexes[0].chunks, 3);
        assert_eq!(h.orchestrator.status().projects, 1);
    }
}
