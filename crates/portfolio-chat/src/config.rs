use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::content::Language;
use crate::context_engine::{BudgetConfig, OrchestratorConfig, SearchConfig};
use crate::llm::{gemini, openai, parse_model_chain, GeminiConfig, OpenAIConfig};
use crate::memory::SessionConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub content_dir: PathBuf,
    pub keyword_overrides_path: Option<PathBuf>,
    pub context_reload_seconds: u64,
    pub session_ttl_seconds: u64,
    pub session_sweep_seconds: u64,
    pub history_window: usize,
    pub history_capacity: usize,
    pub search_limit: usize,
    pub portfolio_owner: String,
    pub default_language: Language,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_models_fallback: String,
    pub gemini_max_tokens: u32,
    pub gemini_base_url: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_models_fallback: String,
    pub openai_max_tokens: u32,
    pub openai_base_url: String,
    pub llm_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub model_context_limit: usize,
    pub response_reserve_tokens: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let keyword_overrides_path = env::var("KEYWORD_OVERRIDES_PATH")
            .ok()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        let default_language = env::var("DEFAULT_LANGUAGE")
            .unwrap_or_else(|_| "pt".into())
            .parse::<Language>()
            .context("DEFAULT_LANGUAGE must be pt or en")?;

        Ok(Self {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            api_port: env::var("API_PORT").unwrap_or_else(|_| "8080".into()).parse()?,
            content_dir: PathBuf::from(env::var("CONTENT_DIR").unwrap_or_else(|_| "./content".into())),
            keyword_overrides_path,
            context_reload_seconds: env::var("CONTEXT_RELOAD_SECONDS")
                .unwrap_or_else(|_| "1800".into())
                .parse()?,
            session_ttl_seconds: env::var("SESSION_TTL_SECONDS")
                .unwrap_or_else(|_| "1800".into())
                .parse()?,
            session_sweep_seconds: env::var("SESSION_SWEEP_SECONDS")
                .unwrap_or_else(|_| "300".into())
                .parse()?,
            history_window: env::var("HISTORY_WINDOW").unwrap_or_else(|_| "10".into()).parse()?,
            history_capacity: env::var("HISTORY_CAPACITY").unwrap_or_else(|_| "50".into()).parse()?,
            search_limit: env::var("SEARCH_LIMIT").unwrap_or_else(|_| "3".into()).parse()?,
            portfolio_owner: env::var("PORTFOLIO_OWNER").unwrap_or_else(|_| "Wesley Correia".into()),
            default_language,
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or_else(|_| gemini::DEFAULT_MODEL.into()),
            gemini_models_fallback: env::var("GEMINI_MODELS_FALLBACK").unwrap_or_default(),
            gemini_max_tokens: env::var("GEMINI_MAX_TOKENS")
                .unwrap_or_else(|_| "4000".into())
                .parse()?,
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| gemini::DEFAULT_BASE_URL.into()),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| openai::DEFAULT_MODEL.into()),
            openai_models_fallback: env::var("OPENAI_MODELS_FALLBACK").unwrap_or_default(),
            openai_max_tokens: env::var("OPENAI_MAX_TOKENS")
                .unwrap_or_else(|_| "4000".into())
                .parse()?,
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| openai::DEFAULT_BASE_URL.into()),
            llm_timeout_seconds: env::var("LLM_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "60".into())
                .parse()?,
            request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "120".into())
                .parse()?,
            model_context_limit: env::var("MODEL_CONTEXT_LIMIT")
                .unwrap_or_else(|_| "120000".into())
                .parse()?,
            response_reserve_tokens: env::var("RESPONSE_RESERVE_TOKENS")
                .unwrap_or_else(|_| "4000".into())
                .parse()?,
        })
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Content Directory: {}", self.content_dir.display());
        info!(
            "- Keyword Overrides: {}",
            self.keyword_overrides_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "embedded".into())
        );
        info!("- Context Reload: {}s", self.context_reload_seconds);
        info!("- Session TTL: {}s (sweep every {}s)", self.session_ttl_seconds, self.session_sweep_seconds);
        info!("- History: window {}, capacity {}", self.history_window, self.history_capacity);
        info!("- Search Limit: {}", self.search_limit);
        info!("- Owner: {} (default language: {})", self.portfolio_owner, self.default_language);
        info!(
            "- Gemini: {} ({:?})",
            if self.gemini_api_key.trim().is_empty() { "disabled" } else { "enabled" },
            parse_model_chain(&self.gemini_model, &self.gemini_models_fallback)
        );
        info!(
            "- OpenAI: {} ({:?})",
            if self.openai_api_key.trim().is_empty() { "disabled" } else { "enabled" },
            parse_model_chain(&self.openai_model, &self.openai_models_fallback)
        );
        info!("- LLM Timeout: {}s, Request Timeout: {}s", self.llm_timeout_seconds, self.request_timeout_seconds);
        info!(
            "- Model Context: {} tokens ({} reserved for the response)",
            self.model_context_limit, self.response_reserve_tokens
        );
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }

    /// None when no API key is set
    pub fn gemini_config(&self) -> Option<GeminiConfig> {
        if self.gemini_api_key.trim().is_empty() {
            return None;
        }
        Some(GeminiConfig {
            api_key: self.gemini_api_key.trim().to_string(),
            models: parse_model_chain(&self.gemini_model, &self.gemini_models_fallback),
            max_tokens: self.gemini_max_tokens,
            base_url: self.gemini_base_url.clone(),
            timeout: Duration::from_secs(self.llm_timeout_seconds),
        })
    }

    /// None when no API key is set
    pub fn openai_config(&self) -> Option<OpenAIConfig> {
        if self.openai_api_key.trim().is_empty() {
            return None;
        }
        Some(OpenAIConfig {
            api_key: self.openai_api_key.trim().to_string(),
            models: parse_model_chain(&self.openai_model, &self.openai_models_fallback),
            max_tokens: self.openai_max_tokens,
            base_url: self.openai_base_url.clone(),
            timeout: Duration::from_secs(self.llm_timeout_seconds),
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            history_window: self.history_window,
            history_capacity: self.history_capacity.max(self.history_window),
            ttl: Duration::from_secs(self.session_ttl_seconds),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            owner: self.portfolio_owner.clone(),
            default_language: self.default_language,
            search_limit: self.search_limit,
            search: SearchConfig {
                reload_interval: Duration::from_secs(self.context_reload_seconds),
                ..Default::default()
            },
            budget: BudgetConfig {
                context_limit: self.model_context_limit,
                response_reserve: self.response_reserve_tokens,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
/// Helper function to create a test Config with default values
pub(crate) fn create_test_config() -> Config {
    Config {
        api_host: "127.0.0.1".to_string(),
        api_port: 8080,
        content_dir: PathBuf::from("./content"),
        keyword_overrides_path: None,
        context_reload_seconds: 1800,
        session_ttl_seconds: 1800,
        session_sweep_seconds: 300,
        history_window: 10,
        history_capacity: 50,
        search_limit: 3,
        portfolio_owner: "Wesley Correia".to_string(),
        default_language: Language::Pt,
        gemini_api_key: "gemini-key".to_string(),
        gemini_model: "gemini-2.5-flash".to_string(),
        gemini_models_fallback: "gemini-2.0-flash, gemini-2.0-flash-lite".to_string(),
        gemini_max_tokens: 4000,
        gemini_base_url: gemini::DEFAULT_BASE_URL.to_string(),
        openai_api_key: String::new(),
        openai_model: "gpt-5-mini".to_string(),
        openai_models_fallback: String::new(),
        openai_max_tokens: 4000,
        openai_base_url: openai::DEFAULT_BASE_URL.to_string(),
        llm_timeout_seconds: 60,
        request_timeout_seconds: 120,
        model_context_limit: 120_000,
        response_reserve_tokens: 4_000,
    }
}
