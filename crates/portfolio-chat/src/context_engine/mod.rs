//! Context engine module - retrieval, prompt assembly and budget control for chat

pub mod keyword_detector;
pub mod orchestrator;
pub mod prompt_builder;
pub mod search_index;
pub mod token_budget;

pub use keyword_detector::{KeywordOverrides, ProjectKeywordDetector};
pub use orchestrator::{ChatOrchestrator, ChatStatus, IndexStatus, OrchestratorConfig};
pub use prompt_builder::{ProjectDocument, PromptBuilder};
pub use search_index::{DocumentChunk, SearchConfig, SearchIndex};
pub use token_budget::{BudgetConfig, TokenBudget, TokenBudgetResult, TokenCounter};
