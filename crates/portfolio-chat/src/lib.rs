#[cfg(feature = "cli")]
pub mod api;
pub mod config;
pub mod content;
pub mod context_engine;
pub mod llm;
pub mod memory;
pub mod metrics;
#[cfg(feature = "cli")]
pub mod server;
pub mod shared_state;
pub mod telemetry;
pub mod utils;

// Public API exports
pub use config::Config;
pub use content::{ContentProvider, FilesystemContentProvider, Language, MarkdownDocument};
pub use context_engine::{ChatOrchestrator, OrchestratorConfig};
pub use llm::{ChatProvider, ChatReply, LlmRouter};
pub use memory::{InMemoryMemoryStore, MemoryStore, Message, Role};
#[cfg(feature = "cli")]
pub use server::run_server;
