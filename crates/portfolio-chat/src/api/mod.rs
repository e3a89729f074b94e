//! API module - HTTP surface of the chat service

pub mod admin_api;
pub mod chat_api;

// Re-export API handlers
pub use admin_api::{health, reload, status, HealthResponse};
pub use chat_api::{chat, clear, ChatRequest, ChatResponse, LANGUAGE_HEADER, SESSION_HEADER};
