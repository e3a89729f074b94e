// Chat API: one visitor message in, one model reply out, history keyed by the X-Session-ID header
use axum::{
    extract::{Json, State},
    http::{header::ACCEPT_LANGUAGE, HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::content::Language;
use crate::shared_state::UnifiedAppState;

pub const SESSION_HEADER: &str = "x-session-id";
pub const LANGUAGE_HEADER: &str = "x-language";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    /// `gpt`/`openai` selects OpenAI, anything else the default provider
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub model: Option<String>,
}

fn friendly_error(language: Language) -> &'static str {
    match language {
        Language::Pt => "Desculpe, não consegui responder agora. Tente novamente em instantes.",
        Language::En => "Sorry, I couldn't answer right now. Please try again in a moment.",
    }
}

pub(crate) fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

/// X-Language wins over Accept-Language; neither falls back to the configured default
pub(crate) fn request_language(headers: &HeaderMap, fallback: Language) -> Language {
    let header = headers
        .get(LANGUAGE_HEADER)
        .or_else(|| headers.get(ACCEPT_LANGUAGE))
        .and_then(|v| v.to_str().ok());
    Language::from_header(header, fallback)
}

pub async fn chat(
    State(state): State<UnifiedAppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ChatResponse>)> {
    let language = request_language(&headers, state.config.default_language);
    info!(
        "Chat request (length: {} chars, language: {}, model: {})",
        req.message.chars().count(),
        language,
        req.model.as_deref().unwrap_or("default")
    );

    match state
        .orchestrator
        .process_chat(&req.message, session_id(&headers), language, req.model.as_deref())
        .await
    {
        Ok(reply) => Ok(Json(ChatResponse {
            reply: reply.reply,
            model: reply.model_used,
        })),
        Err(e) => {
            error!("Chat request failed: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatResponse {
                    reply: friendly_error(language).to_string(),
                    model: None,
                }),
            ))
        }
    }
}

pub async fn clear(State(state): State<UnifiedAppState>, headers: HeaderMap) -> StatusCode {
    if let Some(id) = session_id(&headers) {
        info!("Clearing history for session {}", id);
        state.orchestrator.clear_session(id);
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{read_json, test_state};
    use crate::llm::testing::FakeProvider;
    use crate::server::build_router;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn chat_request(body: &str, session: Option<&str>, language: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json");
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        if let Some(language) = language {
            builder = builder.header(ACCEPT_LANGUAGE, language);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[test]
    fn test_request_language_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_language(&headers, Language::En), Language::En);

        headers.insert(ACCEPT_LANGUAGE, "en-US,en;q=0.9".parse().unwrap());
        assert_eq!(request_language(&headers, Language::Pt), Language::En);

        headers.insert(LANGUAGE_HEADER, "pt".parse().unwrap());
        assert_eq!(request_language(&headers, Language::En), Language::Pt);
    }

    #[tokio::test]
    async fn test_chat_returns_reply_and_model() {
        let (state, llm) = test_state(FakeProvider::replying("gemini", "Olá, visitante!"));
        let app = build_router(state.clone());

        let response = app
            .oneshot(chat_request(r#"{"message":"Quais stacks?"}"#, Some("s1"), Some("pt-BR")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: ChatResponse = read_json(response).await;
        assert_eq!(body.reply, "Olá, visitante!");
        assert_eq!(body.model.as_deref(), Some("gemini-model"));
        assert_eq!(llm.calls(), 1);
        assert_eq!(state.orchestrator.sessions().get_recent("s1").len(), 2);
    }

    #[tokio::test]
    async fn test_blank_message_gets_empty_reply() {
        let (state, llm) = test_state(FakeProvider::replying("gemini", "unused"));
        let response = build_router(state)
            .oneshot(chat_request(r#"{"message":"   "}"#, Some("s1"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: ChatResponse = read_json(response).await;
        assert_eq!(body.reply, "");
        assert!(body.model.is_none());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_friendly_500() {
        let (state, _) = test_state(FakeProvider::failing("gemini", "quota exceeded"));
        let response = build_router(state)
            .oneshot(chat_request(r#"{"message":"Hello"}"#, Some("s1"), Some("en")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ChatResponse = read_json(response).await;
        assert_eq!(body.reply, friendly_error(Language::En));
        assert!(!body.reply.contains("quota"));
    }

    #[tokio::test]
    async fn test_clear_drops_session_history() {
        let (state, _) = test_state(FakeProvider::replying("gemini", "ok"));
        let app = build_router(state.clone());
        app.clone()
            .oneshot(chat_request(r#"{"message":"Oi"}"#, Some("s1"), None))
            .await
            .unwrap();
        assert_eq!(state.orchestrator.sessions().session_count(), 1);

        let clear = Request::builder()
            .method("POST")
            .uri("/api/chat/clear")
            .header(SESSION_HEADER, "s1")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(clear).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.orchestrator.sessions().session_count(), 0);

        let without_session = Request::builder()
            .method("POST")
            .uri("/api/chat/clear")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.oneshot(without_session).await.unwrap().status(), StatusCode::OK);
    }
}
