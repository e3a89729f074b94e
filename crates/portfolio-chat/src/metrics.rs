use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use lazy_static::lazy_static;
use std::sync::OnceLock;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static CHAT_REQUESTS: OnceLock<IntCounterVec> = OnceLock::new();
static BUDGET_REDUCTIONS: OnceLock<IntCounter> = OnceLock::new();
static RELOADS: OnceLock<IntCounterVec> = OnceLock::new();
static ACTIVE_SESSIONS: OnceLock<IntGauge> = OnceLock::new();
static LLM_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Safe to call more than once; duplicate registrations are ignored
pub fn init_metrics() {
    let chat_requests = CHAT_REQUESTS.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("chat_requests_total", "Chat requests by outcome"),
            &["status"]
        ).expect("valid chat_requests_total definition")
    });

    let budget_reductions = BUDGET_REDUCTIONS.get_or_init(|| {
        IntCounter::new("token_budget_reductions_total", "Requests trimmed to fit the token budget")
            .expect("valid token_budget_reductions_total definition")
    });

    let reloads = RELOADS.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("context_reloads_total", "Context cache reloads"),
            &["component", "outcome"]
        ).expect("valid context_reloads_total definition")
    });

    let active_sessions = ACTIVE_SESSIONS.get_or_init(|| {
        IntGauge::new("active_sessions", "Chat sessions held in memory")
            .expect("valid active_sessions definition")
    });

    let llm_latency = LLM_LATENCY.get_or_init(|| {
        HistogramVec::new(
            HistogramOpts::new("llm_request_duration_seconds", "Time spent waiting for the LLM provider"),
            &["provider"]
        ).expect("valid llm_request_duration_seconds definition")
    });

    REGISTRY.register(Box::new(chat_requests.clone())).ok();
    REGISTRY.register(Box::new(budget_reductions.clone())).ok();
    REGISTRY.register(Box::new(reloads.clone())).ok();
    REGISTRY.register(Box::new(active_sessions.clone())).ok();
    REGISTRY.register(Box::new(llm_latency.clone())).ok();
}

pub fn inc_chat_request(status: &str) {
    if let Some(counter) = CHAT_REQUESTS.get() {
        counter.with_label_values(&[status]).inc();
    }
}

pub fn inc_budget_reduction() {
    if let Some(counter) = BUDGET_REDUCTIONS.get() {
        counter.inc();
    }
}

pub fn record_reload(component: &str, success: bool) {
    if let Some(counter) = RELOADS.get() {
        let outcome = if success { "ok" } else { "error" };
        counter.with_label_values(&[component, outcome]).inc();
    }
}

pub fn set_sessions(count: usize) {
    if let Some(gauge) = ACTIVE_SESSIONS.get() {
        gauge.set(count as i64);
    }
}

pub fn observe_llm_latency(provider: &str, seconds: f64) {
    if let Some(histogram) = LLM_LATENCY.get() {
        histogram.with_label_values(&[provider]).observe(seconds);
    }
}

/// Prometheus text exposition of everything registered
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(feature = "cli")]
pub async fn get_metrics() -> axum::response::Response {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    match gather_text() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ).into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}
