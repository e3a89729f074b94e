use tracing_subscriber::{fmt, EnvFilter};

/// Default filter keeps the crate at info and quiets the HTTP client internals
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

pub fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .compact()
        .finish();

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing::subscriber::set_global_default(subscriber);
}
