//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! - LOG_LEVEL holds filter directives, e.g. "debug" or "info,quiz=debug,xp=debug,provider=info".
//! - LOG_FORMAT=json switches to JSON lines; anything else gives the default fmt output.
//!
//! Targets in use: study_buddy, provider, quiz, xp, store. Prompts and AI text are logged
//! as lengths or short previews only; API keys never.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,study_buddy=debug,provider=debug,tower_http=info,axum=info";

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_tracing() {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_from_env())
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // The two builders have different types; init each branch directly.
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}
