//! Logging integration for tessera.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-compilation spans.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log_level`; an unparseable directive
/// falls back to "info". Debug mode uses a pretty format, otherwise JSON.
/// Installing a second subscriber is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one compilation.
///
/// # Examples
///
/// ```
/// use tessera_core::logging::compile_span;
///
/// let span = compile_span("select", "SqlServer");
/// let _guard = span.enter();
/// tracing::debug!("walking predicate");
/// ```
pub fn compile_span(kind: &str, provider: &str) -> tracing::Span {
    tracing::info_span!("compile", kind = kind, provider = provider)
}
