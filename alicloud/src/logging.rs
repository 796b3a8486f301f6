//! Logging setup
//!
//! Logs go to stderr; stdout belongs to the plugin handshake. `RUST_LOG`
//! controls filtering, e.g. `RUST_LOG=alicloud=debug` shows every RAM call.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Install the global subscriber, defaulting to `info`
///
/// Called once by the plugin binary before it starts serving.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(filter("info"))
        .with(layer())
        .init();
}

/// Like [`init_logging`], but returns false instead of panicking when a
/// subscriber is already installed
pub fn try_init_logging(default_level: &str) -> bool {
    tracing_subscriber::registry()
        .with(filter(default_level))
        .with(layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialization_is_refused() {
        let _ = try_init_logging("debug");
        assert!(!try_init_logging("debug"));
    }
}
