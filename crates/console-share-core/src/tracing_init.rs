//! Logging setup for `console-share-relay` and `console-share`.
//!
//! Both write to stderr so `console-share` can keep stdout for connect hints
//! and `list` output. `RUST_LOG` overrides `--log-level`, and `--log-json`
//! switches to one JSON object per line for journald or log shippers.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"console_share_relay=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }
}

/// Default filter for a binary: its own target plus the core library.
pub fn default_filter(crate_name: &str, level: &str) -> String {
    format!("{crate_name}={level},console_share_core={level}")
}
