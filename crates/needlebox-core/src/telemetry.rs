//! Tracing initialisation for needlebox hosts.
//!
//! Events come from two targets: `needlebox_core` (episode lifecycle,
//! `episode.*`, `turn.*`, `batch.*` and metrics flushes) and
//! `needlebox_sandbox` (per-action admission and execution at `debug`).
//! A typical focused filter is
//! `RUST_LOG=needlebox_core=info,needlebox_sandbox=debug`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: needlebox targets at `level`,
/// everything else (tokio, regex) at `warn`.
pub fn default_directives(level: Level) -> String {
    format!("warn,needlebox_core={level},needlebox_sandbox={level}").to_lowercase()
}

/// Install the global subscriber. Only the first call in a process takes
/// effect.
///
/// * `json`: newline-delimited JSON, one object per event, for batch runs
///   whose logs are collected.
/// * `level`: needlebox verbosity when `RUST_LOG` is unset.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_needlebox_targets() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,needlebox_core=debug,needlebox_sandbox=debug"
        );
        assert!(default_directives(Level::INFO)
            .parse::<EnvFilter>()
            .is_ok());
    }

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(false, Level::DEBUG);
        init_tracing(true, Level::INFO);
        tracing::info!(event = "telemetry.test", "still logging");
    }
}
