//! Tracing subscriber setup.
//!
//! Every component logs through `tracing`; binaries call [`init_tracing`]
//! once at startup. `RUST_LOG` wins over the configured filter.

use crate::config::LogConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Builds the filter: `RUST_LOG` if set and valid, else `config.filter`,
/// else `info`.
#[must_use]
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber, JSON or human-readable.
///
/// Returns false when a subscriber was already installed, which is
/// harmless in tests that initialize more than once.
pub fn init_tracing(config: &LogConfig) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(config));
    let result = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_falls_back() {
        let config = LogConfig {
            filter: "meetflow=[[[".into(),
            json: false,
        };
        // Must not panic either way.
        let _ = env_filter(&config);
    }

    #[test]
    fn test_second_init_reports_false() {
        let config = LogConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
