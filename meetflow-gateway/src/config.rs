//! Gateway configuration, loaded from environment variables at startup.

use meetflow::config::PipelineConfig;
use meetflow::errors::ConfigError;
use std::net::SocketAddr;

/// Runtime configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// TCP address to bind (default: `0.0.0.0:8000`).
    pub bind_address: SocketAddr,

    /// Allowed CORS origins; `None` allows any origin.
    pub frontend_origins: Option<Vec<String>>,

    /// Engine settings shared with the library.
    pub pipeline: PipelineConfig,
}

impl GatewayConfig {
    /// Builds the config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = lookup("MEETFLOW_BIND").unwrap_or_else(|| "0.0.0.0:8000".to_owned());
        let bind_address = bind
            .parse()
            .map_err(|e| ConfigError::invalid("MEETFLOW_BIND", &bind, format!("{e}")))?;

        Ok(Self {
            bind_address,
            frontend_origins: lookup("FRONTEND_ORIGINS").and_then(|raw| parse_origins(&raw)),
            pipeline: PipelineConfig::from_lookup(lookup)?,
        })
    }
}

/// `*` or an empty list means any origin.
fn parse_origins(raw: &str) -> Option<Vec<String>> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        None
    } else {
        Some(origins)
    }
}
