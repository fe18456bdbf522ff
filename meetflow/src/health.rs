//! Concurrent liveness polling of stage collaborators.

use crate::config::{probe_url, PipelineConfig};
use crate::invoker::StageTransport;
use crate::utils::truncate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Longest collaborator body echoed into a status message.
const MAX_MESSAGE_BYTES: usize = 200;

/// Liveness of one collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Collaborator name.
    pub service: String,
    /// `up`, `down`, or `error <code>`.
    pub status: String,
    /// Failure detail; empty when up.
    #[serde(default)]
    pub message: String,
}

impl ServiceStatus {
    /// Returns true if the collaborator answered 200.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.status == "up"
    }
}

/// A collaborator to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    /// Collaborator name.
    pub service: String,
    /// Liveness URL.
    pub url: String,
}

/// Polls every configured collaborator and merges the results.
#[derive(Clone)]
pub struct HealthAggregator {
    transport: Arc<dyn StageTransport>,
    targets: Vec<ProbeTarget>,
    deadline: Duration,
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAggregator")
            .field("targets", &self.targets)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl HealthAggregator {
    /// Creates an aggregator for explicit targets.
    #[must_use]
    pub fn new(transport: Arc<dyn StageTransport>, targets: Vec<ProbeTarget>, deadline: Duration) -> Self {
        Self {
            transport,
            targets,
            deadline,
        }
    }

    /// Creates an aggregator probing every enabled stage collaborator.
    #[must_use]
    pub fn from_config(transport: Arc<dyn StageTransport>, config: &PipelineConfig) -> Self {
        let targets = config
            .enabled_endpoints()
            .into_iter()
            .map(|endpoint| ProbeTarget {
                service: endpoint.service().to_string(),
                url: probe_url(&endpoint.url),
            })
            .collect();
        Self::new(transport, targets, config.health_timeout)
    }

    /// Configured targets.
    #[must_use]
    pub fn targets(&self) -> &[ProbeTarget] {
        &self.targets
    }

    /// Probes all targets concurrently.
    ///
    /// Always returns one entry per target, in configuration order.
    pub async fn check(&self) -> Vec<ServiceStatus> {
        let probes = self.targets.iter().map(|target| self.probe(target));
        join_all(probes).await
    }

    async fn probe(&self, target: &ProbeTarget) -> ServiceStatus {
        let call = self.transport.get(&target.url, self.deadline);
        let (status, message) = match tokio::time::timeout(self.deadline, call).await {
            Ok(Ok(response)) if response.status == 200 => ("up".to_string(), String::new()),
            Ok(Ok(response)) => (
                format!("error {}", response.status),
                truncate(response.body.trim(), MAX_MESSAGE_BYTES),
            ),
            Ok(Err(error)) => ("down".to_string(), error.to_string()),
            Err(_) => (
                "down".to_string(),
                format!("no response within {:?}", self.deadline),
            ),
        };
        debug!(service = %target.service, status = %status, "Health probe finished");
        ServiceStatus {
            service: target.service.clone(),
            status,
            message,
        }
    }
}
