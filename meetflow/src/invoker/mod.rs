//! Stage calls with per-call timeout and bounded retry.
//!
//! The invoker classifies every attempt:
//!
//! - 2xx with a body of the right shape: success
//! - no reply, timeout, or 429/500/502/503/504: retryable, backed off and
//!   retried until the budget runs out ([`StageFailure::Exhausted`])
//! - any other status: fatal at once ([`StageFailure::Rejected`])
//! - 2xx with a malformed body: fatal at once
//!   ([`StageFailure::InvalidResponse`])
//!
//! A request that cannot be encoded is never sent
//! ([`StageFailure::InvalidRequest`]).
//!
//! It holds no task state.

mod retry;
mod transport;

pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{StageTransport, TransportResponse};

use crate::core::PipelineStage;
use crate::errors::{StageFailure, TransportError};
use crate::events::{telemetry, EventSink, NoOpEventSink};
use crate::stages::{StageRequest, StageResponse};
use crate::utils::truncate;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn, Instrument};

/// Statuses treated like transport failures.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

const MAX_BODY_IN_ERROR: usize = 512;

/// Where and how to call one stage collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEndpoint {
    /// Stage served by the collaborator.
    pub stage: PipelineStage,
    /// Full request URL.
    pub url: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retry budget.
    pub retry: RetryConfig,
}

impl StageEndpoint {
    /// Creates an endpoint with the default retry budget.
    #[must_use]
    pub fn new(stage: PipelineStage, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            stage,
            url: url.into(),
            timeout,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Collaborator name.
    #[must_use]
    pub fn service(&self) -> &'static str {
        self.stage.service_name()
    }
}

/// Issues stage calls through a [`StageTransport`].
#[derive(Clone)]
pub struct StageInvoker {
    transport: Arc<dyn StageTransport>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StageInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageInvoker").finish_non_exhaustive()
    }
}

impl StageInvoker {
    /// Creates an invoker without telemetry.
    #[must_use]
    pub fn new(transport: Arc<dyn StageTransport>) -> Self {
        Self {
            transport,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the sink receiving `stage.retry` telemetry.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn StageTransport> {
        &self.transport
    }

    /// Sends a typed request and decodes the stage's reply.
    ///
    /// # Errors
    ///
    /// Returns a [`StageFailure`] when the call ends fatally.
    pub async fn call<R: StageRequest>(
        &self,
        endpoint: &StageEndpoint,
        request: &R,
    ) -> Result<R::Response, StageFailure> {
        let payload = serde_json::to_value(request).map_err(|e| StageFailure::InvalidRequest {
            service: endpoint.service().to_string(),
            reason: e.to_string(),
        })?;
        let body = self.invoke(endpoint, &payload).await?;
        decode::<R::Response>(endpoint, &body)
    }

    /// Sends a raw JSON payload and returns the raw 2xx body.
    ///
    /// # Errors
    ///
    /// Returns [`StageFailure::Rejected`] for non-retryable statuses and
    /// [`StageFailure::Exhausted`] once the retry budget is spent.
    pub async fn invoke(
        &self,
        endpoint: &StageEndpoint,
        payload: &Value,
    ) -> Result<String, StageFailure> {
        let span = tracing::debug_span!("stage.call", stage = %endpoint.stage, url = %endpoint.url);
        self.invoke_with_retry(endpoint, payload).instrument(span).await
    }

    async fn invoke_with_retry(
        &self,
        endpoint: &StageEndpoint,
        payload: &Value,
    ) -> Result<String, StageFailure> {
        let attempts = endpoint.retry.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.attempt(endpoint, payload).await {
                Ok(response) if response.is_success() => return Ok(response.body),
                Ok(response) if RETRYABLE_STATUSES.contains(&response.status) => {
                    TransportError::Request(format!(
                        "HTTP {}: {}",
                        response.status,
                        truncate(&response.body, MAX_BODY_IN_ERROR)
                    ))
                }
                Ok(response) => {
                    warn!(status = response.status, "Stage collaborator rejected the request");
                    return Err(StageFailure::Rejected {
                        service: endpoint.service().to_string(),
                        status: response.status,
                        body: truncate(&response.body, MAX_BODY_IN_ERROR),
                    });
                }
                Err(error) => error,
            };

            if attempt >= attempts {
                warn!(attempts, error = %error, "Stage retry budget exhausted");
                return Err(StageFailure::Exhausted {
                    service: endpoint.service().to_string(),
                    attempts,
                    last_error: error,
                });
            }

            let delay = endpoint.retry.delay_for(attempt - 1);
            debug!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Retrying stage call"
            );
            self.sink.try_emit(
                telemetry::STAGE_RETRY,
                Some(json!({
                    "stage": endpoint.stage.as_str(),
                    "service": endpoint.service(),
                    "attempt": attempt,
                    "delay_ms": delay.as_millis(),
                    "error": error.to_string(),
                })),
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        endpoint: &StageEndpoint,
        payload: &Value,
    ) -> Result<TransportResponse, TransportError> {
        let call = self
            .transport
            .post_json(&endpoint.url, payload, endpoint.timeout);
        match tokio::time::timeout(endpoint.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(endpoint.timeout)),
        }
    }
}

fn decode<T: StageResponse>(endpoint: &StageEndpoint, body: &str) -> Result<T, StageFailure> {
    let invalid = |reason: String| StageFailure::InvalidResponse {
        service: endpoint.service().to_string(),
        reason,
    };
    let value: T = serde_json::from_str(body).map_err(|e| invalid(e.to_string()))?;
    value.validate().map_err(invalid)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::stages::{SummarizationRequest, SummarizationResponse};
    use crate::testing::{ScriptedReply, ScriptedTransport};
    use pretty_assertions::assert_eq;

    const URL: &str = "http://summarization:8005/summarization/";

    fn endpoint(attempts: usize) -> StageEndpoint {
        StageEndpoint::new(PipelineStage::Summarizing, URL, Duration::from_millis(50)).with_retry(
            RetryConfig::new()
                .with_max_attempts(attempts)
                .with_base_delay_ms(1),
        )
    }

    fn request() -> SummarizationRequest {
        SummarizationRequest {
            transcript_path: "/d/t/transcript/a.txt".into(),
            output_dir: "/d/t/summary".into(),
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(URL, ScriptedReply::json(json!({"summary_path": "/d/t/summary/a.md"})));
        let invoker = StageInvoker::new(transport.clone());

        let response: SummarizationResponse = invoker.call(&endpoint(3), &request()).await.unwrap();
        assert_eq!(response.summary_path.to_str(), Some("/d/t/summary/a.md"));
        assert_eq!(transport.call_count(URL), 1);
        assert_eq!(
            transport.calls()[0].body["transcript_path"],
            "/d/t/transcript/a.txt"
        );
    }

    #[tokio::test]
    async fn test_transport_failures_are_retried_then_succeed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(URL, ScriptedReply::ConnectError);
        transport.push(URL, ScriptedReply::status(503, "busy"));
        transport.push(URL, ScriptedReply::json(json!({"summary_path": "/s.md"})));
        let sink = Arc::new(CollectingEventSink::new());
        let invoker = StageInvoker::new(transport.clone()).with_event_sink(sink.clone());

        assert!(invoker.call(&endpoint(3), &request()).await.is_ok());
        assert_eq!(transport.call_count(URL), 3);
        assert_eq!(sink.events_of_type(telemetry::STAGE_RETRY).len(), 2);
    }

    #[tokio::test]
    async fn test_timeouts_exhaust_budget() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_default(URL, ScriptedReply::Hang);
        let invoker = StageInvoker::new(transport.clone());

        let err = invoker.call(&endpoint(3), &request()).await.unwrap_err();
        assert_eq!(
            err,
            StageFailure::Exhausted {
                service: "summarization".into(),
                attempts: 3,
                last_error: TransportError::Timeout(Duration::from_millis(50)),
            }
        );
        assert_eq!(transport.call_count(URL), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_default(URL, ScriptedReply::status(422, "no speech detected"));
        let invoker = StageInvoker::new(transport.clone());

        let err = invoker.call(&endpoint(3), &request()).await.unwrap_err();
        assert!(matches!(err, StageFailure::Rejected { status: 422, .. }));
        assert!(err.to_string().contains("no speech detected"));
        assert_eq!(transport.call_count(URL), 1);
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_fatal() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_default(URL, ScriptedReply::json(json!({"summary": "inline text"})));
        let invoker = StageInvoker::new(transport.clone());

        let err = invoker.call(&endpoint(3), &request()).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_response");
        assert_eq!(transport.call_count(URL), 1);
    }

    struct Unencodable;

    impl serde::Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("unsupported payload"))
        }
    }

    impl StageRequest for Unencodable {
        const STAGE: PipelineStage = PipelineStage::Summarizing;
        type Response = SummarizationResponse;
    }

    #[tokio::test]
    async fn test_unencodable_request_is_never_sent() {
        let transport = Arc::new(ScriptedTransport::new());
        let invoker = StageInvoker::new(transport.clone());

        let err = invoker.call(&endpoint(3), &Unencodable).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
        assert!(err.to_string().contains("unsupported payload"));
        assert_eq!(transport.call_count(URL), 0);
    }
}
