//! The network seam between the invoker and stage collaborators.

use crate::errors::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Raw collaborator reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

impl TransportResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to collaborators.
///
/// Implementations report a reply with any status as `Ok`; only failures
/// to obtain a reply are errors.
#[async_trait]
pub trait StageTransport: Send + Sync {
    /// POSTs a JSON body.
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;

    /// Issues a GET, used for liveness probes.
    async fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse, TransportError>;
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::{StageTransport, TransportResponse};
    use crate::errors::TransportError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    /// [`StageTransport`] over HTTP.
    #[derive(Debug, Clone, Default)]
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        /// Creates a transport with a fresh connection pool.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a transport sharing an existing client.
        #[must_use]
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }

        async fn finish(
            result: reqwest::Result<reqwest::Response>,
            timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            let response = result.map_err(|e| classify(&e, timeout))?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| classify(&e, timeout))?;
            Ok(TransportResponse { status, body })
        }
    }

    fn classify(error: &reqwest::Error, timeout: Duration) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(timeout)
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else {
            TransportError::Request(error.to_string())
        }
    }

    #[async_trait]
    impl StageTransport for HttpTransport {
        async fn post_json(
            &self,
            url: &str,
            body: &Value,
            timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            let result = self
                .client
                .post(url)
                .timeout(timeout)
                .json(body)
                .send()
                .await;
            Self::finish(result, timeout).await
        }

        async fn get(
            &self,
            url: &str,
            timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            let result = self.client.get(url).timeout(timeout).send().await;
            Self::finish(result, timeout).await
        }
    }
}
