//! Scripted collaborator transport for tests.

use crate::errors::TransportError;
use crate::invoker::{StageTransport, TransportResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type Responder = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// One scripted answer.
#[derive(Clone)]
pub enum ScriptedReply {
    /// Answer with a status and body.
    Status(u16, String),
    /// Answer 200 with a body computed from the request.
    Respond(Responder),
    /// Never answer; the caller's timeout fires.
    Hang,
    /// Fail to connect.
    ConnectError,
    /// Wait, then answer with the inner reply.
    Delayed(Duration, Box<ScriptedReply>),
}

impl fmt::Debug for ScriptedReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status, body) => f.debug_tuple("Status").field(status).field(body).finish(),
            Self::Respond(_) => f.write_str("Respond(..)"),
            Self::Hang => f.write_str("Hang"),
            Self::ConnectError => f.write_str("ConnectError"),
            Self::Delayed(delay, reply) => f.debug_tuple("Delayed").field(delay).field(reply).finish(),
        }
    }
}

impl ScriptedReply {
    /// 200 with a JSON body.
    #[must_use]
    pub fn json(body: Value) -> Self {
        Self::Status(200, body.to_string())
    }

    /// Any status with a text body.
    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status(status, body.into())
    }

    /// 200 with a JSON body computed from the request body.
    #[must_use]
    pub fn respond<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Self::Respond(Arc::new(f))
    }

    /// Wraps the reply in a delay.
    #[must_use]
    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// HTTP method of a recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// JSON POST (stage call).
    Post,
    /// GET (liveness probe).
    Get,
}

/// A call seen by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Method.
    pub method: Method,
    /// Target URL.
    pub url: String,
    /// JSON body, `Null` for GETs.
    pub body: Value,
}

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<ScriptedReply>,
    fallback: Option<ScriptedReply>,
}

/// An in-memory [`StageTransport`] answering from per-URL scripts.
///
/// Queued replies are consumed first, then the URL's default reply is
/// repeated. URLs without any script fail to connect.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    /// Creates a transport with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a one-shot reply for `url`.
    pub fn push(&self, url: &str, reply: ScriptedReply) {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .queued
            .push_back(reply);
    }

    /// Sets the reply used once the queue for `url` is empty.
    pub fn set_default(&self, url: &str, reply: ScriptedReply) {
        self.scripts.lock().entry(url.to_string()).or_default().fallback = Some(reply);
    }

    /// All recorded calls in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls made to `url`.
    #[must_use]
    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.url == url).count()
    }

    /// URLs of POST calls in order.
    #[must_use]
    pub fn posted_urls(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == Method::Post)
            .map(|c| c.url.clone())
            .collect()
    }

    fn next_reply(&self, url: &str) -> Option<ScriptedReply> {
        let mut scripts = self.scripts.lock();
        let script = scripts.get_mut(url)?;
        script.queued.pop_front().or_else(|| script.fallback.clone())
    }

    async fn answer(&self, method: Method, url: &str, body: Value) -> Result<TransportResponse, TransportError> {
        self.calls.lock().push(RecordedCall {
            method,
            url: url.to_string(),
            body: body.clone(),
        });

        let mut reply = self.next_reply(url);
        loop {
            match reply {
                None | Some(ScriptedReply::ConnectError) => {
                    return Err(TransportError::Connect(format!("connection refused: {url}")));
                }
                Some(ScriptedReply::Status(status, text)) => {
                    return Ok(TransportResponse::new(status, text));
                }
                Some(ScriptedReply::Respond(responder)) => {
                    return Ok(TransportResponse::new(200, responder(&body).to_string()));
                }
                Some(ScriptedReply::Hang) => {
                    futures::future::pending::<()>().await;
                }
                Some(ScriptedReply::Delayed(delay, inner)) => {
                    tokio::time::sleep(delay).await;
                    reply = Some(*inner);
                }
            }
        }
    }
}

#[async_trait]
impl StageTransport for ScriptedTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.answer(Method::Post, url, body.clone()).await
    }

    async fn get(&self, url: &str, _timeout: Duration) -> Result<TransportResponse, TransportError> {
        self.answer(Method::Get, url, Value::Null).await
    }
}
