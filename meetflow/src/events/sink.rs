//! Pipeline telemetry sinks.

use super::telemetry;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn, Level};

/// Receives pipeline lifecycle telemetry.
///
/// Telemetry is operator-facing and separate from the per-task progress
/// stream; sinks must never fail the pipeline. Payloads are JSON objects
/// that carry `task_id` and, for stage events, `stage`.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event without awaiting. Errors are swallowed.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes telemetry to `tracing`.
///
/// `task_id` and `stage` are lifted out of the payload into fields.
/// Failures log at WARN, retries and stage starts at DEBUG, everything
/// else at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl LoggingEventSink {
    fn level_for(event_type: &str) -> Level {
        match event_type {
            telemetry::STAGE_FAILED
            | telemetry::PIPELINE_FAILED
            | telemetry::RESULT_PERSIST_FAILED => Level::WARN,
            telemetry::STAGE_RETRY | telemetry::STAGE_STARTED => Level::DEBUG,
            _ => Level::INFO,
        }
    }

    fn log_event(event_type: &str, data: Option<&Value>) {
        let task_id = str_field(data, "task_id");
        let stage = str_field(data, "stage");
        let level = Self::level_for(event_type);
        if level == Level::WARN {
            warn!(
                event = event_type,
                task_id,
                stage,
                error = str_field(data, "error"),
                "Pipeline telemetry"
            );
        } else if level == Level::DEBUG {
            debug!(event = event_type, task_id, stage, data = ?data, "Pipeline telemetry");
        } else {
            info!(event = event_type, task_id, stage, data = ?data, "Pipeline telemetry");
        }
    }
}

fn str_field<'a>(data: Option<&'a Value>, key: &str) -> &'a str {
    data.and_then(|d| d.get(key))
        .and_then(Value::as_str)
        .unwrap_or("-")
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        Self::log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        Self::log_event(event_type, data.as_ref());
    }
}

/// Records events in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<(String, Option<Value>)>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events of exactly this type, in emission order.
    #[must_use]
    pub fn events_of_type(&self, event_type: &str) -> Vec<(String, Option<Value>)> {
        self.events
            .lock()
            .iter()
            .filter(|(t, _)| t == event_type)
            .cloned()
            .collect()
    }

    /// Event types emitted for one task, in order.
    ///
    /// Retry events carry no `task_id` and are left out.
    #[must_use]
    pub fn task_timeline(&self, task_id: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(_, data)| str_field(data.as_ref(), "task_id") == task_id)
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.try_emit(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.events.lock().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failures_log_loudest() {
        assert_eq!(LoggingEventSink::level_for(telemetry::STAGE_FAILED), Level::WARN);
        assert_eq!(
            LoggingEventSink::level_for(telemetry::RESULT_PERSIST_FAILED),
            Level::WARN
        );
        assert_eq!(LoggingEventSink::level_for(telemetry::STAGE_RETRY), Level::DEBUG);
        assert_eq!(
            LoggingEventSink::level_for(telemetry::PIPELINE_COMPLETED),
            Level::INFO
        );
    }

    #[tokio::test]
    async fn test_logging_sink_tolerates_any_payload() {
        let sink = LoggingEventSink;
        sink.emit(telemetry::STAGE_FAILED, Some(json!({"stage": "vad"}))).await;
        sink.emit(telemetry::PIPELINE_STARTED, Some(json!(["not", "an", "object"])))
            .await;
        sink.try_emit(telemetry::STAGE_COMPLETED, None);
        NoOpEventSink.emit(telemetry::PIPELINE_STARTED, None).await;
    }

    #[tokio::test]
    async fn test_task_timeline_separates_tasks() {
        let sink = CollectingEventSink::new();
        sink.emit(telemetry::PIPELINE_STARTED, Some(json!({"task_id": "a"}))).await;
        sink.emit(telemetry::PIPELINE_STARTED, Some(json!({"task_id": "b"}))).await;
        sink.try_emit(telemetry::STAGE_RETRY, Some(json!({"attempt": 1})));
        sink.emit(
            telemetry::STAGE_FAILED,
            Some(json!({"task_id": "a", "stage": "vad"})),
        )
        .await;

        assert_eq!(
            sink.task_timeline("a"),
            vec![telemetry::PIPELINE_STARTED, telemetry::STAGE_FAILED]
        );
        assert_eq!(sink.task_timeline("b"), vec![telemetry::PIPELINE_STARTED]);
        assert_eq!(sink.events_of_type(telemetry::STAGE_RETRY).len(), 1);
        assert!(sink.events_of_type("stage.").is_empty());
    }
}
