//! Progress fan-out and lifecycle telemetry.
//!
//! [`ProgressBus`] carries the user-facing per-task progress events.
//! [`EventSink`] receives operator-facing telemetry about pipeline runs.

mod bus;
mod sink;

pub use bus::{ProgressBus, Subscription, DEFAULT_CAPACITY};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Telemetry event type names.
pub mod telemetry {
    /// A pipeline run began.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// A pipeline run reached `done`.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A pipeline run reached `error`.
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    /// A stage call is about to be issued.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage finished; carries `duration_ms`.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage attempt failed and will be retried.
    pub const STAGE_RETRY: &str = "stage.retry";
    /// A stage ended fatally.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// The final record could not be persisted.
    pub const RESULT_PERSIST_FAILED: &str = "result.persist_failed";
}
