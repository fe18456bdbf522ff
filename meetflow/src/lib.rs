//! # Meetflow
//!
//! Orchestration engine for a meeting-recording pipeline.
//!
//! An uploaded recording becomes a task that runs through five remote
//! stages in a fixed order, each performed by an independent HTTP
//! collaborator:
//!
//! 1. **preprocessing**: audio normalization
//! 2. **vad**: voice-activity segmentation (optional)
//! 3. **diarizing**: speaker turns
//! 4. **transcribing**: speech to text
//! 5. **summarizing**: summary of the transcript
//!
//! The engine provides:
//!
//! - **Task registry**: the concurrency-safe record of every task
//! - **Stage invoker**: per-call timeouts and bounded retry
//! - **Progress bus**: per-task fan-out of progress events to observers
//! - **Result store**: durable terminal records
//! - **Health aggregation**: concurrent liveness probes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use meetflow::prelude::*;
//!
//! let config = PipelineConfig::from_env()?;
//! let orchestrator = Orchestrator::builder(config, Arc::new(HttpTransport::new())).build();
//!
//! let task_id = orchestrator.submit("standup.mp3", body_stream).await?;
//! let mut progress = orchestrator.watch(&task_id).await?;
//! while let Some(event) = progress.recv().await {
//!     println!("{} {}%", event.stage, event.progress);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod health;
pub mod invoker;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod stages;
pub mod store;
pub mod testing;
pub mod utils;
pub mod workarea;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{LogConfig, PipelineConfig, UploadLimits};
    pub use crate::core::{
        ArtifactKind, EventPhase, PipelineStage, ProgressEvent, Task, TaskError, TaskStatus,
    };
    pub use crate::errors::{
        MeetflowError, RegistryError, StageFailure, StoreError, SubmitError, TransportError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, ProgressBus, Subscription};
    pub use crate::health::{HealthAggregator, ServiceStatus};
    #[cfg(feature = "http")]
    pub use crate::invoker::HttpTransport;
    pub use crate::invoker::{RetryConfig, StageEndpoint, StageInvoker, StageTransport};
    pub use crate::pipeline::{Orchestrator, OrchestratorBuilder};
    pub use crate::registry::TaskRegistry;
    pub use crate::store::{FileResultStore, InMemoryResultStore, ResultStore, TaskRecord};
    pub use crate::utils::{generate_task_id, Timestamp};
    pub use std::sync::Arc;
}
