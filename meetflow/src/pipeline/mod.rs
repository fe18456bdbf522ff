//! Pipeline orchestration.
//!
//! [`Orchestrator`] owns task submission and runs each task's stages in
//! order, recording every transition in the registry and on the progress
//! bus and persisting the final record.

mod orchestrator;
mod progress;


pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use progress::{stage_progress, stage_window};
