//! Test doubles for driving pipelines without real collaborators.
//!
//! [`ScriptedTransport`] stands in for the HTTP transport; the fixtures
//! script a fully healthy set of collaborators on top of it.

mod fixtures;
mod mocks;

pub use fixtures::{healthy_reply, script_healthy_pipeline, test_config};
pub use mocks::{Method, RecordedCall, ScriptedReply, ScriptedTransport};
