//! Canned collaborator behavior and configuration for pipeline tests.

use super::mocks::{ScriptedReply, ScriptedTransport};
use crate::config::{probe_url, PipelineConfig};
use crate::core::PipelineStage;
use crate::invoker::RetryConfig;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A config rooted at `data_dir` with short timeouts and millisecond
/// backoff, suitable for driving real runs against a scripted transport.
#[must_use]
pub fn test_config(data_dir: impl Into<PathBuf>) -> PipelineConfig {
    PipelineConfig::default()
        .with_data_dir(data_dir)
        .with_timeout(Duration::from_millis(200))
        .with_retry(RetryConfig::new().with_max_attempts(3).with_base_delay_ms(1))
        .with_health_timeout(Duration::from_millis(200))
}

fn output_file(request: &Value, key: &str, file: &str) -> String {
    let dir = request[key].as_str().unwrap_or("/tmp");
    let path = Path::new(dir).join(file);
    // Placeholder content so downloads of the artifact have something to serve.
    let _ = std::fs::write(&path, format!("{file}\n"));
    path.to_string_lossy().into_owned()
}

/// A successful reply for `stage` derived from the request body.
///
/// Output files are written under the request's output directory when it
/// exists.
#[must_use]
pub fn healthy_reply(stage: PipelineStage) -> ScriptedReply {
    match stage {
        PipelineStage::Preprocessing => ScriptedReply::respond(|req| {
            json!([{"preprocessed_file_path": output_file(req, "output_dir", "audio.wav")}])
        }),
        PipelineStage::Vad => ScriptedReply::json(json!({
            "segments": [
                {"chunk_id": 0, "start": 0.0, "end": 12.5},
                {"chunk_id": 1, "start": 14.0, "end": 31.2},
            ]
        })),
        PipelineStage::Diarizing => ScriptedReply::json(json!({
            "segments": [
                {"start": 0.0, "end": 12.5, "speaker": "SPEAKER_00"},
                {"start": 14.0, "end": 31.2, "speaker": "SPEAKER_01"},
            ]
        })),
        PipelineStage::Transcribing => ScriptedReply::respond(|req| {
            json!({
                "transcription_file_path": output_file(req, "output_dir", "transcript.txt"),
                "word_segmnts_path": output_file(req, "output_dir", "words.json"),
                "utterances_path": output_file(req, "output_dir", "utterances.json"),
            })
        }),
        PipelineStage::Summarizing => ScriptedReply::respond(|req| {
            json!({"summary_path": output_file(req, "output_dir", "summary.md")})
        }),
    }
}

/// Scripts every enabled collaborator in `config` to succeed and answer
/// its liveness probe.
pub fn script_healthy_pipeline(transport: &ScriptedTransport, config: &PipelineConfig) {
    for endpoint in config.enabled_endpoints() {
        transport.set_default(&endpoint.url, healthy_reply(endpoint.stage));
        transport.set_default(&probe_url(&endpoint.url), ScriptedReply::status(200, "ok"));
    }
}
