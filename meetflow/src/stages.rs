//! Typed request and response payloads, one pair per pipeline stage.
//!
//! Responses are decoded and validated at the invoker boundary; a 2xx body
//! that does not fit its stage's shape never reaches the orchestrator.

use crate::core::PipelineStage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A request body for one stage collaborator.
pub trait StageRequest: Serialize + Send + Sync {
    /// The stage this request drives.
    const STAGE: PipelineStage;

    /// The decoded reply.
    type Response: StageResponse;
}

/// A decoded stage reply.
pub trait StageResponse: DeserializeOwned + Send {
    /// Checks semantic constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

fn require_path(field: &str, path: &Path) -> Result<(), String> {
    if path.as_os_str().is_empty() {
        Err(format!("{field} is empty"))
    } else {
        Ok(())
    }
}

fn require_ordered(what: &str, index: usize, start: f64, end: f64) -> Result<(), String> {
    if start.is_finite() && end.is_finite() && start >= 0.0 && end >= start {
        Ok(())
    } else {
        Err(format!("{what} {index} has invalid bounds [{start}, {end}]"))
    }
}

// ---------------------------------------------------------------------------
// preprocess
// ---------------------------------------------------------------------------

/// Audio normalization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreprocessRequest {
    /// Uploaded media file.
    pub input_path: PathBuf,
    /// Directory for the converted file.
    pub output_dir: PathBuf,
}

impl StageRequest for PreprocessRequest {
    const STAGE: PipelineStage = PipelineStage::Preprocessing;
    type Response = PreprocessResponse;
}

#[derive(Debug, Deserialize)]
struct PreprocessOutput {
    preprocessed_file_path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PreprocessReply {
    Many(Vec<PreprocessOutput>),
    One(PreprocessOutput),
}

/// Audio normalization result.
///
/// The collaborator answers with a one-element list; a bare object is
/// accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "PreprocessReply")]
pub struct PreprocessResponse {
    /// Normalized audio file.
    pub preprocessed_file_path: PathBuf,
}

impl TryFrom<PreprocessReply> for PreprocessResponse {
    type Error = String;

    fn try_from(reply: PreprocessReply) -> Result<Self, Self::Error> {
        let output = match reply {
            PreprocessReply::One(output) => output,
            PreprocessReply::Many(outputs) => outputs
                .into_iter()
                .next()
                .ok_or_else(|| "empty preprocess result list".to_string())?,
        };
        Ok(Self {
            preprocessed_file_path: output.preprocessed_file_path,
        })
    }
}

impl StageResponse for PreprocessResponse {
    fn validate(&self) -> Result<(), String> {
        require_path("preprocessed_file_path", &self.preprocessed_file_path)
    }
}

// ---------------------------------------------------------------------------
// vad
// ---------------------------------------------------------------------------

/// Voice-activity segmentation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VadRequest {
    /// Normalized audio file.
    pub input_path: PathBuf,
}

impl StageRequest for VadRequest {
    const STAGE: PipelineStage = PipelineStage::Vad;
    type Response = VadResponse;
}

/// One detected speech region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSegment {
    /// Sequential chunk index.
    pub chunk_id: u32,
    /// Start in seconds.
    pub start: f64,
    /// End in seconds.
    pub end: f64,
}

/// Voice-activity segmentation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VadResponse {
    /// Speech regions in order.
    pub segments: Vec<VoiceSegment>,
}

impl StageResponse for VadResponse {
    fn validate(&self) -> Result<(), String> {
        self.segments
            .iter()
            .enumerate()
            .try_for_each(|(i, s)| require_ordered("segment", i, s.start, s.end))
    }
}

// ---------------------------------------------------------------------------
// diarization
// ---------------------------------------------------------------------------

/// Speaker diarization request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiarizationRequest {
    /// Normalized audio file.
    pub audio_path: PathBuf,
    /// Speech regions, when segmentation ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<VoiceSegment>>,
}

impl StageRequest for DiarizationRequest {
    const STAGE: PipelineStage = PipelineStage::Diarizing;
    type Response = DiarizationResponse;
}

/// One speaker turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    /// Start in seconds.
    pub start: f64,
    /// End in seconds.
    pub end: f64,
    /// Speaker label, e.g. `SPEAKER_01`.
    pub speaker: String,
}

/// Speaker diarization result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizationResponse {
    /// Speaker turns in order.
    pub segments: Vec<SpeakerTurn>,
}

impl StageResponse for DiarizationResponse {
    fn validate(&self) -> Result<(), String> {
        self.segments
            .iter()
            .enumerate()
            .try_for_each(|(i, s)| require_ordered("speaker turn", i, s.start, s.end))
    }
}

// ---------------------------------------------------------------------------
// transcription
// ---------------------------------------------------------------------------

/// Speech-to-text request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptionRequest {
    /// Normalized audio file.
    pub filename: PathBuf,
    /// Directory for transcript outputs.
    pub output_dir: PathBuf,
    /// Speaker turns from diarization.
    pub segments: Vec<SpeakerTurn>,
    /// Owning task.
    pub task_id: String,
    /// Where the collaborator may post in-stage progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_url: Option<String>,
    /// Task progress when the stage starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_min: Option<f64>,
    /// Task progress once the stage completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_max: Option<f64>,
}

impl StageRequest for TranscriptionRequest {
    const STAGE: PipelineStage = PipelineStage::Transcribing;
    type Response = TranscriptionResponse;
}

/// Speech-to-text result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    /// Plain-text transcript.
    pub transcription_file_path: PathBuf,
    /// Word-level timings.
    #[serde(
        default,
        rename = "word_segmnts_path",
        alias = "word_segments_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub words_path: Option<PathBuf>,
    /// Speaker-attributed utterances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utterances_path: Option<PathBuf>,
}

impl StageResponse for TranscriptionResponse {
    fn validate(&self) -> Result<(), String> {
        require_path("transcription_file_path", &self.transcription_file_path)
    }
}

// ---------------------------------------------------------------------------
// summarization
// ---------------------------------------------------------------------------

/// Summarization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummarizationRequest {
    /// Transcript to summarize.
    pub transcript_path: PathBuf,
    /// Directory for the summary.
    pub output_dir: PathBuf,
}

impl StageRequest for SummarizationRequest {
    const STAGE: PipelineStage = PipelineStage::Summarizing;
    type Response = SummarizationResponse;
}

/// Summarization result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizationResponse {
    /// Generated summary file.
    pub summary_path: PathBuf,
}

impl StageResponse for SummarizationResponse {
    fn validate(&self) -> Result<(), String> {
        require_path("summary_path", &self.summary_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_preprocess_accepts_list_and_object() {
        let list: PreprocessResponse =
            serde_json::from_value(json!([{"preprocessed_file_path": "/d/t/converted/a.opus"}]))
                .unwrap();
        let object: PreprocessResponse =
            serde_json::from_value(json!({"preprocessed_file_path": "/d/t/converted/a.opus"}))
                .unwrap();
        assert_eq!(list, object);
        assert!(list.validate().is_ok());
    }

    #[test]
    fn test_preprocess_rejects_empty_list() {
        assert!(serde_json::from_value::<PreprocessResponse>(json!([])).is_err());
        assert!(serde_json::from_value::<PreprocessResponse>(json!({"path": "x"})).is_err());
    }

    #[test]
    fn test_diarization_request_omits_missing_segments() {
        let request = DiarizationRequest {
            audio_path: "/d/t/converted/a.opus".into(),
            segments: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"audio_path": "/d/t/converted/a.opus"})
        );
    }

    #[test]
    fn test_transcription_optional_outputs() {
        let minimal: TranscriptionResponse =
            serde_json::from_value(json!({"transcription_file_path": "/d/t/transcript/a.txt"}))
                .unwrap();
        assert!(minimal.words_path.is_none());

        let full: TranscriptionResponse = serde_json::from_value(json!({
            "transcription_file_path": "/d/t/transcript/a.txt",
            "word_segmnts_path": "/d/t/transcript/words.json",
            "utterances_path": "/d/t/transcript/utt.json"
        }))
        .unwrap();
        assert_eq!(
            full.words_path.as_deref(),
            Some(Path::new("/d/t/transcript/words.json"))
        );
    }

    #[test]
    fn test_validation_catches_empty_paths_and_bad_bounds() {
        let summary = SummarizationResponse {
            summary_path: PathBuf::new(),
        };
        assert_eq!(summary.validate().unwrap_err(), "summary_path is empty");

        let vad = VadResponse {
            segments: vec![VoiceSegment {
                chunk_id: 0,
                start: 2.0,
                end: 1.0,
            }],
        };
        assert!(vad.validate().is_err());

        let diar = DiarizationResponse {
            segments: vec![SpeakerTurn {
                start: 0.0,
                end: 3.25,
                speaker: "SPEAKER_01".into(),
            }],
        };
        assert!(diar.validate().is_ok());
    }
}
