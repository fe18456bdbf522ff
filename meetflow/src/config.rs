//! Engine configuration, loaded from environment variables.
//!
//! Every field has a default, so an empty environment yields a working
//! configuration for the standard collaborator deployment. Values that are
//! set but cannot be parsed are reported instead of silently ignored.

use crate::core::PipelineStage;
use crate::errors::ConfigError;
use crate::invoker::{BackoffStrategy, JitterStrategy, RetryConfig, StageEndpoint};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default per-call timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 1200;

/// Default upload limit (10 GiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// Default base URL collaborators post in-stage progress to.
pub const DEFAULT_PROGRESS_URL: &str = "http://gateway:8000/progress";

/// Media suffixes accepted by default.
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 4] = [".mp3", ".mp4", ".m4a", ".wav"];

fn default_url(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::Preprocessing => "http://preprocess:8001/preprocess/",
        PipelineStage::Vad => "http://vad:8002/vad/",
        PipelineStage::Diarizing => "http://diarization:8004/diarization/",
        PipelineStage::Transcribing => "http://whisper:8003/whisper/",
        PipelineStage::Summarizing => "http://summarization:8005/summarization/",
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit newline-delimited JSON.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Upload acceptance rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    /// Maximum accepted size in bytes.
    pub max_bytes: u64,
    /// Accepted lowercase suffixes, each starting with a dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl UploadLimits {
    /// Returns true if `file_name` ends in an accepted suffix (case-insensitive).
    #[must_use]
    pub fn accepts(&self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        self.allowed_extensions
            .iter()
            .any(|ext| lower.len() > ext.len() && lower.ends_with(ext.as_str()))
    }
}

/// Configuration of the orchestration engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Root of the per-task working area.
    pub data_dir: PathBuf,
    /// One endpoint per stage, in execution order.
    pub endpoints: Vec<StageEndpoint>,
    /// Whether the voice-segmentation stage runs.
    pub vad_enabled: bool,
    /// Overall deadline for a health check.
    pub health_timeout: Duration,
    /// Upload acceptance rules.
    pub upload: UploadLimits,
    /// Logging settings.
    pub log: LogConfig,
    /// Base URL handed to the transcription collaborator for in-stage
    /// progress reports; `None` disables reporting.
    pub progress_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let timeout = Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS);
        Self {
            data_dir: PathBuf::from("/data"),
            endpoints: PipelineStage::ALL
                .into_iter()
                .map(|stage| StageEndpoint::new(stage, default_url(stage), timeout))
                .collect(),
            vad_enabled: true,
            health_timeout: Duration::from_secs(5),
            upload: UploadLimits::default(),
            log: LogConfig::default(),
            progress_url: Some(DEFAULT_PROGRESS_URL.to_string()),
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values that cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values that cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let defaults = RetryConfig::default();

        let retry = RetryConfig {
            max_attempts: env.parse("RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_delay_ms: env.parse("RETRY_BASE_DELAY_MS", defaults.base_delay_ms)?,
            max_delay_ms: env.parse("RETRY_MAX_DELAY_MS", defaults.max_delay_ms)?,
            backoff: env.parse("RETRY_BACKOFF", BackoffStrategy::default())?,
            jitter: env.parse("RETRY_JITTER", JitterStrategy::default())?,
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::invalid("RETRY_MAX_ATTEMPTS", "0", "must be at least 1"));
        }

        let request_timeout = env.parse("REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let endpoints = PipelineStage::ALL
            .into_iter()
            .map(|stage| {
                let prefix = stage.env_prefix();
                let url = env.string(&format!("{prefix}_SERVICE_URL"), default_url(stage));
                let secs = env.parse(&format!("{prefix}_TIMEOUT"), request_timeout)?;
                Ok(StageEndpoint::new(stage, url, Duration::from_secs(secs)).with_retry(retry.clone()))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let upload_defaults = UploadLimits::default();
        let allowed_extensions = match env.get("ALLOWED_EXTENSIONS") {
            Some(raw) => parse_extensions(&raw)?,
            None => upload_defaults.allowed_extensions,
        };

        Ok(Self {
            data_dir: PathBuf::from(env.string("DATA_DIR", "/data")),
            endpoints,
            vad_enabled: env.flag("VAD_ENABLED", true)?,
            health_timeout: Duration::from_secs(env.parse("HEALTH_TIMEOUT", 5)?),
            upload: UploadLimits {
                max_bytes: env.parse("MAX_UPLOAD_BYTES", upload_defaults.max_bytes)?,
                allowed_extensions,
            },
            log: LogConfig {
                filter: env.string("MEETFLOW_LOG", "info"),
                json: env.flag("MEETFLOW_LOG_JSON", false)?,
            },
            progress_url: match env.string("GATEWAY_PROGRESS_URL", DEFAULT_PROGRESS_URL) {
                off if off.eq_ignore_ascii_case("off") => None,
                url => Some(url),
            },
        })
    }

    /// Stages that run, in order.
    #[must_use]
    pub fn enabled_stages(&self) -> Vec<PipelineStage> {
        PipelineStage::ALL
            .into_iter()
            .filter(|stage| self.vad_enabled || *stage != PipelineStage::Vad)
            .collect()
    }

    /// Endpoint of a stage.
    #[must_use]
    pub fn endpoint(&self, stage: PipelineStage) -> Option<&StageEndpoint> {
        self.endpoints.iter().find(|e| e.stage == stage)
    }

    /// Endpoints of the stages that run, in order.
    #[must_use]
    pub fn enabled_endpoints(&self) -> Vec<&StageEndpoint> {
        let stages = self.enabled_stages();
        self.endpoints
            .iter()
            .filter(|e| stages.contains(&e.stage))
            .collect()
    }

    /// Sets the working-area root.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Enables or disables voice segmentation.
    #[must_use]
    pub fn with_vad(mut self, enabled: bool) -> Self {
        self.vad_enabled = enabled;
        self
    }

    /// Sets the URL of one stage.
    #[must_use]
    pub fn with_stage_url(mut self, stage: PipelineStage, url: impl Into<String>) -> Self {
        let url = url.into();
        for endpoint in self.endpoints.iter_mut().filter(|e| e.stage == stage) {
            endpoint.url.clone_from(&url);
        }
        self
    }

    /// Sets the per-call timeout of every stage.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        for endpoint in &mut self.endpoints {
            endpoint.timeout = timeout;
        }
        self
    }

    /// Sets the retry budget of every stage.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        for endpoint in &mut self.endpoints {
            endpoint.retry = retry.clone();
        }
        self
    }

    /// Sets the health check deadline.
    #[must_use]
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Sets or clears the in-stage progress base URL.
    #[must_use]
    pub fn with_progress_url(mut self, url: Option<String>) -> Self {
        self.progress_url = url;
        self
    }

    /// Progress report URL for one task, if reporting is enabled.
    #[must_use]
    pub fn task_progress_url(&self, task_id: &str) -> Option<String> {
        self.progress_url
            .as_deref()
            .map(|base| format!("{}/{task_id}", base.trim_end_matches('/')))
    }

    /// Sets the upload size limit.
    #[must_use]
    pub fn with_max_upload_bytes(mut self, max_bytes: u64) -> Self {
        self.upload.max_bytes = max_bytes;
        self
    }
}

/// Liveness URL of a collaborator: its stage URL without the route segment.
///
/// ```
/// use meetflow::config::probe_url;
///
/// assert_eq!(probe_url("http://whisper:8003/whisper/"), "http://whisper:8003/");
/// ```
#[must_use]
pub fn probe_url(stage_url: &str) -> String {
    let trimmed = stage_url.trim_end_matches('/');
    let authority_start = trimmed.find("://").map_or(0, |i| i + 3);
    match trimmed[authority_start..].rfind('/') {
        Some(i) => format!("{}/", &trimmed[..authority_start + i]),
        None => format!("{trimmed}/"),
    }
}

fn parse_extensions(raw: &str) -> Result<Vec<String>, ConfigError> {
    let extensions: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let s = s.to_ascii_lowercase();
            if s.starts_with('.') {
                s
            } else {
                format!(".{s}")
            }
        })
        .collect();
    if extensions.is_empty() {
        return Err(ConfigError::invalid("ALLOWED_EXTENSIONS", raw, "no extensions listed"));
    }
    Ok(extensions)
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(key, &raw, e.to_string())),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::invalid(key, &raw, "expected a boolean")),
            },
        }
    }
}
