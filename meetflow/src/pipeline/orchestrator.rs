//! The per-task pipeline state machine.
//!
//! A submission becomes a task record plus one spawned run. The run walks
//! the enabled stages strictly in order; after each stage boundary it
//! writes the registry first and publishes a progress event second, so an
//! observer never sees an event the registry does not yet reflect. The
//! first fatal stage result ends the run in `error`; no later stage is
//! called. Runs of different tasks are independent tokio tasks.

use crate::config::PipelineConfig;
use crate::core::{ArtifactKind, PipelineStage, ProgressEvent, Task, TaskError, TaskStatus};
use crate::errors::{MeetflowError, RegistryError, StoreError, SubmitError};
use crate::events::{telemetry, EventSink, LoggingEventSink, ProgressBus, Subscription};
use crate::health::HealthAggregator;
use crate::invoker::{StageInvoker, StageTransport};
use crate::pipeline::{stage_progress, stage_window};
use crate::registry::TaskRegistry;
use crate::stages::{
    DiarizationRequest, PreprocessRequest, SpeakerTurn, SummarizationRequest,
    TranscriptionRequest, VadRequest, VoiceSegment,
};
use crate::store::{InMemoryResultStore, ResultStore, TaskRecord};
use crate::utils::{RandomTaskIds, TaskIdGenerator};
use crate::workarea::{sanitize_file_name, WorkArea, WorkDir};
use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use serde_json::json;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// How many fresh ids a submission tries before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    config: PipelineConfig,
    transport: Arc<dyn StageTransport>,
    registry: Option<Arc<TaskRegistry>>,
    bus: Option<ProgressBus>,
    store: Option<Arc<dyn ResultStore>>,
    sink: Option<Arc<dyn EventSink>>,
    ids: Option<Arc<dyn TaskIdGenerator>>,
}

impl OrchestratorBuilder {
    /// Uses an existing registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<TaskRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Uses an existing progress bus.
    #[must_use]
    pub fn with_bus(mut self, bus: ProgressBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Sets the result store. Defaults to [`InMemoryResultStore`].
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the telemetry sink. Defaults to [`LoggingEventSink`].
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the task id source. Defaults to [`RandomTaskIds`].
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn TaskIdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Builds the orchestrator.
    #[must_use]
    pub fn build(self) -> Orchestrator {
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(LoggingEventSink));
        let invoker = StageInvoker::new(Arc::clone(&self.transport)).with_event_sink(Arc::clone(&sink));
        let health = HealthAggregator::from_config(Arc::clone(&self.transport), &self.config);
        Orchestrator {
            inner: Arc::new(Inner {
                workarea: WorkArea::new(&self.config.data_dir),
                registry: self.registry.unwrap_or_default(),
                bus: self.bus.unwrap_or_default(),
                store: self
                    .store
                    .unwrap_or_else(|| Arc::new(InMemoryResultStore::new())),
                ids: self.ids.unwrap_or_else(|| Arc::new(RandomTaskIds)),
                runs: Mutex::new(Vec::new()),
                config: self.config,
                invoker,
                health,
                sink,
            }),
        }
    }
}

struct Inner {
    config: PipelineConfig,
    registry: Arc<TaskRegistry>,
    bus: ProgressBus,
    invoker: StageInvoker,
    health: HealthAggregator,
    store: Arc<dyn ResultStore>,
    sink: Arc<dyn EventSink>,
    workarea: WorkArea,
    ids: Arc<dyn TaskIdGenerator>,
    runs: Mutex<Vec<JoinHandle<()>>>,
}

/// Drives submitted tasks through the stage pipeline.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("data_dir", &self.inner.config.data_dir)
            .field("stages", &self.inner.config.enabled_stages())
            .field("tasks", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

/// Outputs handed from one stage to the next within a run.
#[derive(Debug, Default)]
struct RunState {
    source: Option<PathBuf>,
    converted: Option<PathBuf>,
    voice_segments: Option<Vec<VoiceSegment>>,
    speaker_turns: Vec<SpeakerTurn>,
    transcript: Option<PathBuf>,
}

type Artifacts = Vec<(ArtifactKind, PathBuf)>;

// Non-finite reports land on the lower bound.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_percent(percent: f64, low: u8, high: u8) -> u8 {
    if !percent.is_finite() {
        return low;
    }
    percent.round().clamp(f64::from(low), f64::from(high)) as u8
}

fn converted(state: &RunState) -> Result<PathBuf, MeetflowError> {
    state
        .converted
        .clone()
        .ok_or(MeetflowError::MissingInput("converted audio"))
}

impl Orchestrator {
    /// Starts building an orchestrator.
    #[must_use]
    pub fn builder(config: PipelineConfig, transport: Arc<dyn StageTransport>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            transport,
            registry: None,
            bus: None,
            store: None,
            sink: None,
            ids: None,
        }
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// The task registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.inner.registry
    }

    /// The progress bus.
    #[must_use]
    pub fn bus(&self) -> &ProgressBus {
        &self.inner.bus
    }

    /// The result store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.inner.store
    }

    /// The working area.
    #[must_use]
    pub fn workarea(&self) -> &WorkArea {
        &self.inner.workarea
    }

    /// Health of every enabled collaborator.
    pub async fn health(&self) -> Vec<crate::health::ServiceStatus> {
        self.inner.health.check().await
    }

    /// Accepts a media file and starts its pipeline.
    ///
    /// Returns as soon as the upload is staged and the task is queued; the
    /// pipeline outcome is reported only through progress events and the
    /// persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Validation`] for missing or unsupported files,
    /// [`SubmitError::TooLarge`] when the upload exceeds the limit, and IO
    /// errors from staging. No task exists after an error.
    pub async fn submit<S>(&self, file_name: &str, content: S) -> Result<String, SubmitError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let inner = &self.inner;
        let limits = &inner.config.upload;
        let name = sanitize_file_name(file_name)
            .ok_or_else(|| SubmitError::validation("missing file name"))?;
        if !limits.accepts(&name) {
            return Err(SubmitError::validation(format!(
                "unsupported file type {name:?}; allowed: {}",
                limits.allowed_extensions.join(", ")
            )));
        }

        let task_id = self.reserve_id().await?;
        let staged = match inner
            .workarea
            .stage_upload(&task_id, &name, content, limits.max_bytes)
            .await
        {
            Ok(staged) => staged,
            Err(err) => {
                if let Err(cleanup) = inner.workarea.discard(&task_id).await {
                    warn!(task_id = %task_id, error = %cleanup, "Failed to remove rejected upload");
                }
                return Err(err);
            }
        };

        if let Err(err) = inner.registry.create(&task_id) {
            if let Err(cleanup) = inner.workarea.discard(&task_id).await {
                warn!(task_id = %task_id, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(err.into());
        }
        let task = inner.registry.update(&task_id, |t| {
            t.record_path(ArtifactKind::Source, &staged.path);
            t.source_sha256 = Some(staged.sha256.clone());
        })?;
        inner.bus.publish(ProgressEvent::queued(&task));
        info!(task_id = %task_id, file = %name, bytes = staged.bytes, "Task queued");

        self.spawn_run(task_id.clone());
        Ok(task_id)
    }

    /// Subscribes to a task's progress.
    ///
    /// Observers of a finished task whose channel is gone receive a single
    /// synthesized terminal event.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown tasks.
    pub async fn watch(&self, task_id: &str) -> Result<Subscription, RegistryError> {
        let inner = &self.inner;
        if !inner.registry.contains(task_id) {
            return match inner.store.get(task_id).await {
                Ok(Some(record)) => Ok(Subscription::from_snapshot(ProgressEvent::snapshot(
                    &Task::from(record),
                ))),
                Ok(None) => Err(RegistryError::not_found(task_id)),
                Err(err) => {
                    warn!(task_id = %task_id, error = %err, "Result store lookup failed");
                    Err(RegistryError::not_found(task_id))
                }
            };
        }

        // Subscribe before reading the record so a final event published in
        // between is either buffered in the subscription or already
        // reflected in the record.
        let subscription = inner.bus.subscribe(task_id);
        let task = inner.registry.get(task_id)?;
        if task.is_terminal() && !subscription.has_pending() {
            return Ok(Subscription::from_snapshot(ProgressEvent::snapshot(&task)));
        }
        Ok(subscription)
    }

    /// Current record of a task, falling back to the result store.
    ///
    /// # Errors
    ///
    /// Returns a registry `NotFound` error for unknown tasks and store
    /// errors from the fallback lookup.
    pub async fn task(&self, task_id: &str) -> Result<Task, MeetflowError> {
        match self.inner.registry.get(task_id) {
            Ok(task) => Ok(task),
            Err(RegistryError::NotFound { .. }) => match self.inner.store.get(task_id).await {
                Ok(Some(record)) => Ok(Task::from(record)),
                Ok(None) => Err(RegistryError::not_found(task_id).into()),
                Err(err) => Err(MeetflowError::Store(err)),
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Publishes progress a collaborator reported from inside its stage.
    ///
    /// `percent` is clamped into the running stage's progress window and
    /// never moves below what observers have already seen. The task record
    /// is left unchanged. Returns `None` when the stage moved on before the
    /// report could be published.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown tasks and
    /// [`RegistryError::InvalidTransition`] when no stage is running.
    pub fn report_progress(
        &self,
        task_id: &str,
        percent: f64,
    ) -> Result<Option<ProgressEvent>, RegistryError> {
        let inner = &self.inner;
        let task = inner.registry.get(task_id)?;
        let running = PipelineStage::ALL
            .into_iter()
            .find(|stage| stage.status() == task.status);
        let Some((stage, (low, high))) = running.and_then(|s| inner.window(s).map(|w| (s, w))) else {
            return Err(RegistryError::invalid_transition(
                task_id,
                task.status,
                task.status,
                "no stage is running",
            ));
        };

        let progress = clamp_percent(percent, low, high);
        let published = inner
            .bus
            .publish_within_stage(ProgressEvent::running(&task, stage, progress));
        debug!(
            task_id = %task_id,
            stage = %stage,
            progress = published.as_ref().map(|e| e.progress),
            "In-stage progress reported"
        );
        Ok(published)
    }

    /// Waits for every in-flight pipeline run to finish.
    pub async fn shutdown(&self) {
        let runs: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.runs.lock());
        if runs.is_empty() {
            return;
        }
        info!(in_flight = runs.len(), "Waiting for pipeline runs");
        for run in runs {
            if let Err(err) = run.await {
                error!(error = %err, "Pipeline run aborted");
            }
        }
    }

    async fn reserve_id(&self) -> Result<String, SubmitError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.inner.ids.next_id();
            if self.inner.registry.contains(&id) {
                continue;
            }
            match self.inner.workarea.prepare(&id).await {
                Ok(_) => return Ok(id),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(SubmitError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "could not allocate a unique task id",
        )))
    }

    fn spawn_run(&self, task_id: String) {
        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("pipeline.run", task_id = %task_id);
        let handle = tokio::spawn(async move { inner.run(task_id).await }.instrument(span));

        let mut runs = self.inner.runs.lock();
        runs.retain(|run| !run.is_finished());
        runs.push(handle);
    }
}

impl Inner {
    async fn run(&self, task_id: String) {
        let stages = self.config.enabled_stages();
        let total = stages.len();
        let mut state = RunState {
            source: self
                .registry
                .get(&task_id)
                .ok()
                .and_then(|t| t.path(ArtifactKind::Source).map(PathBuf::from)),
            ..RunState::default()
        };

        self.sink
            .emit(
                telemetry::PIPELINE_STARTED,
                Some(json!({
                    "task_id": task_id,
                    "stages": stages.iter().map(PipelineStage::as_str).collect::<Vec<_>>(),
                })),
            )
            .await;

        for (index, stage) in stages.into_iter().enumerate() {
            let task = match self.registry.update(&task_id, |t| {
                t.status = stage.status();
                t.current_stage = stage.as_str().to_string();
            }) {
                Ok(task) => task,
                Err(err) => return self.fail(&task_id, stage, &err.into()).await,
            };
            self.bus.publish(ProgressEvent::started(&task, stage));
            self.sink
                .emit(
                    telemetry::STAGE_STARTED,
                    Some(json!({"task_id": task_id, "stage": stage.as_str()})),
                )
                .await;

            let started = Instant::now();
            let artifacts = match self.execute_stage(&task_id, stage, &mut state).await {
                Ok(artifacts) => artifacts,
                Err(err) => return self.fail(&task_id, stage, &err).await,
            };

            let progress = stage_progress(index + 1, total);
            let task = match self.registry.update(&task_id, |t| {
                for (kind, path) in artifacts {
                    t.record_path(kind, path);
                }
                t.progress = t.progress.max(progress);
            }) {
                Ok(task) => task,
                Err(err) => return self.fail(&task_id, stage, &err.into()).await,
            };
            self.bus.publish(ProgressEvent::completed(&task, stage));

            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            info!(stage = %stage, progress = task.progress, duration_ms, "Stage completed");
            self.sink
                .emit(
                    telemetry::STAGE_COMPLETED,
                    Some(json!({
                        "task_id": task_id,
                        "stage": stage.as_str(),
                        "progress": task.progress,
                        "duration_ms": duration_ms,
                    })),
                )
                .await;
        }

        let task = match self.registry.update(&task_id, |t| {
            t.status = TaskStatus::Done;
            t.current_stage = TaskStatus::Done.as_str().to_string();
            t.progress = 100;
        }) {
            Ok(task) => task,
            Err(err) => {
                return self
                    .fail(&task_id, PipelineStage::Summarizing, &err.into())
                    .await
            }
        };
        self.persist(&task).await;
        self.bus.publish(ProgressEvent::done(&task));
        info!("Pipeline completed");
        self.sink
            .emit(
                telemetry::PIPELINE_COMPLETED,
                Some(json!({"task_id": task_id, "paths": task.paths})),
            )
            .await;
    }

    async fn execute_stage(
        &self,
        task_id: &str,
        stage: PipelineStage,
        state: &mut RunState,
    ) -> Result<Artifacts, MeetflowError> {
        let endpoint = self
            .config
            .endpoint(stage)
            .ok_or(MeetflowError::MissingInput("stage endpoint"))?;

        match stage {
            PipelineStage::Preprocessing => {
                let input_path = state
                    .source
                    .clone()
                    .ok_or(MeetflowError::MissingInput("source file"))?;
                let request = PreprocessRequest {
                    input_path,
                    output_dir: self.workarea.dir(task_id, WorkDir::Converted),
                };
                let response = self.invoker.call(endpoint, &request).await?;
                state.converted = Some(response.preprocessed_file_path.clone());
                Ok(vec![(ArtifactKind::Converted, response.preprocessed_file_path)])
            }
            PipelineStage::Vad => {
                let request = VadRequest {
                    input_path: converted(state)?,
                };
                let response = self.invoker.call(endpoint, &request).await?;
                let path = self.workarea.dir(task_id, WorkDir::Vad).join("segments.json");
                self.workarea.write_json(&path, &response).await?;
                state.voice_segments = Some(response.segments);
                Ok(vec![(ArtifactKind::Segments, path)])
            }
            PipelineStage::Diarizing => {
                let request = DiarizationRequest {
                    audio_path: converted(state)?,
                    segments: state.voice_segments.clone(),
                };
                let response = self.invoker.call(endpoint, &request).await?;
                let path = self
                    .workarea
                    .dir(task_id, WorkDir::Diarization)
                    .join("speakers.json");
                self.workarea.write_json(&path, &response).await?;
                state.speaker_turns = response.segments;
                Ok(vec![(ArtifactKind::Diarization, path)])
            }
            PipelineStage::Transcribing => {
                let progress_url = self.config.task_progress_url(task_id);
                let window = progress_url
                    .as_ref()
                    .and_then(|_| self.window(stage))
                    .map(|(low, high)| (f64::from(low), f64::from(high)));
                let request = TranscriptionRequest {
                    filename: converted(state)?,
                    output_dir: self.workarea.dir(task_id, WorkDir::Transcript),
                    segments: state.speaker_turns.clone(),
                    task_id: task_id.to_string(),
                    progress_url,
                    progress_min: window.map(|(low, _)| low),
                    progress_max: window.map(|(_, high)| high),
                };
                let response = self.invoker.call(endpoint, &request).await?;
                state.transcript = Some(response.transcription_file_path.clone());
                let mut artifacts = vec![(ArtifactKind::Transcript, response.transcription_file_path)];
                artifacts.extend(response.words_path.map(|p| (ArtifactKind::Words, p)));
                artifacts.extend(response.utterances_path.map(|p| (ArtifactKind::Utterances, p)));
                Ok(artifacts)
            }
            PipelineStage::Summarizing => {
                let request = SummarizationRequest {
                    transcript_path: state
                        .transcript
                        .clone()
                        .ok_or(MeetflowError::MissingInput("transcript"))?,
                    output_dir: self.workarea.dir(task_id, WorkDir::Summary),
                };
                let response = self.invoker.call(endpoint, &request).await?;
                Ok(vec![(ArtifactKind::Summary, response.summary_path)])
            }
        }
    }

    /// Progress range of `stage` among the enabled stages.
    fn window(&self, stage: PipelineStage) -> Option<(u8, u8)> {
        let stages = self.config.enabled_stages();
        let index = stages.iter().position(|s| *s == stage)?;
        Some(stage_window(index, stages.len()))
    }

    async fn fail(&self, task_id: &str, stage: PipelineStage, cause: &MeetflowError) {
        let message = cause.to_string();
        let kind = match cause {
            MeetflowError::Stage(failure) => failure.kind(),
            _ => "internal",
        };
        warn!(stage = %stage, kind, error = %message, "Stage failed");
        let failed = self.registry.update(task_id, |t| {
            t.status = TaskStatus::Error;
            t.current_stage = stage.as_str().to_string();
            t.error = Some(TaskError::new(stage.as_str(), &message));
        });

        match failed {
            Ok(task) => {
                self.persist(&task).await;
                self.bus.publish(ProgressEvent::failed(&task, stage));
            }
            Err(err) => {
                error!(error = %err, "Could not record stage failure");
                if let Ok(task) = self.registry.get(task_id) {
                    let mut event = ProgressEvent::snapshot(&task);
                    event.is_final = true;
                    self.bus.publish(event);
                }
            }
        }

        let data = json!({
            "task_id": task_id,
            "stage": stage.as_str(),
            "kind": kind,
            "error": message,
        });
        self.sink
            .emit(telemetry::STAGE_FAILED, Some(data.clone()))
            .await;
        self.sink.emit(telemetry::PIPELINE_FAILED, Some(data)).await;
    }

    async fn persist(&self, task: &Task) {
        if let Err(err) = self.store.save(&TaskRecord::from(task)).await {
            self.persist_failed(task, &err).await;
        }
    }

    async fn persist_failed(&self, task: &Task, err: &StoreError) {
        error!(error = %err, "Failed to persist task record");
        self.sink
            .emit(
                telemetry::RESULT_PERSIST_FAILED,
                Some(json!({"task_id": task.id, "error": err.to_string()})),
            )
            .await;
    }
}
