//! Session orchestration.
//!
//! A [`PipelineController`] owns one [`PipelineRun`] and drives its automatic
//! steps. Every state change sends a wake-up to a scheduler task, which asks
//! the run for its runnable step and starts it at most once. Step tasks are
//! tagged with the generation they were started in; results arriving after a
//! reset are dropped.

pub mod events;
pub mod state;
pub mod steps;

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::Utc;
use engine::composition::{CompositionPayload, CompositionSettings, RenderStatus};
use engine::materials::MaterialCandidate;
use engine::script::GeneratedScript;
use engine::selection::{FinalizedMaterials, SelectionStore};
use engine::{EngineError, PipelineStep, StepOutcome};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DaemonConfig;
use crate::db::{CompositionRecord, Database};
use crate::error::{PrepError, PrepResult};
use crate::http::ServiceClient;
use crate::keywords::{extractor_for, KeywordExtractor};
use crate::llm::{KeywordModel, LlmClient, ScriptGenerator};
use crate::render::{CompositionRequestor, CompositionResult, HttpRenderBackend, RenderBackend};
use crate::speech::{SpeechClient, Transcriber, VoiceSynthesizer};
use crate::stock::{ImageSearch, StockClient, VideoSearch};

pub use events::PipelineEvent;
pub use state::{CompositionState, PipelineSnapshot, PipelineState, PrepareRequest, StepSnapshot};
use steps::{StepInput, StepOutput, StepRunner};

const EVENT_CAPACITY: usize = 256;

/// External collaborators a session talks to.
#[derive(Clone)]
pub struct Providers {
    pub scripts: Arc<dyn ScriptGenerator>,
    pub voice: Arc<dyn VoiceSynthesizer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub keywords: Arc<dyn KeywordExtractor>,
    pub images: Arc<dyn ImageSearch>,
    pub videos: Arc<dyn VideoSearch>,
    pub render: Arc<dyn RenderBackend>,
}

impl Providers {
    /// HTTP clients for the collaborator service and the render backend.
    pub fn http(config: &DaemonConfig) -> PrepResult<Self> {
        let collaborator = ServiceClient::new(&config.collaborator_url, config.provider_timeout)?;
        let render = ServiceClient::new(&config.render_url, config.provider_timeout)?;

        let llm = Arc::new(LlmClient::new(collaborator.clone()));
        let speech = Arc::new(SpeechClient::new(collaborator.clone()));
        let stock = Arc::new(StockClient::new(collaborator));
        let model: Arc<dyn KeywordModel> = llm.clone();

        Ok(Providers {
            scripts: llm,
            voice: speech.clone(),
            transcriber: speech,
            keywords: extractor_for(
                config.pipeline.keyword_backend,
                Some(model),
                config.pipeline.keywords_per_segment,
            ),
            images: stock.clone(),
            videos: stock,
            render: Arc::new(HttpRenderBackend::new(render)),
        })
    }
}

pub struct PipelineController {
    session_id: Uuid,
    state: Mutex<PipelineState>,
    composition: std::sync::Mutex<Option<CompositionState>>,
    runner: StepRunner,
    requestor: CompositionRequestor,
    retry_backoff: Duration,
    events: broadcast::Sender<PipelineEvent>,
    wake: mpsc::UnboundedSender<()>,
    db: Option<Arc<Database>>,
}

impl PipelineController {
    /// Create a controller and its scheduler task.
    pub fn spawn(
        session_id: Uuid,
        providers: Providers,
        config: &DaemonConfig,
        db: Option<Arc<Database>>,
    ) -> Arc<Self> {
        let (wake, mut wake_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let controller = Arc::new(PipelineController {
            session_id,
            state: Mutex::new(PipelineState::new(config.pipeline.max_retries)),
            composition: std::sync::Mutex::new(None),
            requestor: CompositionRequestor::new(Arc::clone(&providers.render), &config.compose),
            runner: StepRunner::new(providers, config.pipeline.clone()),
            retry_backoff: config.pipeline.retry_backoff,
            events,
            wake,
            db,
        });

        let weak = Arc::downgrade(&controller);
        tokio::spawn(async move {
            while wake_rx.recv().await.is_some() {
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.pump().await;
            }
            debug!(session_id = %session_id, "Pipeline scheduler stopped");
        });

        controller
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> PipelineSnapshot {
        let state = self.state.lock().await;
        self.capture(&state)
    }

    /// Begin a run. A supplied script completes the script step immediately.
    pub async fn start(&self, request: PrepareRequest) -> PrepResult<PipelineSnapshot> {
        request.validate()?;
        let mut state = self.state.lock().await;
        state.run.start()?;
        let generation = state.run.generation();
        self.emit(PipelineEvent::Started {
            session_id: self.session_id,
            generation,
        });

        if let Some(script) = request.supplied_script() {
            state.run.begin_step(PipelineStep::Script)?;
            state.run.advance_step(PipelineStep::Script, StepOutcome::Ok)?;
            state.script = Some(GeneratedScript::supplied(script));
            self.emit(PipelineEvent::StepCompleted {
                session_id: self.session_id,
                generation,
                step: PipelineStep::Script,
                outcome: StepOutcome::Ok,
            });
        }
        state.request = Some(request);
        info!(
            session_id = %self.session_id,
            run_id = %state.run.run_id(),
            generation,
            "Pipeline run started"
        );

        let snapshot = self.capture(&state);
        drop(state);
        self.notify();
        Ok(snapshot)
    }

    /// Clear a step's retry budget, blocked flag and error, then let the scheduler pick it up again.
    pub async fn retry_step(&self, step: PipelineStep) -> PrepResult<PipelineSnapshot> {
        let mut state = self.state.lock().await;
        state.run.retry_step(step)?;
        info!(session_id = %self.session_id, step = %step, "Step retry requested");
        self.emit(PipelineEvent::StepRetried {
            session_id: self.session_id,
            generation: state.run.generation(),
            step,
        });
        let snapshot = self.capture(&state);
        drop(state);
        self.notify();
        Ok(snapshot)
    }

    /// Discard the run, cancel in-flight steps and composition polling, and open a new generation.
    pub async fn reset(&self) -> PipelineSnapshot {
        let mut state = self.state.lock().await;
        state.reset();
        *self.composition_guard() = None;
        let generation = state.run.generation();
        info!(session_id = %self.session_id, generation, "Pipeline reset");
        self.emit(PipelineEvent::Reset {
            session_id: self.session_id,
            generation,
        });
        self.capture(&state)
    }

    /// Bind a material to a segment. The latest selection wins.
    pub async fn select(&self, segment_id: u32, material: MaterialCandidate) -> PrepResult<PipelineSnapshot> {
        let mut state = self.state.lock().await;
        if state.run.is_ready() {
            return Err(EngineError::invalid_transition(PipelineStep::Selection, "run already finalized").into());
        }
        let kind = material.kind();
        state.selections.select(segment_id, kind, material)?;
        let missing = state.selections.missing().len();
        debug!(session_id = %self.session_id, segment_id, kind = kind.as_str(), missing, "Selection updated");
        self.emit(PipelineEvent::SelectionChanged {
            session_id: self.session_id,
            generation: state.run.generation(),
            segment_id,
            missing,
        });
        Ok(self.capture(&state))
    }

    /// Project the selections into ordered material lists and mark the run ready.
    pub async fn finalize(&self) -> PrepResult<FinalizedMaterials> {
        let mut state = self.state.lock().await;
        if !state.run.awaiting_selection() {
            return Err(EngineError::invalid_transition(
                PipelineStep::Finalize,
                if state.run.is_ready() {
                    "already finalized"
                } else {
                    "material search has not completed"
                },
            )
            .into());
        }
        let finalized = state.selections.finalize()?;
        state.run.finalize()?;
        state.finalized = Some(finalized.clone());
        info!(
            session_id = %self.session_id,
            video_clips = finalized.video_clips.len(),
            image_assets = finalized.image_assets.len(),
            "Materials finalized"
        );
        self.emit(PipelineEvent::Finalized {
            session_id: self.session_id,
            generation: state.run.generation(),
            video_clips: finalized.video_clips.len(),
            image_assets: finalized.image_assets.len(),
        });
        Ok(finalized)
    }

    /// Submit the finalized run for rendering and poll it in the background.
    pub async fn compose(
        self: &Arc<Self>,
        settings: CompositionSettings,
    ) -> PrepResult<JoinHandle<PrepResult<CompositionResult>>> {
        let mut state = self.state.lock().await;
        if !state.run.is_ready() {
            return Err(EngineError::invalid_transition(PipelineStep::Finalize, "run is not finalized").into());
        }
        let (Some(script), Some(audio), Some(finalized)) = (&state.script, &state.audio, &state.finalized) else {
            return Err(PrepError::invalid_input("finalized run is missing its script or audio"));
        };
        let payload = CompositionPayload::build(&script.text, audio, &state.segments, finalized, &settings)?;

        let generation = state.run.generation();
        let run_id = state.run.run_id();
        let cancel = state.cancel.clone();
        {
            let mut composition = self.composition_guard();
            if composition.as_ref().is_some_and(CompositionState::is_running) {
                return Err(PrepError::invalid_input("a composition is already running"));
            }
            *composition = Some(CompositionState::submitting(generation));
        }
        state.composition_settings = settings;
        drop(state);

        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            this.run_composition(payload, generation, run_id, cancel).await
        }))
    }

    async fn run_composition(
        &self,
        payload: CompositionPayload,
        generation: u64,
        run_id: Uuid,
        cancel: CancellationToken,
    ) -> PrepResult<CompositionResult> {
        let result = self
            .requestor
            .compose(&payload, &cancel, |task_id, status| {
                self.record_render_status(generation, run_id, task_id, status)
            })
            .await;

        match &result {
            Ok(done) => {
                info!(session_id = %self.session_id, task_id = %done.task_id, "Composition ready");
                self.emit(PipelineEvent::CompositionCompleted {
                    session_id: self.session_id,
                    generation,
                    task_id: done.task_id.clone(),
                    result_urls: done.result_urls.clone(),
                });
            }
            Err(e @ PrepError::Cancelled { task_id }) => {
                debug!(session_id = %self.session_id, generation, task_id = ?task_id, "Composition abandoned by reset");
                if let (Some(db), Some(task_id)) = (&self.db, task_id) {
                    if let Err(db_err) = db.mark_composition_failed(task_id, &e.to_string()) {
                        warn!(task_id = %task_id, error = %db_err, "Failed to persist composition cancellation");
                    }
                }
            }
            Err(e) => {
                let task_id = match e {
                    PrepError::Composition { task_id, .. }
                    | PrepError::CompositionTimeout { task_id, .. } => Some(task_id.clone()),
                    _ => None,
                };
                warn!(session_id = %self.session_id, task_id = ?task_id, error = %e, "Composition failed");
                if let Some(composition) = self.composition_guard().as_mut() {
                    if composition.generation == generation {
                        composition.fail(e);
                    }
                }
                if let (Some(db), Some(task_id)) = (&self.db, &task_id) {
                    if let Err(db_err) = db.mark_composition_failed(task_id, &e.to_string()) {
                        warn!(task_id = %task_id, error = %db_err, "Failed to persist composition failure");
                    }
                }
                self.emit(PipelineEvent::CompositionFailed {
                    session_id: self.session_id,
                    generation,
                    task_id,
                    error: e.to_string(),
                });
            }
        }
        result
    }

    fn record_render_status(&self, generation: u64, run_id: Uuid, task_id: &str, status: &RenderStatus) {
        {
            let mut composition = self.composition_guard();
            match composition.as_mut() {
                Some(current) if current.generation == generation => current.update(task_id, status),
                _ => {
                    debug!(task_id, generation, "Dropping render status for a stale run");
                    return;
                }
            }
        }

        if let Some(db) = &self.db {
            let existing = db.get_composition(task_id).ok().flatten();
            let mut record = existing.unwrap_or_else(|| CompositionRecord::new(task_id, self.session_id, run_id));
            record.status = status.status;
            record.progress = status.progress;
            record.current_step = status.current_step.clone();
            record.result_urls = status.result_urls.clone();
            record.error = status.error.clone();
            record.updated_at = Utc::now();
            if let Err(e) = db.upsert_composition(&record) {
                warn!(task_id, error = %e, "Failed to persist composition status");
            }
        }

        self.emit(PipelineEvent::CompositionProgress {
            session_id: self.session_id,
            generation,
            task_id: task_id.to_string(),
            status: status.status,
            progress: status.progress,
        });
    }

    /// Start the runnable step, if any. Safe to call any number of times.
    async fn pump(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        let Some(step) = state.run.runnable_step() else {
            return;
        };
        if let Err(e) = state.run.begin_step(step) {
            warn!(session_id = %self.session_id, step = %step, error = %e, "Step could not begin");
            return;
        }

        let generation = state.run.generation();
        let attempt = state.run.retry_count(step) + 1;
        let input = StepInput {
            request: state.request.clone().unwrap_or_default(),
            script: state.script.as_ref().map(|s| s.text.clone()),
            audio: state.audio.clone(),
            segments: state.segments.clone(),
        };
        let cancel = state.cancel.clone();
        info!(session_id = %self.session_id, step = %step, attempt, generation, "Step started");
        self.emit(PipelineEvent::StepStarted {
            session_id: self.session_id,
            generation,
            step,
            attempt,
        });
        drop(state);

        let delay = if attempt > 1 { self.retry_backoff } else { Duration::ZERO };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let work = async {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                this.runner.run(step, input).await
            };
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(session_id = %this.session_id, step = %step, generation, "Step cancelled by reset");
                    return;
                }
                result = work => result,
            };
            this.apply(generation, step, result).await;
            this.notify();
        });
    }

    /// Fold a step result into the run, unless the run was reset since the step began.
    async fn apply(&self, generation: u64, step: PipelineStep, result: PrepResult<StepOutput>) {
        let mut state = self.state.lock().await;
        if state.run.generation() != generation {
            debug!(
                session_id = %self.session_id,
                step = %step,
                stale_generation = generation,
                generation = state.run.generation(),
                "Discarding stale step result"
            );
            return;
        }

        match result {
            Ok(output) => {
                let outcome = output.outcome();
                if let Err(e) = state.run.advance_step(step, outcome) {
                    warn!(session_id = %self.session_id, step = %step, error = %e, "Step result rejected");
                    return;
                }
                store_output(&mut state, output);
                info!(session_id = %self.session_id, step = %step, outcome = ?outcome, "Step completed");
                self.emit(PipelineEvent::StepCompleted {
                    session_id: self.session_id,
                    generation,
                    step,
                    outcome,
                });
                if step == PipelineStep::MaterialSearch {
                    self.emit(PipelineEvent::AwaitingSelection {
                        session_id: self.session_id,
                        generation,
                        segment_count: state.segments.len(),
                    });
                }
            }
            Err(e) => {
                let message = e.to_string();
                let recorded = if e.is_invalid_input() {
                    state
                        .run
                        .block_step(step, message.clone())
                        .map(|_| StepOutcome::Blocked)
                } else {
                    state.run.record_failure(step, message.clone())
                };
                let outcome = match recorded {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(session_id = %self.session_id, step = %step, error = %err, "Step failure rejected");
                        return;
                    }
                };
                let retry_count = state.run.retry_count(step);
                warn!(
                    session_id = %self.session_id,
                    step = %step,
                    retry_count,
                    outcome = ?outcome,
                    error = %message,
                    "Step failed"
                );
                self.emit(PipelineEvent::StepFailed {
                    session_id: self.session_id,
                    generation,
                    step,
                    outcome,
                    retry_count,
                    error: message,
                });
            }
        }
    }

    fn capture(&self, state: &PipelineState) -> PipelineSnapshot {
        PipelineSnapshot::capture(self.session_id, state, self.composition_guard().clone())
    }

    fn composition_guard(&self) -> std::sync::MutexGuard<'_, Option<CompositionState>> {
        self.composition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn notify(&self) {
        let _ = self.wake.send(());
    }
}

fn store_output(state: &mut PipelineState, output: StepOutput) {
    match output {
        StepOutput::Script(script) => state.script = Some(script),
        StepOutput::Voice(audio) => state.audio = Some(audio),
        StepOutput::Subtitle {
            transcription,
            segments,
            source,
            warning,
        } => {
            state.transcription = transcription;
            state.segments = segments;
            state.segmentation = Some(source);
            state.warnings.extend(warning);
        }
        StepOutput::Materials {
            segments,
            materials,
            warnings,
        } => {
            state.selections = SelectionStore::new(&segments);
            state.segments = segments;
            state.materials = materials;
            state.warnings.extend(warnings);
        }
    }
}
