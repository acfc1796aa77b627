use std::collections::BTreeMap;

use engine::composition::{CompositionSettings, RenderState, RenderStatus};
use engine::materials::{SearchOptions, SegmentMaterials};
use engine::script::{AudioRef, GeneratedScript, ScriptRequest, SubtitleOptions, Transcription, VoiceSettings};
use engine::selection::{FinalizedMaterials, SelectedMaterial, SelectionStore};
use engine::{PipelineRun, PipelineStep, Segment, SegmentationSource, StepOutcome};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{PrepError, PrepResult};

/// What the user asks for when starting a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrepareRequest {
    #[serde(default)]
    pub subject: Option<String>,
    /// User-supplied script; skips script generation when present.
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub script_options: Option<ScriptRequest>,
    #[serde(default)]
    pub voice: VoiceSettings,
    #[serde(default)]
    pub subtitle: SubtitleOptions,
    #[serde(default)]
    pub search: Option<SearchOptions>,
}

impl PrepareRequest {
    pub fn for_subject(subject: impl Into<String>) -> Self {
        PrepareRequest {
            subject: Some(subject.into()),
            ..Default::default()
        }
    }

    pub fn with_script(script: impl Into<String>) -> Self {
        PrepareRequest {
            script: Some(script.into()),
            ..Default::default()
        }
    }

    pub fn supplied_script(&self) -> Option<&str> {
        self.script.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Reject requests that could never produce a script.
    pub fn validate(&self) -> PrepResult<()> {
        if self.supplied_script().is_some() {
            return Ok(());
        }
        match self.script_request() {
            Some(request) if !request.subject.trim().is_empty() => Ok(()),
            _ => Err(PrepError::invalid_input("a subject or a script is required")),
        }
    }

    pub fn script_request(&self) -> Option<ScriptRequest> {
        match (&self.script_options, &self.subject) {
            (Some(options), Some(subject)) if options.subject.trim().is_empty() => {
                let mut options = options.clone();
                options.subject = subject.clone();
                Some(options)
            }
            (Some(options), _) => Some(options.clone()),
            (None, Some(subject)) => Some(ScriptRequest::for_subject(subject.clone())),
            (None, None) => None,
        }
    }
}

/// Render progress mirrored into the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionState {
    #[serde(skip)]
    pub generation: u64,
    pub task_id: Option<String>,
    pub status: RenderState,
    pub progress: f32,
    pub current_step: Option<String>,
    pub result_urls: Vec<String>,
    pub error: Option<String>,
}

impl CompositionState {
    pub fn submitting(generation: u64) -> Self {
        CompositionState {
            generation,
            task_id: None,
            status: RenderState::Queued,
            progress: 0.0,
            current_step: None,
            result_urls: Vec::new(),
            error: None,
        }
    }

    pub fn update(&mut self, task_id: &str, status: &RenderStatus) {
        self.task_id = Some(task_id.to_string());
        self.status = status.status;
        self.progress = status.progress;
        self.current_step = status.current_step.clone();
        self.result_urls = status.result_urls.clone();
        self.error = status.error.clone();
    }

    pub fn fail(&mut self, error: &PrepError) {
        self.status = RenderState::Failed;
        self.error = Some(error.to_string());
    }

    pub fn is_running(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Mutable session state. Only the controller touches it, under its lock.
pub struct PipelineState {
    pub run: PipelineRun,
    pub request: Option<PrepareRequest>,
    pub script: Option<GeneratedScript>,
    pub audio: Option<AudioRef>,
    pub transcription: Option<Transcription>,
    pub segments: Vec<Segment>,
    pub segmentation: Option<SegmentationSource>,
    pub materials: BTreeMap<u32, SegmentMaterials>,
    pub selections: SelectionStore,
    pub finalized: Option<FinalizedMaterials>,
    pub composition_settings: CompositionSettings,
    pub warnings: Vec<String>,
    /// Cancelled and replaced on every reset.
    pub cancel: CancellationToken,
}

impl PipelineState {
    pub fn new(max_retries: u32) -> Self {
        PipelineState {
            run: PipelineRun::new(max_retries),
            request: None,
            script: None,
            audio: None,
            transcription: None,
            segments: Vec::new(),
            segmentation: None,
            materials: BTreeMap::new(),
            selections: SelectionStore::default(),
            finalized: None,
            composition_settings: CompositionSettings::default(),
            warnings: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Drop all run data, cancel outstanding work and open a new generation.
    pub fn reset(&mut self) {
        self.cancel.cancel();
        let mut run = self.run.clone();
        run.reset();
        *self = PipelineState::new(run.max_retries());
        self.run = run;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSnapshot {
    pub step: PipelineStep,
    pub completed: bool,
    pub in_flight: bool,
    pub blocked: bool,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub outcome: Option<StepOutcome>,
}

/// Read model of a session.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub session_id: Uuid,
    pub run_id: Uuid,
    pub generation: u64,
    pub current_step: PipelineStep,
    pub is_ready: bool,
    pub awaiting_selection: bool,
    pub steps: Vec<StepSnapshot>,
    pub script: Option<GeneratedScript>,
    pub audio: Option<AudioRef>,
    pub subtitle_markup: Option<String>,
    pub segmentation: Option<SegmentationSource>,
    pub segments: Vec<Segment>,
    pub materials: BTreeMap<u32, SegmentMaterials>,
    pub selections: Vec<SelectedMaterial>,
    pub missing_selections: Vec<u32>,
    pub finalized: Option<FinalizedMaterials>,
    pub composition: Option<CompositionState>,
    pub warnings: Vec<String>,
}

impl PipelineSnapshot {
    pub fn capture(session_id: Uuid, state: &PipelineState, composition: Option<CompositionState>) -> Self {
        let run = &state.run;
        let steps = PipelineStep::ALL[1..]
            .iter()
            .map(|&step| StepSnapshot {
                step,
                completed: run.is_completed(step),
                in_flight: run.is_in_flight(step),
                blocked: run.is_blocked(step),
                retry_count: run.retry_count(step),
                last_error: run.last_error(step).map(str::to_string),
                outcome: run.outcome(step),
            })
            .collect();

        PipelineSnapshot {
            session_id,
            run_id: run.run_id(),
            generation: run.generation(),
            current_step: run.current_step(),
            is_ready: run.is_ready(),
            awaiting_selection: run.awaiting_selection(),
            steps,
            script: state.script.clone(),
            audio: state.audio.clone(),
            subtitle_markup: state
                .transcription
                .as_ref()
                .and_then(|t| t.subtitle_markup.clone()),
            segmentation: state.segmentation,
            segments: state.segments.clone(),
            materials: state.materials.clone(),
            selections: state.selections.selections().cloned().collect(),
            missing_selections: state.selections.missing(),
            finalized: state.finalized.clone(),
            composition,
            warnings: state.warnings.clone(),
        }
    }

    pub fn step(&self, step: PipelineStep) -> Option<&StepSnapshot> {
        self.steps.iter().find(|s| s.step == step)
    }
}
