use engine::composition::RenderState;
use engine::{PipelineStep, StepOutcome};
use serde::Serialize;
use uuid::Uuid;

/// Everything observable that happens to a pipeline session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Started {
        session_id: Uuid,
        generation: u64,
    },
    StepStarted {
        session_id: Uuid,
        generation: u64,
        step: PipelineStep,
        attempt: u32,
    },
    StepCompleted {
        session_id: Uuid,
        generation: u64,
        step: PipelineStep,
        outcome: StepOutcome,
    },
    StepFailed {
        session_id: Uuid,
        generation: u64,
        step: PipelineStep,
        outcome: StepOutcome,
        retry_count: u32,
        error: String,
    },
    StepRetried {
        session_id: Uuid,
        generation: u64,
        step: PipelineStep,
    },
    AwaitingSelection {
        session_id: Uuid,
        generation: u64,
        segment_count: usize,
    },
    SelectionChanged {
        session_id: Uuid,
        generation: u64,
        segment_id: u32,
        missing: usize,
    },
    Finalized {
        session_id: Uuid,
        generation: u64,
        video_clips: usize,
        image_assets: usize,
    },
    Reset {
        session_id: Uuid,
        generation: u64,
    },
    CompositionProgress {
        session_id: Uuid,
        generation: u64,
        task_id: String,
        status: RenderState,
        progress: f32,
    },
    CompositionCompleted {
        session_id: Uuid,
        generation: u64,
        task_id: String,
        result_urls: Vec<String>,
    },
    CompositionFailed {
        session_id: Uuid,
        generation: u64,
        task_id: Option<String>,
        error: String,
    },
}

impl PipelineEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::Started { .. } => "started",
            PipelineEvent::StepStarted { .. } => "step_started",
            PipelineEvent::StepCompleted { .. } => "step_completed",
            PipelineEvent::StepFailed { .. } => "step_failed",
            PipelineEvent::StepRetried { .. } => "step_retried",
            PipelineEvent::AwaitingSelection { .. } => "awaiting_selection",
            PipelineEvent::SelectionChanged { .. } => "selection_changed",
            PipelineEvent::Finalized { .. } => "finalized",
            PipelineEvent::Reset { .. } => "reset",
            PipelineEvent::CompositionProgress { .. } => "composition_progress",
            PipelineEvent::CompositionCompleted { .. } => "composition_completed",
            PipelineEvent::CompositionFailed { .. } => "composition_failed",
        }
    }
}
