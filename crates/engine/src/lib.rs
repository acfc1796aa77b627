pub mod composition;
pub mod error;
pub mod keywords;
pub mod materials;
pub mod pipeline;
pub mod script;
pub mod segment;
pub mod selection;

pub use error::{EngineError, EngineResult};
pub use pipeline::{PipelineRun, PipelineStep, StepOutcome, MAX_RETRIES};
pub use segment::{Segment, SegmentationSource, TranscriptSegment};
