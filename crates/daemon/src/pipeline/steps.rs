//! One async executor per automatic step.
//!
//! Executors only read their inputs and return a [`StepOutput`]; the
//! controller decides what the result means for the run.

use std::collections::BTreeMap;
use std::sync::Arc;

use engine::materials::{SearchOptions, SegmentMaterials};
use engine::script::{AudioRef, GeneratedScript, Transcription};
use engine::segment::{build_segments, distribute_text};
use engine::{PipelineStep, Segment, SegmentationSource, StepOutcome};
use tracing::{info, warn};

use super::state::PrepareRequest;
use super::Providers;
use crate::config::PipelineConfig;
use crate::error::{PrepError, PrepResult};
use crate::keywords::KeywordContext;
use crate::materials::MaterialSearch;

/// Copies of the state a step reads.
#[derive(Debug, Clone)]
pub struct StepInput {
    pub request: PrepareRequest,
    pub script: Option<String>,
    pub audio: Option<AudioRef>,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
pub enum StepOutput {
    Script(GeneratedScript),
    Voice(AudioRef),
    Subtitle {
        transcription: Option<Transcription>,
        segments: Vec<Segment>,
        source: SegmentationSource,
        warning: Option<String>,
    },
    Materials {
        segments: Vec<Segment>,
        materials: BTreeMap<u32, SegmentMaterials>,
        warnings: Vec<String>,
    },
}

impl StepOutput {
    pub fn outcome(&self) -> StepOutcome {
        let degraded = match self {
            StepOutput::Subtitle { warning, .. } => warning.is_some(),
            StepOutput::Materials { warnings, .. } => !warnings.is_empty(),
            StepOutput::Script(_) | StepOutput::Voice(_) => false,
        };
        if degraded {
            StepOutcome::RecoverableDegraded
        } else {
            StepOutcome::Ok
        }
    }
}

#[derive(Clone)]
pub struct StepRunner {
    providers: Providers,
    config: PipelineConfig,
}

impl StepRunner {
    pub fn new(providers: Providers, config: PipelineConfig) -> Self {
        StepRunner { providers, config }
    }

    pub async fn run(&self, step: PipelineStep, input: StepInput) -> PrepResult<StepOutput> {
        match step {
            PipelineStep::Script => self.script(&input).await,
            PipelineStep::Voice => self.voice(&input).await,
            PipelineStep::Subtitle => self.subtitle(&input).await,
            PipelineStep::MaterialSearch => self.material_search(input).await,
            other => Err(PrepError::invalid_input(format!("{} is not an automatic step", other))),
        }
    }

    async fn script(&self, input: &StepInput) -> PrepResult<StepOutput> {
        if let Some(script) = input.request.supplied_script() {
            return Ok(StepOutput::Script(GeneratedScript::supplied(script)));
        }
        let request = input
            .request
            .script_request()
            .ok_or_else(|| PrepError::invalid_input("a subject or a script is required"))?;
        let script = self.providers.scripts.generate_script(&request).await?;
        if script.text.trim().is_empty() {
            return Err(PrepError::provider("script_generation", "returned an empty script"));
        }
        info!(chars = script.text.chars().count(), "Script generated");
        Ok(StepOutput::Script(script))
    }

    async fn voice(&self, input: &StepInput) -> PrepResult<StepOutput> {
        let script = required_script(input)?;
        let chars = script.chars().count();
        if chars > self.config.voice_max_chars {
            return Err(PrepError::invalid_input(format!(
                "script has {} characters, voice synthesis accepts at most {}",
                chars, self.config.voice_max_chars
            )));
        }
        let audio = self
            .providers
            .voice
            .synthesize(script, &input.request.voice)
            .await?;
        if !audio.duration_seconds.is_finite() || audio.duration_seconds <= 0.0 {
            return Err(PrepError::provider(
                "voice_synthesis",
                format!("reported duration {}", audio.duration_seconds),
            ));
        }
        info!(duration = audio.duration_seconds, "Voice synthesized");
        Ok(StepOutput::Voice(audio))
    }

    async fn subtitle(&self, input: &StepInput) -> PrepResult<StepOutput> {
        let audio = input
            .audio
            .as_ref()
            .ok_or_else(|| PrepError::invalid_input("subtitles need synthesized audio"))?;
        let duration = audio.duration_seconds;
        let window = self.config.segment_window_seconds;

        let (transcription, mut warning) = match self
            .providers
            .transcriber
            .transcribe(audio, &input.request.subtitle)
            .await
        {
            Ok(transcription) => (Some(transcription), None),
            Err(e) => {
                warn!(error = %e, outcome = "recoverable-degraded", "Transcription failed, using fixed grid");
                (None, Some(format!("transcription unavailable: {}", e)))
            }
        };

        let timings = transcription.as_ref().map(|t| t.segments.as_slice());
        let (mut segments, source) = build_segments(duration, timings, window)?;

        if source == SegmentationSource::FixedGrid {
            if warning.is_none() {
                warn!(outcome = "recoverable-degraded", "Transcript had no usable timings, using fixed grid");
                warning = Some("transcript had no usable timings".to_string());
            }
            if let Some(script) = input.script.as_deref() {
                distribute_text(&mut segments, script);
            }
        }
        info!(segments = segments.len(), source = ?source, "Segmented narration");

        Ok(StepOutput::Subtitle {
            transcription,
            segments,
            source,
            warning,
        })
    }

    async fn material_search(&self, input: StepInput) -> PrepResult<StepOutput> {
        let script = required_script(&input)?.to_string();
        let mut segments = input.segments;
        if segments.is_empty() {
            return Err(PrepError::invalid_input("material search needs segments"));
        }
        let audio_duration = input
            .audio
            .as_ref()
            .map(|a| a.duration_seconds)
            .or_else(|| segments.last().map(|s| s.end_time))
            .unwrap_or_default();

        let context = KeywordContext {
            script: &script,
            audio_duration,
            segment_duration: self.config.segment_window_seconds,
        };
        let extracted = self.providers.keywords.extract(&segments, &context).await?;
        if extracted.is_degraded() {
            warn!(
                backend = extracted.backend_used.as_str(),
                outcome = "recoverable-degraded",
                "Keyword extraction degraded"
            );
        }
        for segment in segments.iter_mut() {
            segment.keywords = extracted
                .keywords
                .get(&segment.segment_id)
                .cloned()
                .unwrap_or_default();
        }

        let search = MaterialSearch::new(
            Arc::clone(&self.providers.images),
            Arc::clone(&self.providers.videos),
            search_options(input.request.search, &self.config),
        );
        let (materials, search_warnings) = search.search_all(&segments).await;
        let empty = materials.values().filter(|m| m.is_empty()).count();
        info!(
            segments = segments.len(),
            empty,
            failed_calls = search_warnings.len(),
            "Material search finished"
        );

        let mut warnings = extracted.warnings;
        warnings.extend(search_warnings);
        Ok(StepOutput::Materials {
            segments,
            materials,
            warnings,
        })
    }
}

/// Requested search options with result limits capped at the configured maximums.
fn search_options(requested: Option<SearchOptions>, config: &PipelineConfig) -> SearchOptions {
    match requested {
        Some(options) => SearchOptions {
            image_limit: options.image_limit.min(config.image_limit),
            video_limit: options.video_limit.min(config.video_limit),
            ..options
        },
        None => SearchOptions {
            image_limit: config.image_limit,
            video_limit: config.video_limit,
            ..SearchOptions::default()
        },
    }
}

fn required_script(input: &StepInput) -> PrepResult<&str> {
    input
        .script
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| PrepError::invalid_input("script is empty"))
}
