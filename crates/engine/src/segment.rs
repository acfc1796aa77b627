use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Default width of a fixed-grid segment when no transcription timings exist.
pub const DEFAULT_WINDOW_SECONDS: f64 = 3.0;

/// A time-bounded slice of the script, the unit of keyword and material binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: u32,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub confidence: Option<f64>,
}

impl Segment {
    pub fn new(segment_id: u32, text: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Segment {
            segment_id,
            text: text.into(),
            start_time,
            end_time,
            keywords: Vec::new(),
            confidence: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// One phrase returned by the transcription service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: Option<f64>,
}

/// Where the segment boundaries of a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationSource {
    Transcript,
    FixedGrid,
}

fn validate_duration(duration: f64) -> EngineResult<()> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(EngineError::invalid_input(format!(
            "audio duration must be a positive number of seconds, got {}",
            duration
        )));
    }
    Ok(())
}

/// Split `[0, duration]` into fixed windows. The last window is clipped to the duration.
pub fn fixed_grid(duration: f64, window: f64) -> EngineResult<Vec<Segment>> {
    validate_duration(duration)?;
    if !window.is_finite() || window <= 0.0 {
        return Err(EngineError::invalid_input(format!(
            "segment window must be positive, got {}",
            window
        )));
    }

    let count = (duration / window).ceil() as u32;
    let mut segments = Vec::with_capacity(count as usize);
    let mut current = 0.0f64;
    let mut segment_id = 0u32;

    while segment_id < count {
        let end = ((segment_id + 1) as f64 * window).min(duration);
        if end <= current {
            break;
        }
        segments.push(Segment::new(segment_id, String::new(), current, end));
        current = end;
        segment_id += 1;
    }

    // Float rounding can leave the tail a hair short of the duration.
    if let Some(last) = segments.last_mut() {
        last.end_time = duration;
    }

    Ok(segments)
}

/// Normalize transcription timings into a contiguous partition of `[0, duration]`.
///
/// Gaps between phrases are absorbed into the following segment, spans past the
/// duration are clipped and the final segment is stretched to the duration.
/// Spans that collapse to zero length merge their text into the previous segment.
/// Returns an empty list when no phrase is usable.
pub fn from_transcript(
    duration: f64,
    transcript: &[TranscriptSegment],
) -> EngineResult<Vec<Segment>> {
    validate_duration(duration)?;

    let mut phrases: Vec<&TranscriptSegment> = transcript
        .iter()
        .filter(|t| t.start.is_finite() && t.end.is_finite() && t.end > t.start && t.start < duration)
        .collect();
    phrases.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut segments: Vec<Segment> = Vec::with_capacity(phrases.len());
    let mut cursor = 0.0f64;

    for phrase in phrases {
        let end = phrase.end.min(duration);
        let text = phrase.text.trim();
        if end <= cursor {
            if let Some(previous) = segments.last_mut() {
                if !text.is_empty() {
                    if !previous.text.is_empty() {
                        previous.text.push(' ');
                    }
                    previous.text.push_str(text);
                }
            }
            continue;
        }

        let mut segment = Segment::new(segments.len() as u32, text, cursor, end);
        segment.confidence = phrase.confidence;
        segments.push(segment);
        cursor = end;
    }

    if let Some(last) = segments.last_mut() {
        last.end_time = duration;
    }

    Ok(segments)
}

/// Build the segments for a run, preferring transcription timings over the fixed grid.
pub fn build_segments(
    duration: f64,
    transcript: Option<&[TranscriptSegment]>,
    window: f64,
) -> EngineResult<(Vec<Segment>, SegmentationSource)> {
    if let Some(transcript) = transcript {
        let segments = from_transcript(duration, transcript)?;
        if !segments.is_empty() {
            return Ok((segments, SegmentationSource::Transcript));
        }
    }
    Ok((fixed_grid(duration, window)?, SegmentationSource::FixedGrid))
}

/// Give empty grid segments placeholder text by spreading the script's words
/// over the timeline in proportion to each window's duration.
pub fn distribute_text(segments: &mut [Segment], script: &str) {
    let words: Vec<&str> = script.split_whitespace().collect();
    let total = match segments.last() {
        Some(last) if last.end_time > 0.0 => last.end_time,
        _ => return,
    };
    if words.is_empty() {
        return;
    }

    for segment in segments.iter_mut().filter(|s| s.text.is_empty()) {
        let from = ((segment.start_time / total) * words.len() as f64).round() as usize;
        let to = ((segment.end_time / total) * words.len() as f64).round() as usize;
        let to = to.min(words.len());
        if from < to {
            segment.text = words[from..to].join(" ");
        }
    }
}
