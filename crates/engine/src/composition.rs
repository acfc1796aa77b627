use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::script::AudioRef;
use crate::segment::Segment;
use crate::selection::FinalizedMaterials;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleStyle {
    pub enabled: bool,
    pub font_family: String,
    pub font_size: u32,
    pub color: String,
    pub stroke_color: Option<String>,
    pub position: SubtitlePosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitlePosition {
    Top,
    Center,
    Bottom,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        SubtitleStyle {
            enabled: true,
            font_family: "Noto Sans KR".to_string(),
            font_size: 48,
            color: "#FFFFFF".to_string(),
            stroke_color: Some("#000000".to_string()),
            position: SubtitlePosition::Bottom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgmSettings {
    pub enabled: bool,
    pub track_url: Option<String>,
    pub volume: f32,
}

impl Default for BgmSettings {
    fn default() -> Self {
        BgmSettings {
            enabled: false,
            track_url: None,
            volume: 0.2,
        }
    }
}

/// Style knobs the user picks before composing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionSettings {
    #[serde(default)]
    pub subtitle: SubtitleStyle,
    #[serde(default)]
    pub bgm: BgmSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipPlacement {
    pub segment_id: u32,
    pub url: String,
    pub start_time: f64,
    pub end_time: f64,
    pub source_duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePlacement {
    pub segment_id: u32,
    pub url: String,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionPayload {
    pub script: String,
    pub audio: AudioRef,
    pub video_clips: Vec<ClipPlacement>,
    pub images: Vec<ImagePlacement>,
    pub subtitle: SubtitleStyle,
    pub bgm: BgmSettings,
}

impl CompositionPayload {
    /// Place every finalized material on its segment's time window.
    pub fn build(
        script: &str,
        audio: &AudioRef,
        segments: &[Segment],
        materials: &FinalizedMaterials,
        settings: &CompositionSettings,
    ) -> EngineResult<Self> {
        if script.trim().is_empty() {
            return Err(EngineError::invalid_input("composition needs a script"));
        }
        if materials.video_clips.is_empty() && materials.image_assets.is_empty() {
            return Err(EngineError::invalid_input("composition needs at least one material"));
        }

        let windows: HashMap<u32, &Segment> = segments.iter().map(|s| (s.segment_id, s)).collect();
        let window = |segment_id: u32| {
            windows
                .get(&segment_id)
                .copied()
                .ok_or(EngineError::UnknownSegment(segment_id))
        };

        let mut video_clips = Vec::with_capacity(materials.video_clips.len());
        for selected in &materials.video_clips {
            let segment = window(selected.segment_id)?;
            video_clips.push(ClipPlacement {
                segment_id: selected.segment_id,
                url: selected.video.url.clone(),
                start_time: segment.start_time,
                end_time: segment.end_time,
                source_duration_seconds: selected.video.duration_seconds,
            });
        }

        let mut images = Vec::with_capacity(materials.image_assets.len());
        for selected in &materials.image_assets {
            let segment = window(selected.segment_id)?;
            images.push(ImagePlacement {
                segment_id: selected.segment_id,
                url: selected.image.full_url.clone(),
                start_time: segment.start_time,
                end_time: segment.end_time,
            });
        }

        Ok(CompositionPayload {
            script: script.to_string(),
            audio: audio.clone(),
            video_clips,
            images,
            subtitle: settings.subtitle.clone(),
            bgm: settings.bgm.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl RenderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderState::Completed | RenderState::Failed)
    }
}

/// Status reported by the render backend for a submitted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderStatus {
    pub status: RenderState,
    #[serde(default)]
    pub progress: f32,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub result_urls: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::{ImageCandidate, VideoCandidate};
    use crate::script::AudioFormat;
    use crate::selection::{SelectedImage, SelectedVideo};

    fn audio() -> AudioRef {
        AudioRef {
            url: Some("https://cdn.test/voice.mp3".to_string()),
            inline_data: None,
            duration_seconds: 6.0,
            format: AudioFormat::Mp3,
        }
    }

    fn finalized() -> FinalizedMaterials {
        FinalizedMaterials {
            video_clips: vec![SelectedVideo {
                segment_id: 0,
                video: VideoCandidate {
                    id: "v0".to_string(),
                    thumbnail_url: "https://cdn.test/v0.jpg".to_string(),
                    url: "https://cdn.test/v0.mp4".to_string(),
                    duration_seconds: 12.0,
                    source_provider: "pexels".to_string(),
                    title: None,
                },
            }],
            image_assets: vec![SelectedImage {
                segment_id: 1,
                image: ImageCandidate {
                    id: "i1".to_string(),
                    thumbnail_url: "https://cdn.test/i1_s.jpg".to_string(),
                    full_url: "https://cdn.test/i1.jpg".to_string(),
                    source_provider: "unsplash".to_string(),
                    title: None,
                    aspect_ratio: None,
                    format: None,
                },
            }],
        }
    }

    #[test]
    fn materials_land_on_their_segment_windows() {
        let segments = vec![Segment::new(0, "a", 0.0, 3.0), Segment::new(1, "b", 3.0, 6.0)];
        let payload = CompositionPayload::build(
            "hello",
            &audio(),
            &segments,
            &finalized(),
            &CompositionSettings::default(),
        )
        .unwrap();

        assert_eq!(payload.video_clips[0].url, "https://cdn.test/v0.mp4");
        assert_eq!((payload.video_clips[0].start_time, payload.video_clips[0].end_time), (0.0, 3.0));
        assert_eq!(payload.images[0].url, "https://cdn.test/i1.jpg");
        assert_eq!((payload.images[0].start_time, payload.images[0].end_time), (3.0, 6.0));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["audio"]["format"], "mp3");
        assert_eq!(json["subtitle"]["position"], "bottom");
    }

    #[test]
    fn unknown_segment_and_empty_inputs_are_rejected() {
        let segments = vec![Segment::new(0, "a", 0.0, 3.0)];
        let settings = CompositionSettings::default();
        assert_eq!(
            CompositionPayload::build("hello", &audio(), &segments, &finalized(), &settings),
            Err(EngineError::UnknownSegment(1))
        );
        assert!(CompositionPayload::build(" ", &audio(), &segments, &finalized(), &settings).is_err());
        assert!(CompositionPayload::build(
            "hello",
            &audio(),
            &segments,
            &FinalizedMaterials::default(),
            &settings
        )
        .is_err());
    }

    #[test]
    fn render_status_parses_backend_shape() {
        let status: RenderStatus = serde_json::from_str(
            r#"{"status":"processing","progress":0.4,"current_step":"encoding"}"#,
        )
        .unwrap();
        assert_eq!(status.status, RenderState::Processing);
        assert!(!status.status.is_terminal());
        assert!(status.result_urls.is_empty());
    }
}
