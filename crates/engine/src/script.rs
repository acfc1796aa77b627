use serde::{Deserialize, Serialize};

use crate::segment::TranscriptSegment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLength {
    Short,
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStyle {
    Informative,
    Entertaining,
    Educational,
    Promotional,
    Storytelling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptTone {
    Casual,
    Formal,
    Humorous,
    Emotional,
    Energetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStructure {
    HookBodyCta,
    Listicle,
    ProblemSolution,
    Narrative,
}

/// Everything the script generator needs besides the subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub subject: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_length")]
    pub length: ScriptLength,
    #[serde(default = "default_style")]
    pub style: ScriptStyle,
    #[serde(default = "default_tone")]
    pub tone: ScriptTone,
    #[serde(default = "default_structure")]
    pub structure: ScriptStructure,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub requirements: Option<String>,
}

fn default_language() -> String {
    "ko".to_string()
}

fn default_length() -> ScriptLength {
    ScriptLength::Short
}

fn default_style() -> ScriptStyle {
    ScriptStyle::Informative
}

fn default_tone() -> ScriptTone {
    ScriptTone::Casual
}

fn default_structure() -> ScriptStructure {
    ScriptStructure::HookBodyCta
}

impl ScriptRequest {
    pub fn for_subject(subject: impl Into<String>) -> Self {
        ScriptRequest {
            subject: subject.into(),
            language: default_language(),
            length: default_length(),
            style: default_style(),
            tone: default_tone(),
            structure: default_structure(),
            keywords: Vec::new(),
            requirements: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSection {
    pub title: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptAnalysis {
    pub estimated_duration_seconds: Option<f64>,
    pub word_count: Option<u32>,
    pub readability: Option<f64>,
    pub hook_strength: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedScript {
    pub text: String,
    #[serde(default)]
    pub sections: Vec<ScriptSection>,
    #[serde(default)]
    pub analysis: Option<ScriptAnalysis>,
}

impl GeneratedScript {
    /// A script typed in by the user rather than generated.
    pub fn supplied(text: impl Into<String>) -> Self {
        GeneratedScript {
            text: text.into(),
            sections: Vec::new(),
            analysis: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub voice_id: String,
    #[serde(default = "unit_rate")]
    pub rate: f32,
    #[serde(default = "unit_rate")]
    pub volume: f32,
    #[serde(default)]
    pub pitch: f32,
    #[serde(default = "default_format")]
    pub format: AudioFormat,
}

fn unit_rate() -> f32 {
    1.0
}

fn default_format() -> AudioFormat {
    AudioFormat::Mp3
}

impl Default for VoiceSettings {
    fn default() -> Self {
        VoiceSettings {
            voice_id: "default".to_string(),
            rate: 1.0,
            volume: 1.0,
            pitch: 0.0,
            format: AudioFormat::Mp3,
        }
    }
}

/// Synthesized narration. Exactly one of `url` / `inline_data` is normally set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRef {
    pub url: Option<String>,
    pub inline_data: Option<String>,
    pub duration_seconds: f64,
    pub format: AudioFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleAnimation {
    None,
    Fade,
    Pop,
    Typewriter,
    Karaoke,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleOptions {
    pub animation: SubtitleAnimation,
    pub optimize_for_language: bool,
}

impl Default for SubtitleOptions {
    fn default() -> Self {
        SubtitleOptions {
            animation: SubtitleAnimation::Fade,
            optimize_for_language: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub segments: Vec<TranscriptSegment>,
    pub subtitle_markup: Option<String>,
    pub raw_transcript: Option<String>,
}
