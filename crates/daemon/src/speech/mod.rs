use async_trait::async_trait;
use engine::script::{AudioRef, SubtitleAnimation, SubtitleOptions, Transcription, VoiceSettings};
use serde::Serialize;

use crate::error::{PrepError, PrepResult};
use crate::http::ServiceClient;

#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> PrepResult<AudioRef>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioRef, options: &SubtitleOptions) -> PrepResult<Transcription>;
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    #[serde(flatten)]
    voice: &'a VoiceSettings,
}

#[derive(Serialize)]
struct TranscribeRequest<'a> {
    audio_url: Option<&'a str>,
    audio_data: Option<&'a str>,
    animation: SubtitleAnimation,
    optimize_for_language: bool,
}

/// Voice synthesis and transcription endpoints of the collaborator service.
#[derive(Debug, Clone)]
pub struct SpeechClient {
    service: ServiceClient,
}

impl SpeechClient {
    pub fn new(service: ServiceClient) -> Self {
        SpeechClient { service }
    }
}

#[async_trait]
impl VoiceSynthesizer for SpeechClient {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> PrepResult<AudioRef> {
        let audio: AudioRef = self
            .service
            .post_json("voice_synthesis", "/voice/synthesize", &SynthesizeRequest { text, voice })
            .await?;
        if audio.url.is_none() && audio.inline_data.is_none() {
            return Err(PrepError::provider("voice_synthesis", "response carried no audio"));
        }
        Ok(audio)
    }
}

#[async_trait]
impl Transcriber for SpeechClient {
    async fn transcribe(&self, audio: &AudioRef, options: &SubtitleOptions) -> PrepResult<Transcription> {
        let request = TranscribeRequest {
            audio_url: audio.url.as_deref(),
            audio_data: audio.inline_data.as_deref(),
            animation: options.animation,
            optimize_for_language: options.optimize_for_language,
        };
        self.service
            .post_json("transcription", "/subtitles/transcribe", &request)
            .await
    }
}
