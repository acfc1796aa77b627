//! In-process collaborators for driving a pipeline without a network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daemon::config::DaemonConfig;
use daemon::db::Database;
use daemon::error::{PrepError, PrepResult};
use daemon::keywords::{extractor_for, KeywordBackendKind};
use daemon::llm::{KeywordModel, KeywordRequest, ScriptGenerator, SegmentKeywords};
use daemon::render::RenderBackend;
use daemon::speech::{Transcriber, VoiceSynthesizer};
use daemon::stock::{ImageQuery, ImageSearch, VideoQuery, VideoSearch};
use daemon::{PipelineController, PipelineSnapshot, Providers};
use engine::composition::{CompositionPayload, RenderState, RenderStatus};
use engine::materials::{ImageCandidate, VideoCandidate};
use engine::script::{
    AudioFormat, AudioRef, GeneratedScript, ScriptRequest, SubtitleOptions, Transcription, VoiceSettings,
};
use engine::TranscriptSegment;
use tokio::sync::Semaphore;
use uuid::Uuid;

pub const SCRIPT: &str = "서울 야시장 투어 시작합니다 인기 치킨 맛집 추천 Seoul night market";

#[derive(Default)]
pub struct FakeScripts {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ScriptGenerator for FakeScripts {
    async fn generate_script(&self, request: &ScriptRequest) -> PrepResult<GeneratedScript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!request.subject.is_empty());
        Ok(GeneratedScript::supplied(SCRIPT))
    }
}

pub struct FakeVoice {
    pub calls: AtomicUsize,
    /// Number of leading calls that fail.
    pub failures: AtomicUsize,
    pub duration: f64,
}

impl FakeVoice {
    pub fn new(duration: f64) -> Self {
        FakeVoice {
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            duration,
        }
    }
}

#[async_trait]
impl VoiceSynthesizer for FakeVoice {
    async fn synthesize(&self, _text: &str, _voice: &VoiceSettings) -> PrepResult<AudioRef> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PrepError::provider("voice_synthesis", "HTTP 503"));
        }
        Ok(AudioRef {
            url: Some("https://cdn.test/voice.mp3".to_string()),
            inline_data: None,
            duration_seconds: self.duration,
            format: AudioFormat::Mp3,
        })
    }
}

pub struct FakeTranscriber {
    pub fail: bool,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio: &AudioRef, _options: &SubtitleOptions) -> PrepResult<Transcription> {
        if self.fail {
            return Err(PrepError::provider("transcription", "timeout"));
        }
        let phrase = |text: &str, start: f64, end: f64| TranscriptSegment {
            text: text.to_string(),
            start,
            end,
            confidence: Some(0.93),
        };
        Ok(Transcription {
            segments: vec![
                phrase("서울 야시장 투어 시작합니다", 0.2, 3.4),
                phrase("인기 치킨 맛집 추천", 3.6, 7.1),
                phrase("Seoul night market", 7.1, 9.6),
            ],
            subtitle_markup: Some("WEBVTT".to_string()),
            raw_transcript: Some(SCRIPT.to_string()),
        })
    }
}

/// Remote keyword model that fails while `failing` is set.
#[derive(Default)]
pub struct FakeKeywordModel {
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
}

#[async_trait]
impl KeywordModel for FakeKeywordModel {
    async fn segment_keywords(&self, _request: &KeywordRequest) -> PrepResult<Vec<SegmentKeywords>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(PrepError::provider("keyword_extraction", "HTTP 429"));
        }
        Ok((0..3)
            .map(|segment_id| SegmentKeywords {
                segment_id,
                text: String::new(),
                start: 0.0,
                end: 0.0,
                keywords: vec![format!("keyword {}", segment_id)],
            })
            .collect())
    }
}

/// Stock search; optionally held until the gate gets permits.
#[derive(Default)]
pub struct FakeStock {
    pub image_calls: AtomicUsize,
    pub video_calls: AtomicUsize,
    pub gate: Option<Arc<Semaphore>>,
    pub failing: bool,
}

impl FakeStock {
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            FakeStock {
                gate: Some(gate.clone()),
                ..Default::default()
            },
            gate,
        )
    }

    async fn wait(&self) {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
    }
}

#[async_trait]
impl ImageSearch for FakeStock {
    async fn search_images(&self, query: &ImageQuery) -> PrepResult<Vec<ImageCandidate>> {
        self.wait().await;
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(PrepError::provider("image_search", "HTTP 503"));
        }
        Ok(vec![image(&format!("img-{}", query.query))])
    }
}

#[async_trait]
impl VideoSearch for FakeStock {
    async fn search_videos(&self, query: &VideoQuery) -> PrepResult<Vec<VideoCandidate>> {
        self.wait().await;
        self.video_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(PrepError::provider("video_search", "timeout"));
        }
        Ok(vec![video(&format!("vid-{}", query.keywords.join("+")))])
    }
}

/// Render backend that completes on the `complete_after`th poll, or never.
pub struct FakeRender {
    pub polls: AtomicUsize,
    pub complete_after: Option<usize>,
}

#[async_trait]
impl RenderBackend for FakeRender {
    async fn submit(&self, payload: &CompositionPayload) -> PrepResult<String> {
        assert!(!payload.script.is_empty());
        Ok("render-42".to_string())
    }

    async fn status(&self, _task_id: &str) -> PrepResult<RenderStatus> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let done = self.complete_after.is_some_and(|at| n >= at);
        Ok(RenderStatus {
            status: if done { RenderState::Completed } else { RenderState::Processing },
            progress: if done { 100.0 } else { 50.0 },
            current_step: Some("encoding".to_string()),
            result_urls: if done {
                vec!["https://cdn.test/final.mp4".to_string()]
            } else {
                Vec::new()
            },
            error: None,
        })
    }
}

pub fn image(id: &str) -> ImageCandidate {
    ImageCandidate {
        id: id.to_string(),
        thumbnail_url: format!("https://cdn.test/{}-thumb.jpg", id),
        full_url: format!("https://cdn.test/{}.jpg", id),
        source_provider: "unsplash".to_string(),
        title: None,
        aspect_ratio: Some("9:16".to_string()),
        format: Some("jpg".to_string()),
    }
}

pub fn video(id: &str) -> VideoCandidate {
    VideoCandidate {
        id: id.to_string(),
        thumbnail_url: format!("https://cdn.test/{}-thumb.jpg", id),
        url: format!("https://cdn.test/{}.mp4", id),
        duration_seconds: 8.0,
        source_provider: "pexels".to_string(),
        title: None,
    }
}

/// Handles on the fakes behind a [`Providers`] bundle.
pub struct Harness {
    pub scripts: Arc<FakeScripts>,
    pub voice: Arc<FakeVoice>,
    pub keyword_model: Arc<FakeKeywordModel>,
    pub stock: Arc<FakeStock>,
    pub render: Arc<FakeRender>,
    pub providers: Providers,
}

pub struct HarnessBuilder {
    pub transcription_fails: bool,
    pub keyword_backend: KeywordBackendKind,
    pub stock: FakeStock,
    pub render_complete_after: Option<usize>,
    pub voice_duration: f64,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        HarnessBuilder {
            transcription_fails: false,
            keyword_backend: KeywordBackendKind::Heuristic,
            stock: FakeStock::default(),
            render_complete_after: Some(2),
            voice_duration: 10.0,
        }
    }
}

impl HarnessBuilder {
    pub fn build(self) -> Harness {
        let scripts = Arc::new(FakeScripts::default());
        let voice = Arc::new(FakeVoice::new(self.voice_duration));
        let keyword_model = Arc::new(FakeKeywordModel::default());
        let stock = Arc::new(self.stock);
        let render = Arc::new(FakeRender {
            polls: AtomicUsize::new(0),
            complete_after: self.render_complete_after,
        });
        let model: Arc<dyn KeywordModel> = keyword_model.clone();

        let providers = Providers {
            scripts: scripts.clone(),
            voice: voice.clone(),
            transcriber: Arc::new(FakeTranscriber {
                fail: self.transcription_fails,
            }),
            keywords: extractor_for(self.keyword_backend, Some(model), 3),
            images: stock.clone(),
            videos: stock.clone(),
            render: render.clone(),
        };

        Harness {
            scripts,
            voice,
            keyword_model,
            stock,
            render,
            providers,
        }
    }
}

pub fn test_config() -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.compose.poll_interval = Duration::from_millis(10);
    config.compose.timeout = Duration::from_secs(2);
    config
}

pub fn controller(harness: &Harness, config: &DaemonConfig) -> Arc<PipelineController> {
    PipelineController::spawn(Uuid::new_v4(), harness.providers.clone(), config, None)
}

pub fn controller_with_db(harness: &Harness, config: &DaemonConfig, db: Arc<Database>) -> Arc<PipelineController> {
    PipelineController::spawn(Uuid::new_v4(), harness.providers.clone(), config, Some(db))
}

/// Poll snapshots until `done` holds, panicking after five seconds.
pub async fn wait_for<F>(controller: &PipelineController, mut done: F) -> PipelineSnapshot
where
    F: FnMut(&PipelineSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = controller.snapshot().await;
        if done(&snapshot) {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached; last snapshot: {:#?}",
            snapshot.steps
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
