//! Daemon configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use engine::materials::{DEFAULT_IMAGE_LIMIT, DEFAULT_VIDEO_LIMIT};
use engine::segment::DEFAULT_WINDOW_SECONDS;
use engine::MAX_RETRIES;

use crate::keywords::KeywordBackendKind;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    /// Base URL of the AI/media collaborator service
    pub collaborator_url: String,
    /// Base URL of the render backend
    pub render_url: String,
    pub provider_timeout: Duration,
    pub pipeline: PipelineConfig,
    pub compose: ComposeConfig,
}

/// Knobs for the preparation pipeline itself.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub keyword_backend: KeywordBackendKind,
    pub keywords_per_segment: usize,
    pub segment_window_seconds: f64,
    pub max_retries: u32,
    /// Delay before an automatic retry; zero retries immediately
    pub retry_backoff: Duration,
    pub voice_max_chars: usize,
    pub image_limit: usize,
    pub video_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keyword_backend: KeywordBackendKind::RemoteThenHeuristic,
            keywords_per_segment: 3,
            segment_window_seconds: DEFAULT_WINDOW_SECONDS,
            max_retries: MAX_RETRIES,
            retry_backoff: Duration::ZERO,
            voice_max_chars: 5000,
            image_limit: DEFAULT_IMAGE_LIMIT,
            video_limit: DEFAULT_VIDEO_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComposeConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(120),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 7777)),
            db_path: PathBuf::from(".cache/reelprep.db"),
            collaborator_url: "http://127.0.0.1:8001".to_string(),
            render_url: "http://127.0.0.1:8002".to_string(),
            provider_timeout: Duration::from_secs(30),
            pipeline: PipelineConfig::default(),
            compose: ComposeConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl DaemonConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let pipeline = PipelineConfig {
            keyword_backend: std::env::var("KEYWORD_BACKEND")
                .map(|s| KeywordBackendKind::from_env_value(&s))
                .unwrap_or(defaults.pipeline.keyword_backend),
            keywords_per_segment: env_parse("KEYWORDS_PER_SEGMENT")
                .unwrap_or(defaults.pipeline.keywords_per_segment),
            segment_window_seconds: env_parse("SEGMENT_WINDOW_SECS")
                .filter(|w: &f64| *w > 0.0)
                .unwrap_or(defaults.pipeline.segment_window_seconds),
            max_retries: env_parse("PIPELINE_MAX_RETRIES").unwrap_or(defaults.pipeline.max_retries),
            retry_backoff: env_parse("PIPELINE_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.pipeline.retry_backoff),
            voice_max_chars: env_parse("VOICE_MAX_CHARS").unwrap_or(defaults.pipeline.voice_max_chars),
            image_limit: env_parse("IMAGE_RESULTS_MAX").unwrap_or(defaults.pipeline.image_limit),
            video_limit: env_parse("VIDEO_RESULTS_MAX").unwrap_or(defaults.pipeline.video_limit),
        };
        let compose = ComposeConfig {
            poll_interval: env_parse("COMPOSE_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.compose.poll_interval),
            timeout: env_parse("COMPOSE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.compose.timeout),
        };

        Self {
            addr: env_parse("DAEMON_ADDR").unwrap_or(defaults.addr),
            db_path: std::env::var("DAEMON_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            collaborator_url: std::env::var("COLLABORATOR_URL").unwrap_or(defaults.collaborator_url),
            render_url: std::env::var("RENDER_URL").unwrap_or(defaults.render_url),
            provider_timeout: env_parse("PROVIDER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            pipeline,
            compose,
        }
    }
}
