use async_trait::async_trait;
use engine::script::{GeneratedScript, ScriptRequest};
use serde::{Deserialize, Serialize};

use crate::error::{PrepError, PrepResult};
use crate::http::ServiceClient;

/// Generates a narration script for a subject.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate_script(&self, request: &ScriptRequest) -> PrepResult<GeneratedScript>;
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordRequest {
    pub script: String,
    pub audio_duration: f64,
    pub segment_duration: f64,
    pub keywords_per_segment: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SegmentKeywords {
    pub segment_id: u32,
    #[serde(default)]
    pub text: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Text model that proposes search keywords for every segment of a whole script.
#[async_trait]
pub trait KeywordModel: Send + Sync {
    async fn segment_keywords(&self, request: &KeywordRequest) -> PrepResult<Vec<SegmentKeywords>>;
}

#[derive(Debug, Deserialize)]
struct KeywordResponse {
    segments: Vec<SegmentKeywords>,
}

/// Script and keyword endpoints of the collaborator service.
#[derive(Debug, Clone)]
pub struct LlmClient {
    service: ServiceClient,
}

impl LlmClient {
    pub fn new(service: ServiceClient) -> Self {
        LlmClient { service }
    }
}

#[async_trait]
impl ScriptGenerator for LlmClient {
    async fn generate_script(&self, request: &ScriptRequest) -> PrepResult<GeneratedScript> {
        let script: GeneratedScript = self
            .service
            .post_json("script_generation", "/script/generate", request)
            .await?;
        if script.text.trim().is_empty() {
            return Err(PrepError::provider("script_generation", "returned an empty script"));
        }
        Ok(script)
    }
}

#[async_trait]
impl KeywordModel for LlmClient {
    async fn segment_keywords(&self, request: &KeywordRequest) -> PrepResult<Vec<SegmentKeywords>> {
        let response: KeywordResponse = self
            .service
            .post_json("keyword_extraction", "/keywords/extract", request)
            .await?;
        Ok(response.segments)
    }
}
