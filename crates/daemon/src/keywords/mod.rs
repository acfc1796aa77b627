use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use engine::keywords::{extract_keywords, normalize_keywords};
use engine::Segment;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PrepResult;
use crate::llm::{KeywordModel, KeywordRequest, SegmentKeywords};

/// Which keyword extractor a pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeywordBackendKind {
    #[serde(rename = "heuristic")]
    Heuristic,
    #[serde(rename = "remote")]
    Remote,
    #[serde(rename = "remote_then_heuristic")]
    RemoteThenHeuristic,
}

impl KeywordBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordBackendKind::Heuristic => "heuristic",
            KeywordBackendKind::Remote => "remote",
            KeywordBackendKind::RemoteThenHeuristic => "remote_then_heuristic",
        }
    }

    /// Unknown values select the default remote-then-heuristic policy.
    pub fn from_env_value(value: &str) -> Self {
        match value.trim() {
            "heuristic" | "local" => KeywordBackendKind::Heuristic,
            "remote" => KeywordBackendKind::Remote,
            _ => KeywordBackendKind::RemoteThenHeuristic,
        }
    }
}

/// Whole-script context available to extractors.
#[derive(Debug, Clone, Copy)]
pub struct KeywordContext<'a> {
    pub script: &'a str,
    pub audio_duration: f64,
    pub segment_duration: f64,
}

#[derive(Debug, Clone)]
pub struct KeywordResult {
    pub keywords: BTreeMap<u32, Vec<String>>,
    pub backend_used: KeywordBackendKind,
    pub warnings: Vec<String>,
}

impl KeywordResult {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    async fn extract(
        &self,
        segments: &[Segment],
        context: &KeywordContext<'_>,
    ) -> PrepResult<KeywordResult>;
}

/// Local, network-free extractor.
#[derive(Debug, Clone, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    fn extract_all(segments: &[Segment]) -> BTreeMap<u32, Vec<String>> {
        segments
            .iter()
            .map(|segment| (segment.segment_id, extract_keywords(&segment.text)))
            .collect()
    }
}

#[async_trait]
impl KeywordExtractor for HeuristicExtractor {
    async fn extract(
        &self,
        segments: &[Segment],
        _context: &KeywordContext<'_>,
    ) -> PrepResult<KeywordResult> {
        Ok(KeywordResult {
            keywords: Self::extract_all(segments),
            backend_used: KeywordBackendKind::Heuristic,
            warnings: Vec::new(),
        })
    }
}

/// Asks a text model for keywords with the whole script as context.
pub struct RemoteExtractor {
    model: Arc<dyn KeywordModel>,
    keywords_per_segment: usize,
}

impl RemoteExtractor {
    pub fn new(model: Arc<dyn KeywordModel>, keywords_per_segment: usize) -> Self {
        RemoteExtractor {
            model,
            keywords_per_segment,
        }
    }
}

/// Match a remote entry to a local segment by time: the timed entry covering
/// the segment midpoint, else the one overlapping it most. Entries without a
/// usable time range are matched by segment id.
fn match_remote<'a>(segment: &Segment, remote: &'a [SegmentKeywords]) -> Option<&'a SegmentKeywords> {
    let timed = |entry: &&SegmentKeywords| entry.start.is_finite() && entry.end.is_finite() && entry.start < entry.end;
    let midpoint = (segment.start_time + segment.end_time) / 2.0;

    remote
        .iter()
        .filter(timed)
        .find(|entry| entry.start <= midpoint && midpoint < entry.end)
        .or_else(|| {
            remote
                .iter()
                .filter(timed)
                .map(|entry| {
                    let overlap = entry.end.min(segment.end_time) - entry.start.max(segment.start_time);
                    (entry, overlap)
                })
                .filter(|(_, overlap)| *overlap > 0.0)
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(entry, _)| entry)
        })
        .or_else(|| {
            remote
                .iter()
                .filter(|entry| !timed(entry))
                .find(|entry| entry.segment_id == segment.segment_id)
        })
}

#[async_trait]
impl KeywordExtractor for RemoteExtractor {
    async fn extract(
        &self,
        segments: &[Segment],
        context: &KeywordContext<'_>,
    ) -> PrepResult<KeywordResult> {
        let request = KeywordRequest {
            script: context.script.to_string(),
            audio_duration: context.audio_duration,
            segment_duration: context.segment_duration,
            keywords_per_segment: self.keywords_per_segment,
        };
        let remote = self.model.segment_keywords(&request).await?;

        let keywords = segments
            .iter()
            .map(|segment| {
                let found = match_remote(segment, &remote)
                    .map(|entry| normalize_keywords(&entry.keywords, self.keywords_per_segment))
                    .unwrap_or_default();
                (segment.segment_id, found)
            })
            .collect();

        Ok(KeywordResult {
            keywords,
            backend_used: KeywordBackendKind::Remote,
            warnings: Vec::new(),
        })
    }
}

/// Remote first; the heuristic covers a failed call and any segment left without keywords.
pub struct FallbackExtractor {
    remote: RemoteExtractor,
}

impl FallbackExtractor {
    pub fn new(remote: RemoteExtractor) -> Self {
        FallbackExtractor { remote }
    }
}

#[async_trait]
impl KeywordExtractor for FallbackExtractor {
    async fn extract(
        &self,
        segments: &[Segment],
        context: &KeywordContext<'_>,
    ) -> PrepResult<KeywordResult> {
        match self.remote.extract(segments, context).await {
            Ok(mut result) => {
                let mut patched = Vec::new();
                for segment in segments {
                    let entry = result.keywords.entry(segment.segment_id).or_default();
                    if entry.is_empty() {
                        let local = extract_keywords(&segment.text);
                        if !local.is_empty() {
                            *entry = local;
                            patched.push(segment.segment_id);
                        }
                    }
                }
                if !patched.is_empty() {
                    result
                        .warnings
                        .push(format!("heuristic keywords used for segments {:?}", patched));
                }
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "Remote keyword extraction failed, falling back to heuristic");
                Ok(KeywordResult {
                    keywords: HeuristicExtractor::extract_all(segments),
                    backend_used: KeywordBackendKind::Heuristic,
                    warnings: vec![format!("remote keywords unavailable: {}", e)],
                })
            }
        }
    }
}

/// Build the extractor for a backend policy. Remote policies need a model.
pub fn extractor_for(
    kind: KeywordBackendKind,
    model: Option<Arc<dyn KeywordModel>>,
    keywords_per_segment: usize,
) -> Arc<dyn KeywordExtractor> {
    match (kind, model) {
        (KeywordBackendKind::Remote, Some(model)) => {
            Arc::new(RemoteExtractor::new(model, keywords_per_segment))
        }
        (KeywordBackendKind::RemoteThenHeuristic, Some(model)) => Arc::new(FallbackExtractor::new(
            RemoteExtractor::new(model, keywords_per_segment),
        )),
        (KeywordBackendKind::Heuristic, _) => Arc::new(HeuristicExtractor),
        (kind, None) => {
            warn!(backend = kind.as_str(), "No keyword model configured, using heuristic");
            Arc::new(HeuristicExtractor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrepError;

    struct FixedModel(PrepResult<Vec<SegmentKeywords>>);

    #[async_trait]
    impl KeywordModel for FixedModel {
        async fn segment_keywords(&self, _request: &KeywordRequest) -> PrepResult<Vec<SegmentKeywords>> {
            self.0.clone()
        }
    }

    fn segments() -> Vec<Segment> {
        vec![
            Segment::new(0, "인기 치킨 맛집 추천", 0.0, 3.0),
            Segment::new(1, "Seoul night market", 3.0, 6.0),
        ]
    }

    fn context() -> KeywordContext<'static> {
        KeywordContext {
            script: "인기 치킨 맛집 추천 Seoul night market",
            audio_duration: 6.0,
            segment_duration: 3.0,
        }
    }

    fn entry(segment_id: u32, start: f64, end: f64, keywords: &[&str]) -> SegmentKeywords {
        SegmentKeywords {
            segment_id,
            text: String::new(),
            start,
            end,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn remote_only_propagates_failure() {
        let model = Arc::new(FixedModel(Err(PrepError::provider("keyword_extraction", "503"))));
        let extractor = extractor_for(KeywordBackendKind::Remote, Some(model), 3);
        let err = extractor.extract(&segments(), &context()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn fallback_uses_heuristic_when_remote_fails() {
        let model = Arc::new(FixedModel(Err(PrepError::provider("keyword_extraction", "timeout"))));
        let extractor = extractor_for(KeywordBackendKind::RemoteThenHeuristic, Some(model), 3);
        let result = extractor.extract(&segments(), &context()).await.unwrap();

        assert!(result.is_degraded());
        assert_eq!(result.backend_used, KeywordBackendKind::Heuristic);
        assert_eq!(result.keywords[&0][0], "치킨 맛집");
        assert!(result.keywords[&1].contains(&"Seoul".to_string()));
    }

    #[tokio::test]
    async fn remote_keywords_are_matched_and_capped() {
        let model = Arc::new(FixedModel(Ok(vec![
            entry(0, 0.0, 3.0, &["fried chicken", "restaurant", "crispy", "dinner"]),
            entry(9, 3.0, 6.0, &["night market"]),
        ])));
        let extractor = extractor_for(KeywordBackendKind::Remote, Some(model), 3);
        let result = extractor.extract(&segments(), &context()).await.unwrap();

        assert!(!result.is_degraded());
        assert_eq!(result.keywords[&0], vec!["fried chicken", "restaurant", "crispy"]);
        assert_eq!(result.keywords[&1], vec!["night market"]);
    }

    #[tokio::test]
    async fn remote_entries_on_a_different_grid_match_by_time() {
        let model = Arc::new(FixedModel(Ok(vec![
            entry(0, 0.0, 3.0, &["opening"]),
            entry(1, 3.0, 6.0, &["street food"]),
            entry(2, 6.0, 9.0, &["lanterns"]),
            entry(3, 9.0, 12.0, &["closing"]),
        ])));
        let transcript = vec![
            Segment::new(0, "인기 치킨 맛집 추천", 0.0, 2.0),
            Segment::new(1, "Seoul night market", 2.0, 12.0),
        ];
        let extractor = extractor_for(KeywordBackendKind::Remote, Some(model), 3);
        let result = extractor.extract(&transcript, &context()).await.unwrap();

        assert_eq!(result.keywords[&0], vec!["opening"]);
        assert_eq!(result.keywords[&1], vec!["lanterns"]);
    }

    #[tokio::test]
    async fn untimed_remote_entries_match_by_id() {
        let model = Arc::new(FixedModel(Ok(vec![
            entry(1, 0.0, 0.0, &["night market"]),
            entry(0, 0.0, 0.0, &["fried chicken"]),
        ])));
        let extractor = extractor_for(KeywordBackendKind::Remote, Some(model), 3);
        let result = extractor.extract(&segments(), &context()).await.unwrap();

        assert_eq!(result.keywords[&0], vec!["fried chicken"]);
        assert_eq!(result.keywords[&1], vec!["night market"]);
    }

    #[tokio::test]
    async fn fallback_patches_segments_the_model_skipped() {
        let model = Arc::new(FixedModel(Ok(vec![entry(0, 0.0, 3.0, &["fried chicken"])])));
        let extractor = extractor_for(KeywordBackendKind::RemoteThenHeuristic, Some(model), 3);
        let result = extractor.extract(&segments(), &context()).await.unwrap();

        assert!(result.is_degraded());
        assert_eq!(result.keywords[&0], vec!["fried chicken"]);
        assert!(!result.keywords[&1].is_empty());
    }

    #[tokio::test]
    async fn missing_model_means_heuristic() {
        let extractor = extractor_for(KeywordBackendKind::Remote, None, 3);
        let result = extractor.extract(&segments(), &context()).await.unwrap();
        assert_eq!(result.backend_used, KeywordBackendKind::Heuristic);
    }

    #[test]
    fn env_values_select_backends() {
        assert_eq!(KeywordBackendKind::from_env_value("local"), KeywordBackendKind::Heuristic);
        assert_eq!(KeywordBackendKind::from_env_value("remote"), KeywordBackendKind::Remote);
        assert_eq!(
            KeywordBackendKind::from_env_value("anything"),
            KeywordBackendKind::RemoteThenHeuristic
        );
    }
}
