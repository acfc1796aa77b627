use std::collections::BTreeMap;
use std::sync::Arc;

use engine::materials::{ImageCandidate, SearchOptions, SegmentMaterials, VideoCandidate};
use engine::Segment;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::stock::{ImageQuery, ImageSearch, VideoQuery, VideoSearch};

/// Fans keyword queries out to the image and video providers.
#[derive(Clone)]
pub struct MaterialSearch {
    images: Arc<dyn ImageSearch>,
    videos: Arc<dyn VideoSearch>,
    options: SearchOptions,
}

impl MaterialSearch {
    pub fn new(images: Arc<dyn ImageSearch>, videos: Arc<dyn VideoSearch>, options: SearchOptions) -> Self {
        MaterialSearch {
            images,
            videos,
            options,
        }
    }

    /// Search one segment's keywords. A failing provider contributes an empty
    /// list plus a warning; no keywords means no calls.
    pub async fn search_segment(&self, segment_id: u32, keywords: &[String]) -> (SegmentMaterials, Vec<String>) {
        let Some(primary) = keywords.first() else {
            debug!(segment_id, "No keywords, skipping material search");
            return (SegmentMaterials::default(), Vec::new());
        };

        let image_query = ImageQuery {
            query: primary.clone(),
            aspect_ratio: self.options.aspect_ratio,
            size: self.options.size,
            max_results: self.options.image_limit,
        };
        let video_query = VideoQuery {
            keywords: keywords.to_vec(),
            orientation: self.options.orientation,
            max_results: self.options.video_limit,
        };

        let (images, videos) = tokio::join!(
            self.images.search_images(&image_query),
            self.videos.search_videos(&video_query)
        );

        let mut warnings = Vec::new();
        let images: Vec<ImageCandidate> = images.unwrap_or_else(|e| {
            warn!(segment_id, error = %e, outcome = "recoverable-degraded", "Image search failed");
            warnings.push(format!("segment {}: {}", segment_id, e));
            Vec::new()
        });
        let videos: Vec<VideoCandidate> = videos.unwrap_or_else(|e| {
            warn!(segment_id, error = %e, outcome = "recoverable-degraded", "Video search failed");
            warnings.push(format!("segment {}: {}", segment_id, e));
            Vec::new()
        });

        let materials = SegmentMaterials {
            images: images.into_iter().take(self.options.image_limit).collect(),
            videos: videos.into_iter().take(self.options.video_limit).collect(),
        };
        (materials, warnings)
    }

    /// Search every segment concurrently, keyed by segment id. Warnings from
    /// failed provider calls come back in segment order.
    pub async fn search_all(&self, segments: &[Segment]) -> (BTreeMap<u32, SegmentMaterials>, Vec<String>) {
        let searches = segments.iter().map(|segment| async move {
            let (materials, warnings) = self.search_segment(segment.segment_id, &segment.keywords).await;
            (segment.segment_id, materials, warnings)
        });

        let mut found = BTreeMap::new();
        let mut warnings = Vec::new();
        for (segment_id, materials, failed) in join_all(searches).await {
            found.insert(segment_id, materials);
            warnings.extend(failed);
        }
        (found, warnings)
    }
}
