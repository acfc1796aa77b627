use async_trait::async_trait;
use engine::materials::{AspectRatio, ImageCandidate, Orientation, SizeClass, VideoCandidate};
use serde::{Deserialize, Serialize};

use crate::error::PrepResult;
use crate::http::ServiceClient;

#[derive(Debug, Clone, Serialize)]
pub struct ImageQuery {
    pub query: String,
    pub aspect_ratio: AspectRatio,
    pub size: SizeClass,
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoQuery {
    pub keywords: Vec<String>,
    pub orientation: Orientation,
    pub max_results: usize,
}

#[async_trait]
pub trait ImageSearch: Send + Sync {
    async fn search_images(&self, query: &ImageQuery) -> PrepResult<Vec<ImageCandidate>>;
}

#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search_videos(&self, query: &VideoQuery) -> PrepResult<Vec<VideoCandidate>>;
}

#[derive(Debug, Deserialize)]
struct StockImage {
    id: String,
    #[serde(rename = "thumbnailUrl", alias = "thumbnail_url")]
    thumbnail_url: String,
    #[serde(rename = "fullUrl", alias = "full_url")]
    full_url: String,
    title: Option<String>,
    source: String,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StockVideo {
    id: String,
    #[serde(rename = "thumbnailUrl", alias = "thumbnail_url")]
    thumbnail_url: String,
    url: String,
    #[serde(rename = "durationSeconds", alias = "duration_seconds", alias = "duration")]
    duration_seconds: f64,
    source: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResults {
    images: Vec<StockImage>,
}

#[derive(Debug, Deserialize)]
struct VideoResults {
    videos: Vec<StockVideo>,
}

/// Image and video search endpoints of the collaborator service.
#[derive(Debug, Clone)]
pub struct StockClient {
    service: ServiceClient,
}

impl StockClient {
    pub fn new(service: ServiceClient) -> Self {
        StockClient { service }
    }
}

fn aspect_label(aspect: AspectRatio) -> String {
    match aspect {
        AspectRatio::Portrait => "9:16",
        AspectRatio::Landscape => "16:9",
        AspectRatio::Square => "1:1",
    }
    .to_string()
}

#[async_trait]
impl ImageSearch for StockClient {
    async fn search_images(&self, query: &ImageQuery) -> PrepResult<Vec<ImageCandidate>> {
        let results: ImageResults = self
            .service
            .post_json("image_search", "/images/search", query)
            .await?;
        Ok(results
            .images
            .into_iter()
            .take(query.max_results)
            .map(|image| ImageCandidate {
                id: image.id,
                thumbnail_url: image.thumbnail_url,
                full_url: image.full_url,
                source_provider: image.source,
                title: image.title,
                aspect_ratio: Some(aspect_label(query.aspect_ratio)),
                format: image.format,
            })
            .collect())
    }
}

#[async_trait]
impl VideoSearch for StockClient {
    async fn search_videos(&self, query: &VideoQuery) -> PrepResult<Vec<VideoCandidate>> {
        let results: VideoResults = self
            .service
            .post_json("video_search", "/videos/search", query)
            .await?;
        Ok(results
            .videos
            .into_iter()
            .take(query.max_results)
            .map(|video| VideoCandidate {
                id: video.id,
                thumbnail_url: video.thumbnail_url,
                url: video.url,
                duration_seconds: video.duration_seconds,
                source_provider: video.source,
                title: video.title,
            })
            .collect())
    }
}
