use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE_LIMIT: usize = 12;
pub const DEFAULT_VIDEO_LIMIT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    Image,
    Video,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialKind::Image => "image",
            MaterialKind::Video => "video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub id: String,
    pub thumbnail_url: String,
    pub full_url: String,
    pub source_provider: String,
    pub title: Option<String>,
    pub aspect_ratio: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoCandidate {
    pub id: String,
    pub thumbnail_url: String,
    pub url: String,
    pub duration_seconds: f64,
    pub source_provider: String,
    pub title: Option<String>,
}

/// A stock image or video the user can bind to a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum MaterialCandidate {
    Image(ImageCandidate),
    Video(VideoCandidate),
}

impl MaterialCandidate {
    pub fn kind(&self) -> MaterialKind {
        match self {
            MaterialCandidate::Image(_) => MaterialKind::Image,
            MaterialCandidate::Video(_) => MaterialKind::Video,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            MaterialCandidate::Image(image) => &image.id,
            MaterialCandidate::Video(video) => &video.id,
        }
    }
}

/// Search results for one segment. Either list may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentMaterials {
    pub images: Vec<ImageCandidate>,
    pub videos: Vec<VideoCandidate>,
}

impl SegmentMaterials {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.videos.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "1:1")]
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

impl From<AspectRatio> for Orientation {
    fn from(aspect: AspectRatio) -> Self {
        match aspect {
            AspectRatio::Portrait => Orientation::Portrait,
            AspectRatio::Landscape => Orientation::Landscape,
            AspectRatio::Square => Orientation::Square,
        }
    }
}

/// Fields left out of a request take their default values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub aspect_ratio: AspectRatio,
    pub size: SizeClass,
    pub orientation: Orientation,
    pub image_limit: usize,
    pub video_limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            aspect_ratio: AspectRatio::Portrait,
            size: SizeClass::Medium,
            orientation: Orientation::Portrait,
            image_limit: DEFAULT_IMAGE_LIMIT,
            video_limit: DEFAULT_VIDEO_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_search_options_fill_in_defaults() {
        let options: SearchOptions = serde_json::from_str(r#"{"image_limit": 5}"#).unwrap();
        assert_eq!(options.image_limit, 5);
        assert_eq!(options.video_limit, DEFAULT_VIDEO_LIMIT);
        assert_eq!(options.orientation, Orientation::Portrait);
    }
}
