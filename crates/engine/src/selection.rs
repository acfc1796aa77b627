use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::materials::{ImageCandidate, MaterialCandidate, MaterialKind, VideoCandidate};
use crate::segment::Segment;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedMaterial {
    pub segment_id: u32,
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    pub data: MaterialCandidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedVideo {
    pub segment_id: u32,
    pub video: VideoCandidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedImage {
    pub segment_id: u32,
    pub image: ImageCandidate,
}

/// The material payload handed to composition, in segment order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalizedMaterials {
    pub video_clips: Vec<SelectedVideo>,
    pub image_assets: Vec<SelectedImage>,
}

/// One-to-one binding of segment to user-chosen material.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionStore {
    segment_ids: BTreeSet<u32>,
    selections: BTreeMap<u32, SelectedMaterial>,
}

impl SelectionStore {
    pub fn new(segments: &[Segment]) -> Self {
        SelectionStore {
            segment_ids: segments.iter().map(|s| s.segment_id).collect(),
            selections: BTreeMap::new(),
        }
    }

    /// Upsert the selection for a segment. The latest call wins.
    pub fn select(
        &mut self,
        segment_id: u32,
        kind: MaterialKind,
        data: MaterialCandidate,
    ) -> EngineResult<()> {
        if !self.segment_ids.contains(&segment_id) {
            return Err(EngineError::UnknownSegment(segment_id));
        }
        if data.kind() != kind {
            return Err(EngineError::invalid_input(format!(
                "selection type {} does not match {} material {}",
                kind.as_str(),
                data.kind().as_str(),
                data.id()
            )));
        }
        self.selections.insert(
            segment_id,
            SelectedMaterial {
                segment_id,
                kind,
                data,
            },
        );
        Ok(())
    }

    pub fn get(&self, segment_id: u32) -> Option<&SelectedMaterial> {
        self.selections.get(&segment_id)
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn missing(&self) -> Vec<u32> {
        self.segment_ids
            .iter()
            .filter(|id| !self.selections.contains_key(id))
            .copied()
            .collect()
    }

    /// True iff every known segment has a selection. A store with no segments is never complete.
    pub fn is_complete(&self) -> bool {
        !self.segment_ids.is_empty() && self.missing().is_empty()
    }

    pub fn selections(&self) -> impl Iterator<Item = &SelectedMaterial> {
        self.selections.values()
    }

    /// Project the store into ordered video and image lists.
    pub fn finalize(&self) -> EngineResult<FinalizedMaterials> {
        if !self.is_complete() {
            return Err(EngineError::IncompleteSelection {
                missing: self.missing(),
            });
        }

        let mut finalized = FinalizedMaterials::default();
        for selected in self.selections.values() {
            match &selected.data {
                MaterialCandidate::Video(video) => finalized.video_clips.push(SelectedVideo {
                    segment_id: selected.segment_id,
                    video: video.clone(),
                }),
                MaterialCandidate::Image(image) => finalized.image_assets.push(SelectedImage {
                    segment_id: selected.segment_id,
                    image: image.clone(),
                }),
            }
        }
        Ok(finalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(count: u32) -> Vec<Segment> {
        (0..count)
            .map(|i| Segment::new(i, format!("segment {}", i), i as f64 * 3.0, (i + 1) as f64 * 3.0))
            .collect()
    }

    fn video(id: &str) -> MaterialCandidate {
        MaterialCandidate::Video(VideoCandidate {
            id: id.to_string(),
            thumbnail_url: format!("https://cdn.test/{}.jpg", id),
            url: format!("https://cdn.test/{}.mp4", id),
            duration_seconds: 6.0,
            source_provider: "pexels".to_string(),
            title: None,
        })
    }

    fn image(id: &str) -> MaterialCandidate {
        MaterialCandidate::Image(ImageCandidate {
            id: id.to_string(),
            thumbnail_url: format!("https://cdn.test/{}_s.jpg", id),
            full_url: format!("https://cdn.test/{}.jpg", id),
            source_provider: "unsplash".to_string(),
            title: Some("city".to_string()),
            aspect_ratio: Some("9:16".to_string()),
            format: Some("jpg".to_string()),
        })
    }

    #[test]
    fn video_then_image_finalize_in_segment_order() {
        let mut store = SelectionStore::new(&segments(2));
        store.select(1, MaterialKind::Image, image("img-1")).unwrap();
        assert!(!store.is_complete());
        store.select(0, MaterialKind::Video, video("vid-0")).unwrap();
        assert!(store.is_complete());

        let finalized = store.finalize().unwrap();
        assert_eq!(finalized.video_clips.len(), 1);
        assert_eq!(finalized.video_clips[0].segment_id, 0);
        assert_eq!(finalized.video_clips[0].video.id, "vid-0");
        assert_eq!(finalized.image_assets.len(), 1);
        assert_eq!(finalized.image_assets[0].segment_id, 1);
        assert_eq!(finalized.image_assets[0].image.id, "img-1");
    }

    #[test]
    fn latest_selection_wins() {
        let mut store = SelectionStore::new(&segments(3));
        store.select(2, MaterialKind::Video, video("a")).unwrap();
        store.select(2, MaterialKind::Image, image("b")).unwrap();
        store.select(2, MaterialKind::Video, video("c")).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(2).unwrap().data.id(), "c");
        assert_eq!(store.missing(), vec![0, 1]);
    }

    #[test]
    fn finalize_is_refused_until_complete() {
        let mut store = SelectionStore::new(&segments(3));
        store.select(0, MaterialKind::Video, video("a")).unwrap();
        assert_eq!(
            store.finalize(),
            Err(EngineError::IncompleteSelection { missing: vec![1, 2] })
        );
        assert!(SelectionStore::new(&[]).finalize().is_err());
    }

    #[test]
    fn rejects_unknown_segment_and_mismatched_type() {
        let mut store = SelectionStore::new(&segments(1));
        assert_eq!(
            store.select(7, MaterialKind::Video, video("a")),
            Err(EngineError::UnknownSegment(7))
        );
        assert!(matches!(
            store.select(0, MaterialKind::Image, video("a")),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(store.is_empty());
    }
}
