//! Per-face search against the enrollment collection.
//!
//! Faces are searched one at a time. A failing search is classified and the
//! batch moves on; the stage only fails when no face matched at all.

use crate::{error::MatchingError, faces::FaceCollectionStore};
use common::faces::{FaceCrop, FaceMatch};
use futures::stream::{self, StreamExt};
use telemetry::metrics::FACES;
use tracing::{debug, instrument, warn};

pub const DEFAULT_MATCH_THRESHOLD: f32 = 80.0;

#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Collection holding the enrolled students
    pub collection_id: String,
    pub threshold: f32,
    pub max_results: i32,
}

impl MatchSettings {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            threshold: DEFAULT_MATCH_THRESHOLD,
            max_results: 1,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Matched(FaceMatch),
    NotFound,
    Error(String),
}

impl MatchResult {
    fn label(&self) -> &'static str {
        match self {
            MatchResult::Matched(_) => "matched",
            MatchResult::NotFound => "not_found",
            MatchResult::Error(_) => "error",
        }
    }
}

/// A crop together with the student it was recognised as
#[derive(Debug, Clone)]
pub struct MatchedFace {
    pub crop: FaceCrop,
    pub identity: FaceMatch,
}

#[derive(Debug, Clone, Default)]
pub struct MatchSummary {
    pub matched: Vec<MatchedFace>,
    /// Face indexes without a candidate above the threshold
    pub not_found: Vec<usize>,
    /// Face indexes whose search failed, with the reason
    pub errored: Vec<(usize, String)>,
}

impl MatchSummary {
    fn with(mut self, crop: FaceCrop, result: MatchResult) -> Self {
        match result {
            MatchResult::Matched(identity) => self.matched.push(MatchedFace { crop, identity }),
            MatchResult::NotFound => self.not_found.push(crop.face_index),
            MatchResult::Error(reason) => self.errored.push((crop.face_index, reason)),
        }
        self
    }

    pub fn search_succeeded(&self) -> usize {
        self.matched.len()
    }

    pub fn search_not_found(&self) -> usize {
        self.not_found.len()
    }

    pub fn search_errored(&self) -> usize {
        self.errored.len()
    }

    pub fn total(&self) -> usize {
        self.search_succeeded() + self.search_not_found() + self.search_errored()
    }

    /// Non-fatal problems of the stage, worded for the professor
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        match self.search_not_found() {
            0 => {}
            1 => warnings.push("One of the students was not found in the class".to_string()),
            n => warnings.push(format!("{} students were not found in the class", n)),
        }
        if self.search_errored() > 0 {
            warnings.push(format!(
                "Could not search the face of {} students in the class",
                self.search_errored()
            ));
        }
        warnings
    }
}

async fn match_face(
    store: &dyn FaceCollectionStore,
    settings: &MatchSettings,
    crop: &FaceCrop,
) -> MatchResult {
    match store
        .search_by_image(
            &settings.collection_id,
            &crop.bytes,
            settings.max_results,
            settings.threshold,
        )
        .await
    {
        Ok(candidates) => candidates
            .into_iter()
            .next()
            .map(MatchResult::Matched)
            .unwrap_or(MatchResult::NotFound),
        Err(e) => MatchResult::Error(format!("{:#}", e)),
    }
}

/// Search every crop and classify it
#[instrument(skip_all, fields(collection = %settings.collection_id, crops = crops.len()))]
pub async fn match_faces(
    store: &dyn FaceCollectionStore,
    settings: &MatchSettings,
    crops: Vec<FaceCrop>,
) -> MatchSummary {
    stream::iter(crops)
        .fold(MatchSummary::default(), move |summary, crop| async move {
            let result = match_face(store, settings, &crop).await;
            FACES.with_label_values(&["matching", result.label()]).inc();
            match &result {
                MatchResult::Matched(m) => {
                    debug!(face = crop.face_index, ra = %m.ra, similarity = m.similarity, "face matched")
                }
                MatchResult::NotFound => debug!(face = crop.face_index, "face not found"),
                MatchResult::Error(reason) => {
                    warn!(face = crop.face_index, error = %reason, "face search failed")
                }
            }
            summary.with(crop, result)
        })
        .await
}

/// Fails when not a single face could be matched
pub fn require_matches(summary: &MatchSummary) -> Result<(), MatchingError> {
    if summary.matched.is_empty() {
        return Err(MatchingError::NoStudentsFound {
            not_found: summary.search_not_found(),
            errored: summary.search_errored(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::MemoryFaceStore;

    fn crops(images: &[&[u8]]) -> Vec<FaceCrop> {
        images
            .iter()
            .enumerate()
            .map(|(i, bytes)| FaceCrop::new(i, bytes.to_vec()))
            .collect()
    }

    #[tokio::test]
    async fn test_classifies_every_crop() {
        let store = MemoryFaceStore::new()
            .with_identity(b"a1".to_vec(), "A1")
            .with_identity(b"a2".to_vec(), "A2");
        let settings = MatchSettings::new("students");

        let summary = match_faces(&store, &settings, crops(&[b"a1", b"a2", b"x"])).await;

        assert_eq!(summary.search_succeeded(), 2);
        assert_eq!(summary.search_not_found(), 1);
        assert_eq!(summary.search_errored(), 0);
        assert_eq!(summary.not_found, vec![2]);
        let ras: Vec<&str> = summary.matched.iter().map(|m| m.identity.ra.as_str()).collect();
        assert_eq!(ras, vec!["A1", "A2"]);
        assert_eq!(
            summary.warnings(),
            vec!["One of the students was not found in the class".to_string()]
        );
    }

    #[tokio::test]
    async fn test_search_error_does_not_stop_the_batch() {
        let store = MemoryFaceStore::new()
            .with_search_error(b"bad".to_vec())
            .with_identity(b"a3".to_vec(), "A3");
        let settings = MatchSettings::new("students");

        let summary = match_faces(&store, &settings, crops(&[b"bad", b"a3"])).await;

        assert_eq!(summary.total(), 2);
        assert_eq!(summary.search_errored(), 1);
        assert_eq!(summary.matched[0].identity.ra, "A3");
        assert_eq!(summary.matched[0].crop.face_index, 1);
        assert!(require_matches(&summary).is_ok());
    }

    #[tokio::test]
    async fn test_threshold_above_similarity_finds_nobody() {
        let store = MemoryFaceStore::new().with_identity(b"a1".to_vec(), "A1");
        let settings = MatchSettings::new("students").with_threshold(99.5);

        let summary = match_faces(&store, &settings, crops(&[b"a1"])).await;
        assert_eq!(summary.search_not_found(), 1);

        let err = require_matches(&summary).unwrap_err();
        assert!(matches!(
            err,
            MatchingError::NoStudentsFound {
                not_found: 1,
                errored: 0
            }
        ));
        assert_eq!(summary.warnings().len(), 1);
    }
}
