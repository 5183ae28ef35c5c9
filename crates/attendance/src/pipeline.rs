//! Roll call pipeline.
//!
//! One run turns one classroom photo into attendance records:
//! capture, detect, crop, match, resolve the daily collection, record the new
//! faces and persist the roll call. A stage error ends the run; the captured
//! image is discarded on every path once it exists.

use crate::{
    capture::{CapturedImage, ImageSource},
    clock::Clock,
    collection::CollectionResolver,
    crop::FaceCropper,
    detection::detect_faces,
    error::{CropError, MatchingError, PipelineError, Stage},
    faces::FaceCollectionStore,
    matching::{match_faces, require_matches, MatchSettings},
    recorder::{persist, record},
    school::SchoolBackend,
};
use common::{attendance::AttendanceRecord, lessons::DailyLesson};
use std::{future::Future, sync::Arc};
use telemetry::metrics::{PIPELINE_RUNS, STAGE_DURATION};
use tracing::{debug, info, instrument, warn};

/// Result of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub faces_detected: usize,
    pub search_succeeded: usize,
    pub search_errored: usize,
    pub search_not_found: usize,
    pub save_succeeded: usize,
    pub save_errored: usize,
    pub already_saved: usize,
    pub collection_id: String,
    /// Records the backend stored, empty when nobody new was recognised
    pub records: Vec<AttendanceRecord>,
    pub warnings: Vec<String>,
}

pub struct AttendancePipeline {
    camera: Arc<dyn ImageSource>,
    faces: Arc<dyn FaceCollectionStore>,
    cropper: Arc<dyn FaceCropper>,
    school: Arc<dyn SchoolBackend>,
    clock: Arc<dyn Clock>,
    matching: MatchSettings,
    resolver: CollectionResolver,
}

async fn timed<T, E, F>(stage: Stage, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    debug!(stage = %stage, "entering stage");
    let timer = STAGE_DURATION
        .with_label_values(&[stage.as_str()])
        .start_timer();
    let result = fut.await;
    timer.observe_duration();
    result
}

impl AttendancePipeline {
    pub fn new(
        camera: Arc<dyn ImageSource>,
        faces: Arc<dyn FaceCollectionStore>,
        cropper: Arc<dyn FaceCropper>,
        school: Arc<dyn SchoolBackend>,
        clock: Arc<dyn Clock>,
        matching: MatchSettings,
    ) -> Self {
        let resolver = CollectionResolver::new(faces.clone());
        Self {
            camera,
            faces,
            cropper,
            school,
            clock,
            matching,
            resolver,
        }
    }

    /// Take the roll call for the lesson of `schedule` in session now.
    #[instrument(skip(self, schedule), fields(lessons = schedule.len()))]
    pub async fn run(
        &self,
        staff_ra: i64,
        schedule: &[DailyLesson],
    ) -> Result<PipelineOutcome, PipelineError> {
        let result = self.run_inner(staff_ra, schedule).await;

        match &result {
            Ok(outcome) => {
                PIPELINE_RUNS.with_label_values(&["done"]).inc();
                info!(
                    faces = outcome.faces_detected,
                    saved = outcome.save_succeeded,
                    already_saved = outcome.already_saved,
                    not_found = outcome.search_not_found,
                    "roll call done"
                );
            }
            Err(e) => {
                let stage = e.stage();
                PIPELINE_RUNS.with_label_values(&[stage.as_str()]).inc();
                warn!(stage = %stage, error = %e, "roll call failed");
            }
        }

        result
    }

    async fn run_inner(
        &self,
        staff_ra: i64,
        schedule: &[DailyLesson],
    ) -> Result<PipelineOutcome, PipelineError> {
        let image = timed(Stage::Capturing, self.camera.capture()).await?;

        let result = self.process(&image, staff_ra, schedule).await;

        if let Err(e) = self.camera.discard(image).await {
            warn!(error = %e, "failed to discard captured image");
        }

        result
    }

    async fn process(
        &self,
        image: &CapturedImage,
        staff_ra: i64,
        schedule: &[DailyLesson],
    ) -> Result<PipelineOutcome, PipelineError> {
        let bytes = timed(Stage::Capturing, image.read_bytes()).await?;

        let detected = timed(Stage::Detecting, detect_faces(self.faces.as_ref(), &bytes)).await?;

        let crops = timed(Stage::Cropping, async {
            let crops = self.cropper.crop(&bytes, &detected).await?;
            if crops.is_empty() {
                return Err(CropError::Empty);
            }
            Ok::<_, CropError>(crops)
        })
        .await?;

        let matched = timed(Stage::Matching, async {
            let summary = match_faces(self.faces.as_ref(), &self.matching, crops).await;
            require_matches(&summary)?;
            Ok::<_, MatchingError>(summary)
        })
        .await?;

        let resolved = timed(
            Stage::ResolvingCollection,
            self.resolver.resolve(schedule, self.clock.now()),
        )
        .await?;

        let recorded = timed(
            Stage::Recording,
            record(self.faces.as_ref(), &resolved.id, &matched.matched),
        )
        .await?;

        let records = if recorded.saved.is_empty() {
            info!(collection = %resolved.id, "no new student to register");
            Vec::new()
        } else {
            timed(
                Stage::Persisting,
                persist(
                    self.school.as_ref(),
                    staff_ra,
                    &resolved.lesson,
                    resolved.date,
                    recorded.saved.clone(),
                ),
            )
            .await?
        };

        let mut warnings = matched.warnings();
        if recorded.save_errored() > 0 {
            warnings.push(format!(
                "{} students could not be saved",
                recorded.save_errored()
            ));
        }
        let unstored = recorded.saved.len() - records.len();
        if unstored > 0 {
            warnings.push(format!(
                "{} students were not stored by the school system",
                unstored
            ));
        }

        Ok(PipelineOutcome {
            faces_detected: detected.len(),
            search_succeeded: matched.search_succeeded(),
            search_errored: matched.search_errored(),
            search_not_found: matched.search_not_found(),
            save_succeeded: recorded.save_succeeded(),
            save_errored: recorded.save_errored(),
            already_saved: recorded.already_saved_count(),
            collection_id: resolved.id,
            records,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::MemoryImageSource,
        clock::FixedClock,
        crop::MockFaceCropper,
        faces::MemoryFaceStore,
        school::MockSchoolBackend,
    };
    use chrono::NaiveDate;
    use common::faces::{BoundingBox, DetectedFace};

    fn faces(n: usize) -> Vec<DetectedFace> {
        (0..n)
            .map(|i| DetectedFace {
                bounding_box: BoundingBox {
                    width: 0.1,
                    height: 0.1,
                    left: 0.1 * i as f32,
                    top: 0.2,
                },
                confidence: 99.0,
            })
            .collect()
    }

    fn schedule() -> Vec<DailyLesson> {
        vec![DailyLesson {
            room: "Lab 3".to_string(),
            time: "19:00 - 20:40".to_string(),
            lesson_abr: "MAT101".to_string(),
            semester: 3,
            curse_abr: "GTI".to_string(),
            day: 5,
            professor_surname: None,
        }]
    }

    #[tokio::test]
    async fn test_run_registers_recognised_students() {
        let camera = Arc::new(MemoryImageSource::new(b"photo".to_vec()));
        let store = Arc::new(
            MemoryFaceStore::new()
                .with_faces(faces(2))
                .with_identity(b"f0".to_vec(), "A1")
                .with_identity(b"f1".to_vec(), "A2"),
        );
        let school = Arc::new(MockSchoolBackend::new());
        let now = NaiveDate::from_ymd_opt(2024, 11, 29)
            .unwrap()
            .and_hms_opt(19, 30, 0)
            .unwrap();

        let pipeline = AttendancePipeline::new(
            camera.clone(),
            store.clone(),
            Arc::new(MockFaceCropper::new(vec![b"f0".to_vec(), b"f1".to_vec()])),
            school.clone(),
            Arc::new(FixedClock(now)),
            MatchSettings::new("students"),
        );

        let outcome = pipeline.run(10, &schedule()).await.unwrap();

        assert_eq!(outcome.faces_detected, 2);
        assert_eq!(outcome.save_succeeded, 2);
        assert_eq!(outcome.collection_id, "MAT3semesterGTI-29-11-2024");
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.warnings.is_empty());
        assert_eq!(camera.discard_count(), 1);

        // second photo of the same class: nobody new
        let outcome = pipeline.run(10, &schedule()).await.unwrap();
        assert_eq!(outcome.already_saved, 2);
        assert!(outcome.records.is_empty());
        assert_eq!(school.calls().await.len(), 1);
        assert_eq!(camera.discard_count(), 2);
    }
}
