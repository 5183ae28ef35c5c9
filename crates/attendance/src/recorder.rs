//! Enrollment of recognised students in the daily collection and storage of
//! the roll call in the school backend.

use crate::{
    error::{PersistenceError, RecordError},
    faces::FaceCollectionStore,
    matching::MatchedFace,
    school::SchoolBackend,
};
use common::{
    attendance::{receipt_student_ra, AttendanceRecord, MakeCallRequest},
    lessons::DailyLesson,
};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use telemetry::metrics::FACES;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Saved { face_id: String },
    AlreadySaved,
    Errored(String),
}

impl IndexOutcome {
    fn label(&self) -> &'static str {
        match self {
            IndexOutcome::Saved { .. } => "saved",
            IndexOutcome::AlreadySaved => "already_saved",
            IndexOutcome::Errored(_) => "error",
        }
    }
}

/// Students classified by the recording stage, by registration number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub saved: Vec<String>,
    pub already_saved: Vec<String>,
    pub errored: Vec<(String, String)>,
}

impl RecordSummary {
    pub fn save_succeeded(&self) -> usize {
        self.saved.len()
    }

    pub fn save_errored(&self) -> usize {
        self.errored.len()
    }

    pub fn already_saved_count(&self) -> usize {
        self.already_saved.len()
    }

    fn with(mut self, ra: String, outcome: IndexOutcome) -> Self {
        match outcome {
            IndexOutcome::Saved { .. } => self.saved.push(ra),
            IndexOutcome::AlreadySaved => self.already_saved.push(ra),
            IndexOutcome::Errored(reason) => self.errored.push((ra, reason)),
        }
        self
    }
}

/// Index every matched face not yet in the collection.
///
/// Membership is read once for the whole batch. Students indexed earlier in
/// the same batch count as already saved.
#[instrument(skip(store, matches), fields(matches = matches.len()))]
pub async fn record(
    store: &dyn FaceCollectionStore,
    collection_id: &str,
    matches: &[MatchedFace],
) -> Result<RecordSummary, RecordError> {
    let members = store
        .list_members(collection_id)
        .await
        .map_err(|e| RecordError::Membership {
            id: collection_id.to_string(),
            reason: format!("{:#}", e),
        })?;
    let snapshot: HashSet<String> = members.into_iter().map(|m| m.ra).collect();
    debug!(members = snapshot.len(), "collection membership loaded");

    let (_, summary) = stream::iter(matches)
        .fold(
            (snapshot, RecordSummary::default()),
            move |(mut snapshot, summary), matched| async move {
                let ra = matched.identity.ra.clone();
                let outcome = if snapshot.contains(&ra) {
                    IndexOutcome::AlreadySaved
                } else {
                    match store
                        .index_face(collection_id, &matched.crop.bytes, &ra)
                        .await
                    {
                        Ok(face_id) => {
                            snapshot.insert(ra.clone());
                            IndexOutcome::Saved { face_id }
                        }
                        Err(e) => IndexOutcome::Errored(format!("{:#}", e)),
                    }
                };

                FACES.with_label_values(&["recording", outcome.label()]).inc();
                match &outcome {
                    IndexOutcome::Saved { face_id } => debug!(ra = %ra, face_id = %face_id, "face indexed"),
                    IndexOutcome::AlreadySaved => debug!(ra = %ra, "student already recorded"),
                    IndexOutcome::Errored(reason) => warn!(ra = %ra, error = %reason, "failed to index face"),
                }
                (snapshot, summary.with(ra, outcome))
            },
        )
        .await;

    Ok(summary)
}

/// Store the roll call of the newly saved students
#[instrument(skip(school, lesson, students_ra), fields(lesson = %lesson.lesson_abr, students = students_ra.len()))]
pub async fn persist(
    school: &dyn SchoolBackend,
    staff_ra: i64,
    lesson: &DailyLesson,
    date: NaiveDate,
    students_ra: Vec<String>,
) -> Result<Vec<AttendanceRecord>, PersistenceError> {
    let request = MakeCallRequest::for_lesson(lesson, students_ra);
    let stored = school
        .make_call(staff_ra, &request)
        .await
        .map_err(|e| PersistenceError::Backend(format!("{:#}", e)))?;

    let requested = request.students_ra.len();
    let confirmed: HashSet<String> = stored.iter().filter_map(receipt_student_ra).collect();
    let students: Vec<String> = if confirmed.is_empty() {
        // anonymous receipts only tell how many presences were stored
        request.students_ra.into_iter().take(stored.len()).collect()
    } else {
        request
            .students_ra
            .into_iter()
            .filter(|ra| confirmed.contains(ra))
            .collect()
    };

    if students.is_empty() {
        return Err(PersistenceError::NothingStored);
    }
    if students.len() < requested {
        warn!(requested, stored = students.len(), "backend stored part of the roll call");
    }

    info!(stored = students.len(), "attendance registered");
    Ok(students
        .into_iter()
        .map(|ra| AttendanceRecord::new(ra, lesson.lesson_abr.clone(), date))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        faces::{FaceOperation, MemoryFaceStore},
        school::MockSchoolBackend,
    };
    use common::faces::{FaceCrop, FaceMatch};

    fn matched(index: usize, ra: &str) -> MatchedFace {
        MatchedFace {
            crop: FaceCrop::new(index, ra.as_bytes().to_vec()),
            identity: FaceMatch {
                ra: ra.to_string(),
                face_id: format!("enrolled-{}", ra),
                similarity: 97.0,
            },
        }
    }

    fn lesson() -> DailyLesson {
        DailyLesson {
            room: "Lab 3".to_string(),
            time: "19:00 - 20:40".to_string(),
            lesson_abr: "MAT101".to_string(),
            semester: 3,
            curse_abr: "GTI".to_string(),
            day: 5,
            professor_surname: None,
        }
    }

    #[tokio::test]
    async fn test_members_are_not_reindexed() {
        let store = MemoryFaceStore::new().with_collection("day", &["A1"]);

        let summary = record(&store, "day", &[matched(0, "A1"), matched(1, "A2")])
            .await
            .unwrap();

        assert_eq!(summary.saved, vec!["A2".to_string()]);
        assert_eq!(summary.already_saved, vec!["A1".to_string()]);
        assert_eq!(summary.save_errored(), 0);
        assert_eq!(store.call_count(FaceOperation::IndexFace).await, 1);
        assert_eq!(store.call_count(FaceOperation::ListMembers).await, 1);
    }

    #[tokio::test]
    async fn test_index_error_is_isolated() {
        let store = MemoryFaceStore::new()
            .with_collection("day", &[])
            .with_index_error("A1");

        let matches = [matched(0, "A1"), matched(1, "A2"), matched(2, "A2")];
        let summary = record(&store, "day", &matches).await.unwrap();

        assert_eq!(summary.save_errored(), 1);
        assert_eq!(summary.saved, vec!["A2".to_string()]);
        assert_eq!(summary.already_saved, vec!["A2".to_string()]);
        assert_eq!(
            summary.save_succeeded() + summary.already_saved_count() + summary.save_errored(),
            matches.len()
        );
    }

    #[tokio::test]
    async fn test_membership_failure_fails_the_stage() {
        let store = MemoryFaceStore::new().with_failure(FaceOperation::ListMembers);
        let err = record(&store, "day", &[matched(0, "A1")]).await.unwrap_err();
        assert!(matches!(err, RecordError::Membership { .. }));
        assert_eq!(store.call_count(FaceOperation::IndexFace).await, 0);
    }

    #[tokio::test]
    async fn test_persist_sends_lesson_and_students() {
        let school = MockSchoolBackend::new();
        let date = NaiveDate::from_ymd_opt(2024, 11, 29).unwrap();

        let records = persist(&school, 77, &lesson(), date, vec!["A2".to_string()])
            .await
            .unwrap();

        assert_eq!(records, vec![AttendanceRecord::new("A2", "MAT101", date)]);
        let calls = school.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 77);
        assert_eq!(calls[0].1.time, "19:00 - 20:40");
        assert_eq!(calls[0].1.students_ra, vec!["A2".to_string()]);
    }

    #[tokio::test]
    async fn test_persist_keeps_only_stored_students() {
        let school = MockSchoolBackend::new().storing_only(&["A1"]);
        let date = NaiveDate::from_ymd_opt(2024, 11, 29).unwrap();

        let records = persist(
            &school,
            77,
            &lesson(),
            date,
            vec!["A1".to_string(), "A2".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(records, vec![AttendanceRecord::new("A1", "MAT101", date)]);
        assert_eq!(school.calls().await[0].1.students_ra.len(), 2);
    }

    #[tokio::test]
    async fn test_persist_failures() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 29).unwrap();

        let failing = MockSchoolBackend::new().with_failure(true);
        let err = persist(&failing, 1, &lesson(), date, vec!["A1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Backend(_)));

        let empty = MockSchoolBackend::new().storing_nothing();
        let err = persist(&empty, 1, &lesson(), date, vec!["A1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::NothingStored));
    }
}
