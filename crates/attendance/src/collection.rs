//! Daily collection resolution.
//!
//! Every lesson occurrence gets its own face collection, named after the
//! lesson in session and the date. The resolver creates it on first use and
//! remembers it afterwards, so repeated runs for the same lesson and day share
//! one collection and create it at most once.

use crate::{error::CollectionResolutionError, faces::FaceCollectionStore};
use chrono::{NaiveDate, NaiveDateTime};
use common::{
    faces::CreateCollectionOutcome,
    lessons::{lesson_in_session, DailyLesson},
};
use std::{collections::HashSet, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Collection of the lesson in session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCollection {
    pub id: String,
    pub lesson: DailyLesson,
    pub date: NaiveDate,
}

pub struct CollectionResolver {
    store: Arc<dyn FaceCollectionStore>,
    known: Mutex<HashSet<String>>,
}

impl CollectionResolver {
    pub fn new(store: Arc<dyn FaceCollectionStore>) -> Self {
        Self {
            store,
            known: Mutex::new(HashSet::new()),
        }
    }

    #[instrument(skip(self, schedule), fields(lessons = schedule.len()))]
    pub async fn resolve(
        &self,
        schedule: &[DailyLesson],
        now: NaiveDateTime,
    ) -> Result<ResolvedCollection, CollectionResolutionError> {
        let lesson = lesson_in_session(schedule, now.time())
            .ok_or(CollectionResolutionError::NoLessonInSession(now.time()))?;
        let date = now.date();
        let id = lesson.collection_id(date);

        // held across check and create so concurrent runs create at most once
        let mut known = self.known.lock().await;
        if !known.contains(&id) {
            self.ensure_exists(&id).await?;
            known.insert(id.clone());
        } else {
            debug!(collection = %id, "collection already resolved");
        }

        Ok(ResolvedCollection {
            id,
            lesson: lesson.clone(),
            date,
        })
    }

    async fn ensure_exists(&self, id: &str) -> Result<(), CollectionResolutionError> {
        let exists = self.store.collection_exists(id).await.map_err(|e| {
            CollectionResolutionError::Lookup {
                id: id.to_string(),
                reason: format!("{:#}", e),
            }
        })?;
        if exists {
            return Ok(());
        }

        let outcome = self.store.create_collection(id).await.map_err(|e| {
            CollectionResolutionError::Creation {
                id: id.to_string(),
                reason: format!("{:#}", e),
            }
        })?;
        match outcome {
            CreateCollectionOutcome::Created => info!(collection = %id, "daily collection created"),
            CreateCollectionOutcome::AlreadyExists => {
                debug!(collection = %id, "daily collection created concurrently")
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::{FaceOperation, MemoryFaceStore};

    fn schedule() -> Vec<DailyLesson> {
        vec![
            DailyLesson {
                room: "12".to_string(),
                time: "07:40 - 09:20".to_string(),
                lesson_abr: "ENG202".to_string(),
                semester: 2,
                curse_abr: "ADS".to_string(),
                day: 5,
                professor_surname: None,
            },
            DailyLesson {
                room: "Lab 3".to_string(),
                time: "19:00 - 20:40".to_string(),
                lesson_abr: "MAT101".to_string(),
                semester: 3,
                curse_abr: "GTI".to_string(),
                day: 5,
                professor_surname: None,
            },
        ]
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 11, 29)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_resolves_lesson_in_session_and_creates_once() {
        let store = Arc::new(MemoryFaceStore::new());
        let resolver = CollectionResolver::new(store.clone());

        let first = resolver.resolve(&schedule(), at(19, 30)).await.unwrap();
        let second = resolver.resolve(&schedule(), at(20, 40)).await.unwrap();

        assert_eq!(first.id, "MAT3semesterGTI-29-11-2024");
        assert_eq!(first, second);
        assert_eq!(first.lesson.lesson_abr, "MAT101");
        assert_eq!(store.call_count(FaceOperation::CreateCollection).await, 1);
        assert!(store.members(&first.id).await.is_some());
    }

    #[tokio::test]
    async fn test_existing_collection_is_not_recreated() {
        let store = Arc::new(
            MemoryFaceStore::new().with_collection("ENGsemesterADS-29-11-2024", &[]),
        );
        let resolver = CollectionResolver::new(store.clone());

        let resolved = resolver.resolve(&schedule(), at(7, 40)).await.unwrap();
        assert_eq!(resolved.id, "ENG2semesterADS-29-11-2024");
        // different id from the seeded one, so it is created
        assert_eq!(store.call_count(FaceOperation::CreateCollection).await, 1);

        let store = Arc::new(
            MemoryFaceStore::new().with_collection("ENG2semesterADS-29-11-2024", &[]),
        );
        let resolver = CollectionResolver::new(store.clone());
        resolver.resolve(&schedule(), at(8, 0)).await.unwrap();
        assert_eq!(store.call_count(FaceOperation::CreateCollection).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_resolution_creates_once() {
        let store = Arc::new(MemoryFaceStore::new());
        let resolver = Arc::new(CollectionResolver::new(store.clone()));
        let lessons = schedule();

        let (a, b) = tokio::join!(
            resolver.resolve(&lessons, at(19, 5)),
            resolver.resolve(&lessons, at(19, 6))
        );
        assert_eq!(a.unwrap().id, b.unwrap().id);
        assert_eq!(store.call_count(FaceOperation::CreateCollection).await, 1);
    }

    #[tokio::test]
    async fn test_no_lesson_in_session() {
        let store = Arc::new(MemoryFaceStore::new());
        let resolver = CollectionResolver::new(store.clone());

        let err = resolver.resolve(&schedule(), at(12, 0)).await.unwrap_err();
        assert!(matches!(err, CollectionResolutionError::NoLessonInSession(_)));
        assert_eq!(store.call_count(FaceOperation::ListCollections).await, 0);
    }

    #[tokio::test]
    async fn test_lesson_across_midnight_never_resolves() {
        let store = Arc::new(MemoryFaceStore::new());
        let resolver = CollectionResolver::new(store.clone());
        let mut lessons = schedule();
        lessons[1].time = "23:00 - 00:30".to_string();

        let late = resolver.resolve(&lessons, at(23, 30)).await.unwrap_err();
        assert!(matches!(late, CollectionResolutionError::NoLessonInSession(_)));

        let next_day = NaiveDate::from_ymd_opt(2024, 11, 30)
            .unwrap()
            .and_hms_opt(0, 15, 0)
            .unwrap();
        let early = resolver.resolve(&lessons, next_day).await.unwrap_err();
        assert!(matches!(early, CollectionResolutionError::NoLessonInSession(_)));

        assert_eq!(store.call_count(FaceOperation::CreateCollection).await, 0);
    }

    #[tokio::test]
    async fn test_creation_failure() {
        let store = Arc::new(MemoryFaceStore::new().with_failure(FaceOperation::CreateCollection));
        let resolver = CollectionResolver::new(store);

        let err = resolver.resolve(&schedule(), at(19, 0)).await.unwrap_err();
        assert!(matches!(err, CollectionResolutionError::Creation { .. }));
    }
}
