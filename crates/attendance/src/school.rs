//! School backend: users, schedule, history, faults and roll call storage.

use crate::http::{backend_status, BackendHttp};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use common::{
    attendance::{CheckCallRequest, MakeCallRequest},
    faults::FaultsStats,
    history::HistoryEntry,
    lessons::DailyLesson,
    users::User,
};
use std::{future::Future, sync::Arc};
use telemetry::metrics::record_remote_call;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

#[async_trait]
pub trait SchoolBackend: Send + Sync {
    async fn current_user(&self) -> Result<User>;
    async fn daily_lessons(&self, ra: i64) -> Result<Vec<DailyLesson>>;
    async fn history(&self, ra: i64) -> Result<Vec<HistoryEntry>>;
    async fn faults(&self, ra: i64) -> Result<Vec<FaultsStats>>;

    /// Store a roll call. Returns the records the backend saved.
    async fn make_call(&self, staff_ra: i64, request: &MakeCallRequest)
        -> Result<Vec<serde_json::Value>>;

    /// Lessons of the day the professor has not called yet
    async fn check_pendences(&self, ra: i64, lessons: &[DailyLesson]) -> Result<serde_json::Value>;
}

pub struct HttpSchoolClient {
    http: Arc<BackendHttp>,
}

impl HttpSchoolClient {
    pub fn new(http: Arc<BackendHttp>) -> Self {
        Self { http }
    }
}

/// Serve a read from the backend, falling back to the cached copy when the
/// backend cannot be reached.
async fn with_offline_fallback<T, F>(operation: &str, fetch: F, cached: Option<T>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match fetch.await {
        Ok(value) => {
            record_remote_call("school", operation, true);
            Ok(value)
        }
        Err(e) => {
            record_remote_call("school", operation, false);
            match cached {
                Some(cached) if backend_status(&e).is_none() => {
                    warn!(operation, error = %e, "backend unreachable, using cached copy");
                    Ok(cached)
                }
                _ => Err(e),
            }
        }
    }
}

#[async_trait]
impl SchoolBackend for HttpSchoolClient {
    #[instrument(skip(self))]
    async fn current_user(&self) -> Result<User> {
        let session = self.http.session();
        let user = with_offline_fallback(
            "current_user",
            self.http.get_authorized::<User>("users/data"),
            session.user().await,
        )
        .await?;
        session.set_user(user.clone()).await;
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn daily_lessons(&self, ra: i64) -> Result<Vec<DailyLesson>> {
        let session = self.http.session();
        let path = format!("school/users/{}/dailyLessons", ra);
        let lessons = with_offline_fallback(
            "daily_lessons",
            self.http.get_authorized::<Vec<DailyLesson>>(&path),
            session.daily_lessons().await,
        )
        .await?;
        session.set_daily_lessons(lessons.clone()).await;
        Ok(lessons)
    }

    #[instrument(skip(self))]
    async fn history(&self, ra: i64) -> Result<Vec<HistoryEntry>> {
        let session = self.http.session();
        let path = format!("school/users/{}/history", ra);
        let history = with_offline_fallback(
            "history",
            self.http.get_authorized::<Vec<HistoryEntry>>(&path),
            session.history().await,
        )
        .await?;
        session.set_history(history.clone()).await;
        Ok(history)
    }

    #[instrument(skip(self))]
    async fn faults(&self, ra: i64) -> Result<Vec<FaultsStats>> {
        let session = self.http.session();
        let path = format!("school/users/{}/faults", ra);
        let faults = with_offline_fallback(
            "faults",
            self.http.get_authorized::<Vec<FaultsStats>>(&path),
            session.faults().await,
        )
        .await?;
        session.set_faults(faults.clone()).await;
        Ok(faults)
    }

    #[instrument(skip(self, request), fields(lesson = %request.lesson_abr, students = request.students_ra.len()))]
    async fn make_call(
        &self,
        staff_ra: i64,
        request: &MakeCallRequest,
    ) -> Result<Vec<serde_json::Value>> {
        let path = format!("school/users/{}/makeCall", staff_ra);
        let result: Result<Vec<serde_json::Value>> = self.http.post_authorized(&path, request).await;
        record_remote_call("school", "make_call", result.is_ok());

        let saved = result?;
        info!(saved = saved.len(), "roll call stored");
        Ok(saved)
    }

    #[instrument(skip(self, lessons))]
    async fn check_pendences(&self, ra: i64, lessons: &[DailyLesson]) -> Result<serde_json::Value> {
        let path = format!("school/users/{}/checkCall", ra);
        let body = CheckCallRequest {
            daily_lessons: lessons.to_vec(),
        };
        let result: Result<serde_json::Value> = self.http.post_authorized(&path, &body).await;
        record_remote_call("school", "check_pendences", result.is_ok());
        result
    }
}

/// Mock school backend for testing
#[derive(Default)]
pub struct MockSchoolBackend {
    user: Option<User>,
    lessons: Vec<DailyLesson>,
    history: Vec<HistoryEntry>,
    faults: Vec<FaultsStats>,
    fail_make_call: bool,
    store_nothing: bool,
    stored_only: Option<Vec<String>>,
    calls: Mutex<Vec<(i64, MakeCallRequest)>>,
}

impl MockSchoolBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_lessons(mut self, lessons: Vec<DailyLesson>) -> Self {
        self.lessons = lessons;
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_faults(mut self, faults: Vec<FaultsStats>) -> Self {
        self.faults = faults;
        self
    }

    /// Reject every roll call
    pub fn with_failure(mut self, should_fail: bool) -> Self {
        self.fail_make_call = should_fail;
        self
    }

    /// Accept roll calls but report that nothing was saved
    pub fn storing_nothing(mut self) -> Self {
        self.store_nothing = true;
        self
    }

    /// Accept roll calls but store only the given students
    pub fn storing_only(mut self, ras: &[&str]) -> Self {
        self.stored_only = Some(ras.iter().map(|ra| ra.to_string()).collect());
        self
    }

    /// Roll calls received so far, as `(staff_ra, request)`
    pub async fn calls(&self) -> Vec<(i64, MakeCallRequest)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl SchoolBackend for MockSchoolBackend {
    async fn current_user(&self) -> Result<User> {
        self.user.clone().ok_or_else(|| anyhow!("mock user not set"))
    }

    async fn daily_lessons(&self, _ra: i64) -> Result<Vec<DailyLesson>> {
        Ok(self.lessons.clone())
    }

    async fn history(&self, _ra: i64) -> Result<Vec<HistoryEntry>> {
        Ok(self.history.clone())
    }

    async fn faults(&self, _ra: i64) -> Result<Vec<FaultsStats>> {
        Ok(self.faults.clone())
    }

    async fn make_call(
        &self,
        staff_ra: i64,
        request: &MakeCallRequest,
    ) -> Result<Vec<serde_json::Value>> {
        self.calls.lock().await.push((staff_ra, request.clone()));
        if self.fail_make_call {
            return Err(anyhow!("mock makeCall failed"));
        }
        if self.store_nothing {
            return Ok(Vec::new());
        }

        Ok(request
            .students_ra
            .iter()
            .filter(|ra| {
                self.stored_only
                    .as_ref()
                    .map_or(true, |stored| stored.contains(*ra))
            })
            .map(|ra| serde_json::json!({ "ra": ra, "lessonAbr": request.lesson_abr }))
            .collect())
    }

    async fn check_pendences(&self, _ra: i64, lessons: &[DailyLesson]) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(lessons)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_fallback_uses_cache_on_transport_error() {
        let value = with_offline_fallback(
            "faults",
            async { Err::<Vec<u32>, _>(anyhow!("connection refused")) },
            Some(vec![1, 2]),
        )
        .await
        .unwrap();
        assert_eq!(value, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_offline_fallback_without_cache_fails() {
        let result = with_offline_fallback(
            "faults",
            async { Err::<Vec<u32>, _>(anyhow!("connection refused")) },
            None,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_backend_rejection_is_not_masked_by_cache() {
        let rejection: anyhow::Error = crate::http::BackendError {
            status: reqwest::StatusCode::FORBIDDEN,
            message: "forbidden".to_string(),
        }
        .into();
        let result =
            with_offline_fallback("history", async { Err::<Vec<u32>, _>(rejection) }, Some(vec![7]))
                .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let mock = MockSchoolBackend::new();
        let request = MakeCallRequest {
            lesson_abr: "MAT101".to_string(),
            curse_abr: "GTI".to_string(),
            day: 5,
            time: "19:00 - 20:40".to_string(),
            semester: 3,
            students_ra: vec!["A2".to_string()],
        };

        let saved = mock.make_call(42, &request).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(mock.calls().await, vec![(42, request)]);
    }
}
