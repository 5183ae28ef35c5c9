//! Client-side session context.
//!
//! Holds the bearer token and the last payloads fetched from the backend so a
//! screen can still show something when the network is unavailable. Passed
//! explicitly to every client that needs it.

use async_trait::async_trait;
use common::{faults::FaultsStats, history::HistoryEntry, lessons::DailyLesson, users::User};
use tokio::sync::RwLock;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn token(&self) -> Option<String>;
    async fn set_token(&self, token: String);

    async fn user(&self) -> Option<User>;
    async fn set_user(&self, user: User);

    async fn daily_lessons(&self) -> Option<Vec<DailyLesson>>;
    async fn set_daily_lessons(&self, lessons: Vec<DailyLesson>);

    async fn history(&self) -> Option<Vec<HistoryEntry>>;
    async fn set_history(&self, history: Vec<HistoryEntry>);

    async fn faults(&self) -> Option<Vec<FaultsStats>>;
    async fn set_faults(&self, faults: Vec<FaultsStats>);

    /// Forget everything (logout)
    async fn clear(&self);
}

#[derive(Debug, Clone, Default)]
struct SessionData {
    token: Option<String>,
    user: Option<User>,
    daily_lessons: Option<Vec<DailyLesson>>,
    history: Option<Vec<HistoryEntry>>,
    faults: Option<Vec<FaultsStats>>,
}

/// In-process session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    data: RwLock<SessionData>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            data: RwLock::new(SessionData {
                token: Some(token.into()),
                ..SessionData::default()
            }),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn token(&self) -> Option<String> {
        self.data.read().await.token.clone()
    }

    async fn set_token(&self, token: String) {
        self.data.write().await.token = Some(token);
    }

    async fn user(&self) -> Option<User> {
        self.data.read().await.user.clone()
    }

    async fn set_user(&self, user: User) {
        self.data.write().await.user = Some(user);
    }

    async fn daily_lessons(&self) -> Option<Vec<DailyLesson>> {
        self.data.read().await.daily_lessons.clone()
    }

    async fn set_daily_lessons(&self, lessons: Vec<DailyLesson>) {
        self.data.write().await.daily_lessons = Some(lessons);
    }

    async fn history(&self) -> Option<Vec<HistoryEntry>> {
        self.data.read().await.history.clone()
    }

    async fn set_history(&self, history: Vec<HistoryEntry>) {
        self.data.write().await.history = Some(history);
    }

    async fn faults(&self) -> Option<Vec<FaultsStats>> {
        self.data.read().await.faults.clone()
    }

    async fn set_faults(&self, faults: Vec<FaultsStats>) {
        self.data.write().await.faults = Some(faults);
    }

    async fn clear(&self) {
        *self.data.write().await = SessionData::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::users::Role;

    #[tokio::test]
    async fn test_memory_session_roundtrip_and_clear() {
        let session = MemorySessionStore::with_token("abc");
        assert_eq!(session.token().await.as_deref(), Some("abc"));

        session
            .set_user(User {
                ra: 10,
                surname: "Souza".to_string(),
                role: Role::Professor,
                message: None,
            })
            .await;
        session.set_daily_lessons(vec![]).await;

        assert_eq!(session.user().await.map(|u| u.ra), Some(10));
        assert_eq!(session.daily_lessons().await, Some(vec![]));
        assert!(session.history().await.is_none());

        session.clear().await;
        assert!(session.token().await.is_none());
        assert!(session.user().await.is_none());
        assert!(session.daily_lessons().await.is_none());
    }
}
