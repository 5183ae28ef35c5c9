//! Daily lesson schedule contracts.
//!
//! The school backend sends each lesson with a free-form time window such as
//! `"19:00 - 20:40"`. This module parses that window and answers whether a
//! lesson is in session at a given local time of day.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One lesson of a user's daily schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyLesson {
    /// Classroom where the lesson happens
    #[serde(default)]
    pub room: String,

    /// Time window, formatted `HH:MM - HH:MM`
    pub time: String,

    /// Lesson abbreviation (e.g. "MAT101")
    pub lesson_abr: String,

    /// Semester of the class attending the lesson
    pub semester: u32,

    /// Course abbreviation (e.g. "GTI")
    pub curse_abr: String,

    /// Weekday the lesson is held on, 0 = Sunday
    pub day: u32,

    /// Surname of the professor in charge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub professor_surname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid lesson time window: {0:?}")]
    InvalidWindow(String),
}

/// Parsed start/end of a lesson, in local time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl LessonWindow {
    pub fn parse(raw: &str) -> Result<Self, ScheduleError> {
        let invalid = || ScheduleError::InvalidWindow(raw.to_string());

        let (start, end) = raw.split_once('-').ok_or_else(invalid)?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").map_err(|_| invalid())?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").map_err(|_| invalid())?;

        Ok(Self { start, end })
    }

    /// Inclusive on both ends. A window whose end precedes its start never
    /// contains anything, so a lesson occurrence always falls on one date.
    pub fn contains(&self, at: NaiveTime) -> bool {
        self.start <= at && at <= self.end
    }
}

impl DailyLesson {
    pub fn window(&self) -> Result<LessonWindow, ScheduleError> {
        LessonWindow::parse(&self.time)
    }

    pub fn is_in_session(&self, at: NaiveTime) -> Result<bool, ScheduleError> {
        Ok(self.window()?.contains(at))
    }
}

/// Find the first lesson whose window contains `at`.
///
/// Lessons with a malformed time window are skipped.
pub fn lesson_in_session(lessons: &[DailyLesson], at: NaiveTime) -> Option<&DailyLesson> {
    lessons.iter().find(|lesson| match lesson.is_in_session(at) {
        Ok(in_session) => in_session,
        Err(e) => {
            tracing::warn!(lesson = %lesson.lesson_abr, error = %e, "skipping lesson");
            false
        }
    })
}
