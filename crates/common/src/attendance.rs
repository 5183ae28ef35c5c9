//! Roll call contracts exchanged with the school backend.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::lessons::DailyLesson;

/// Body of `POST /school/users/{ra}/makeCall`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MakeCallRequest {
    pub lesson_abr: String,
    pub curse_abr: String,
    pub day: u32,
    pub time: String,
    pub semester: u32,

    /// Registration numbers of the students marked present
    pub students_ra: Vec<String>,
}

impl MakeCallRequest {
    pub fn for_lesson(lesson: &DailyLesson, students_ra: Vec<String>) -> Self {
        Self {
            lesson_abr: lesson.lesson_abr.clone(),
            curse_abr: lesson.curse_abr.clone(),
            day: lesson.day,
            time: lesson.time.clone(),
            semester: lesson.semester,
            students_ra,
        }
    }
}

/// A confirmed presence of one student in one lesson on one date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AttendanceRecord {
    pub student_ra: String,
    pub lesson_abr: String,
    pub date: NaiveDate,
}

impl AttendanceRecord {
    pub fn new(student_ra: impl Into<String>, lesson_abr: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            student_ra: student_ra.into(),
            lesson_abr: lesson_abr.into(),
            date,
        }
    }
}

/// Registration number a makeCall receipt confirms, if it names one.
///
/// The backend answers with one receipt per stored presence: either the bare
/// RA or an object carrying it under `ra` or `studentRa`.
pub fn receipt_student_ra(receipt: &serde_json::Value) -> Option<String> {
    use serde_json::Value;

    match receipt {
        Value::String(ra) => Some(ra.clone()),
        Value::Number(ra) => Some(ra.to_string()),
        Value::Object(fields) => ["ra", "studentRa"]
            .iter()
            .find_map(|key| fields.get(*key))
            .and_then(receipt_student_ra),
        _ => None,
    }
}

/// Body of `POST /school/users/{ra}/checkCall`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckCallRequest {
    pub daily_lessons: Vec<DailyLesson>,
}
