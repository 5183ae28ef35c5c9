//! Attendance history entries and the filters applied when browsing them.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One line of a user's attendance history.
///
/// For a professor each entry is a student of one of their calls; for a
/// student each entry is one of their own presences or absences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Date and time of the call, as sent by the backend
    pub call_date: String,
    pub lesson_abr: String,
    #[serde(default)]
    pub class_desc: String,
    #[serde(default)]
    pub curse_abr: String,
    pub ra: i64,
    #[serde(default)]
    pub user_name: String,
    /// Base64-encoded JPEG
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_photo: Option<String>,
    #[serde(default)]
    pub have_presence: bool,
}

impl HistoryEntry {
    /// Call date in local time, if the backend sent a parseable value
    pub fn call_datetime(&self) -> Option<NaiveDateTime> {
        parse_call_date(&self.call_date)
    }
}

/// Parse a backend timestamp. Offset-qualified values are converted to local
/// time; naive values are taken as already local.
pub fn parse_call_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Local).naive_local());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Distinct lesson abbreviations, in the order they first appear
pub fn lessons_in_history(entries: &[HistoryEntry]) -> Vec<String> {
    let mut lessons: Vec<String> = Vec::new();
    for entry in entries {
        if !lessons.contains(&entry.lesson_abr) {
            lessons.push(entry.lesson_abr.clone());
        }
    }
    lessons
}

/// Entries of `lesson_abr` whose call happened on `date`
pub fn filter_history<'a>(
    entries: &'a [HistoryEntry],
    lesson_abr: &str,
    date: NaiveDate,
) -> Vec<&'a HistoryEntry> {
    entries
        .iter()
        .filter(|entry| entry.lesson_abr == lesson_abr)
        .filter(|entry| entry.call_datetime().map(|dt| dt.date()) == Some(date))
        .collect()
}

/// Avatar initials: first letter of the first and the last name
pub fn initials(name: &str) -> String {
    let mut parts = name.split_whitespace();
    let Some(first) = parts.next() else {
        return String::new();
    };
    let last = parts.last().unwrap_or(first);

    first
        .chars()
        .take(1)
        .chain(last.chars().take(1))
        .collect::<String>()
        .to_uppercase()
}
