//! Naming of the per-lesson, per-day face collections.
//!
//! The identifier is an external contract shared with every device that takes
//! the roll call for the same lesson, so it must be built exactly as
//! `{lessonAbr letters}{semester}semester{curseAbr}-{dd}-{mm}-{yyyy}`.

use chrono::NaiveDate;

use crate::lessons::DailyLesson;

/// Keep only ASCII letters of a lesson abbreviation
pub fn sanitize_lesson_abr(lesson_abr: &str) -> String {
    lesson_abr
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect()
}

pub fn daily_collection_id(
    lesson_abr: &str,
    semester: u32,
    curse_abr: &str,
    date: NaiveDate,
) -> String {
    format!(
        "{}{}semester{}-{}",
        sanitize_lesson_abr(lesson_abr),
        semester,
        curse_abr,
        date.format("%d-%m-%Y")
    )
}

impl DailyLesson {
    /// Collection holding the faces recorded for this lesson on `date`
    pub fn collection_id(&self, date: NaiveDate) -> String {
        daily_collection_id(&self.lesson_abr, self.semester, &self.curse_abr, date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_id_format() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 29).unwrap();
        assert_eq!(
            daily_collection_id("MAT101", 3, "GTI", date),
            "MAT3semesterGTI-29-11-2024"
        );
        assert_eq!(
            daily_collection_id("NEG. ELETRONIC", 6, "GTI", date),
            "NEGELETRONIC6semesterGTI-29-11-2024"
        );
    }

    #[test]
    fn test_collection_id_pads_day_and_month() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        assert_eq!(
            daily_collection_id("PROJ-TI III", 5, "ADS", date),
            "PROJTIIII5semesterADS-04-03-2025"
        );
    }

    #[test]
    fn test_collection_id_is_stable() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 29).unwrap();
        let first = daily_collection_id("MAT101", 3, "GTI", date);
        let second = daily_collection_id("MAT101", 3, "GTI", date);
        assert_eq!(first, second);
    }

    #[test]
    fn test_lesson_collection_id() {
        let lesson = DailyLesson {
            room: String::new(),
            time: "19:00 - 20:40".to_string(),
            lesson_abr: "TOPAVANCEMTI".to_string(),
            semester: 6,
            curse_abr: "GTI".to_string(),
            day: 3,
            professor_surname: None,
        };
        let date = NaiveDate::from_ymd_opt(2024, 12, 11).unwrap();
        assert_eq!(lesson.collection_id(date), "TOPAVANCEMTI6semesterGTI-11-12-2024");
    }
}
