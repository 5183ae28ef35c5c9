//! Absence statistics per lesson.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaultsStats {
    pub lesson_abr: String,
    #[serde(default)]
    pub lesson_name: String,
    #[serde(default)]
    pub class_desc: String,
    #[serde(default)]
    pub curse_abr: String,
    #[serde(default)]
    pub professor_surname: String,
    #[serde(default)]
    pub total_calls: u32,
    #[serde(default)]
    pub total_falts: u32,
    /// Share of missed calls, in percent. Absent when no call happened yet.
    #[serde(default)]
    pub percent_falts: Option<f64>,
    #[serde(default)]
    pub max_falts: u32,
}

impl FaultsStats {
    pub fn faults_percent(&self) -> f64 {
        self.percent_falts.unwrap_or(0.0)
    }

    pub fn presence_percent(&self) -> f64 {
        100.0 - self.faults_percent()
    }

    /// Absences still allowed before reaching the limit
    pub fn remaining_faults(&self) -> u32 {
        self.max_falts.saturating_sub(self.total_falts)
    }
}

pub fn select_faults<'a>(stats: &'a [FaultsStats], lesson_abr: &str) -> Option<&'a FaultsStats> {
    stats.iter().find(|s| s.lesson_abr == lesson_abr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(lesson: &str, percent: Option<f64>, total: u32, max: u32) -> FaultsStats {
        FaultsStats {
            lesson_abr: lesson.to_string(),
            lesson_name: "Projeto de TI III".to_string(),
            class_desc: "6º semestre".to_string(),
            curse_abr: "GTI".to_string(),
            professor_surname: "Silva".to_string(),
            total_calls: 20,
            total_falts: total,
            percent_falts: percent,
            max_falts: max,
        }
    }

    #[test]
    fn test_percentages() {
        let s = stats("PROJTIII", Some(25.0), 5, 10);
        assert_eq!(s.faults_percent(), 25.0);
        assert_eq!(s.presence_percent(), 75.0);

        let none = stats("PROJTIII", None, 0, 10);
        assert_eq!(none.presence_percent(), 100.0);
    }

    #[test]
    fn test_remaining_faults_floors_at_zero() {
        assert_eq!(stats("A", None, 3, 10).remaining_faults(), 7);
        assert_eq!(stats("A", None, 12, 10).remaining_faults(), 0);
    }

    #[test]
    fn test_select_faults() {
        let all = vec![stats("A", None, 1, 10), stats("B", Some(50.0), 5, 10)];
        assert_eq!(select_faults(&all, "B").map(|s| s.total_falts), Some(5));
        assert!(select_faults(&all, "C").is_none());
    }

    #[test]
    fn test_deserialize_without_percent() {
        let s: FaultsStats = serde_json::from_value(serde_json::json!({
            "lessonAbr": "NEGELETRONIC",
            "totalCalls": 0,
            "totalFalts": 0,
            "percentFalts": null,
            "maxFalts": 20
        }))
        .unwrap();
        assert_eq!(s.presence_percent(), 100.0);
    }
}
