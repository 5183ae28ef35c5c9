use crate::{error::PipelineError, pipeline::PipelineOutcome};
use std::fmt;

/// Title and message shown to the professor at the end of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn from_error(error: &PipelineError) -> Self {
        Self {
            title: error.title().to_string(),
            message: error.message(),
        }
    }

    pub fn from_outcome(outcome: &PipelineOutcome) -> Self {
        let mut message = format!(
            "{} faces were detected, of these\n\n",
            outcome.faces_detected
        );

        let lines = [
            (outcome.records.len(), "students were saved successfully"),
            (outcome.save_errored, "students were not saved"),
            (outcome.search_not_found, "students were not found"),
            (
                outcome.already_saved,
                "students already had their attendance registered",
            ),
        ];
        for (count, text) in lines {
            if count > 0 {
                message.push_str(&format!("{} {}\n", count, text));
            }
        }

        Self {
            title: "Attendance registered".to_string(),
            message,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n{}", self.title, self.message.trim_end())
    }
}
