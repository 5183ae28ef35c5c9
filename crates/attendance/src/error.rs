//! Failure taxonomy of the roll call pipeline.
//!
//! Each stage has its own error type. Any of them aborts the run and is
//! reported through [`PipelineError`], which also carries the title and
//! message shown to the professor. Per-face problems are not errors; they are
//! counted in the outcome instead.

use chrono::NaiveTime;
use std::fmt;
use thiserror::Error;

/// Working states of one pipeline run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Capturing,
    Detecting,
    Cropping,
    Matching,
    ResolvingCollection,
    Recording,
    Persisting,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Capturing,
        Stage::Detecting,
        Stage::Cropping,
        Stage::Matching,
        Stage::ResolvingCollection,
        Stage::Recording,
        Stage::Persisting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Capturing => "capturing",
            Stage::Detecting => "detecting",
            Stage::Cropping => "cropping",
            Stage::Matching => "matching",
            Stage::ResolvingCollection => "resolving_collection",
            Stage::Recording => "recording",
            Stage::Persisting => "persisting",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),

    #[error("captured image is empty")]
    Empty,

    #[error("failed to read captured image: {0}")]
    Read(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("no face found in the image")]
    NoFaces,

    #[error("face detection failed: {0}")]
    Remote(String),
}

#[derive(Debug, Error)]
pub enum CropError {
    #[error("failed to prepare image for cropping: {0}")]
    Encode(String),

    #[error("face crop service failed: {0}")]
    Remote(String),

    #[error("no face could be cropped from the image")]
    Empty,

    #[error("expected {expected} face crops, got {got}")]
    CountMismatch { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("no student recognised ({not_found} not found, {errored} failed)")]
    NoStudentsFound { not_found: usize, errored: usize },
}

#[derive(Debug, Error)]
pub enum CollectionResolutionError {
    #[error("no lesson in session at {0}")]
    NoLessonInSession(NaiveTime),

    #[error("failed to look up collection {id}: {reason}")]
    Lookup { id: String, reason: String },

    #[error("failed to create collection {id}: {reason}")]
    Creation { id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to list faces of collection {id}: {reason}")]
    Membership { id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("school backend rejected the roll call: {0}")]
    Backend(String),

    #[error("school backend stored no attendance record")]
    NothingStored,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Crop(#[from] CropError),

    #[error(transparent)]
    Matching(#[from] MatchingError),

    #[error(transparent)]
    CollectionResolution(#[from] CollectionResolutionError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl PipelineError {
    /// Stage the run was in when it failed
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Capture(_) => Stage::Capturing,
            PipelineError::Detection(_) => Stage::Detecting,
            PipelineError::Crop(_) => Stage::Cropping,
            PipelineError::Matching(_) => Stage::Matching,
            PipelineError::CollectionResolution(_) => Stage::ResolvingCollection,
            PipelineError::Record(_) => Stage::Recording,
            PipelineError::Persistence(_) => Stage::Persisting,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PipelineError::Capture(_) => "Could not take the photo",
            PipelineError::Detection(DetectionError::NoFaces) => "No face detected",
            PipelineError::Detection(_) => "Could not detect faces",
            PipelineError::Crop(_) => "Could not extract the faces",
            PipelineError::Matching(_) => "Could not find the students",
            PipelineError::CollectionResolution(CollectionResolutionError::NoLessonInSession(_)) => {
                "Lesson not started"
            }
            PipelineError::CollectionResolution(_) => "Could not prepare the roll call",
            PipelineError::Record(_) => "Could not save the students",
            PipelineError::Persistence(_) => "Could not register attendance",
        }
    }

    pub fn message(&self) -> String {
        match self {
            PipelineError::Capture(_) => {
                "An error occurred while taking the photo, please try again.".to_string()
            }
            PipelineError::Detection(DetectionError::NoFaces) => {
                "No face was identified in the image.".to_string()
            }
            PipelineError::Detection(_) => "The faces in the image could not be detected.".to_string(),
            PipelineError::Crop(_) => "The detected faces could not be extracted from the image.".to_string(),
            PipelineError::Matching(MatchingError::NoStudentsFound { not_found, errored }) => {
                format!(
                    "None of the detected faces belongs to a student of the class ({} not found, {} failed).",
                    not_found, errored
                )
            }
            PipelineError::CollectionResolution(CollectionResolutionError::NoLessonInSession(at)) => {
                format!("There is no lesson in session at {}.", at.format("%H:%M"))
            }
            PipelineError::CollectionResolution(_) => {
                "An error occurred while preparing to register attendance, please try again later."
                    .to_string()
            }
            PipelineError::Record(_) => {
                "An error occurred while saving the students, please try again later.".to_string()
            }
            PipelineError::Persistence(_) => {
                "An error occurred while registering attendance, please try again later.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_of_each_error() {
        let cases: Vec<(PipelineError, Stage)> = vec![
            (CaptureError::Empty.into(), Stage::Capturing),
            (DetectionError::NoFaces.into(), Stage::Detecting),
            (CropError::Empty.into(), Stage::Cropping),
            (
                MatchingError::NoStudentsFound { not_found: 1, errored: 0 }.into(),
                Stage::Matching,
            ),
            (
                CollectionResolutionError::NoLessonInSession(NaiveTime::MIN).into(),
                Stage::ResolvingCollection,
            ),
            (
                RecordError::Membership {
                    id: "c".to_string(),
                    reason: "down".to_string(),
                }
                .into(),
                Stage::Recording,
            ),
            (PersistenceError::NothingStored.into(), Stage::Persisting),
        ];

        for (error, stage) in cases {
            assert_eq!(error.stage(), stage, "{error}");
            assert!(!error.title().is_empty());
            assert!(!error.message().is_empty());
        }
    }

    #[test]
    fn test_no_lesson_is_reported_as_not_started() {
        let at = NaiveTime::from_hms_opt(7, 5, 0).unwrap();
        let error: PipelineError = CollectionResolutionError::NoLessonInSession(at).into();
        assert_eq!(error.title(), "Lesson not started");
        assert_eq!(error.message(), "There is no lesson in session at 07:05.");
    }

    #[test]
    fn test_stage_names() {
        let names: Vec<&str> = Stage::ALL.iter().map(Stage::as_str).collect();
        assert_eq!(
            names,
            vec![
                "capturing",
                "detecting",
                "cropping",
                "matching",
                "resolving_collection",
                "recording",
                "persisting"
            ]
        );
    }
}
