pub mod auth;
pub mod capture;
pub mod clock;
pub mod collection;
pub mod config;
pub mod crop;
pub mod detection;
pub mod error;
pub mod faces;
pub mod http;
pub mod matching;
pub mod notice;
pub mod pipeline;
pub mod recorder;
pub mod school;
pub mod session;

pub use config::RollCallConfig;
pub use error::{PipelineError, Stage};
pub use notice::Notice;
pub use pipeline::{AttendancePipeline, PipelineOutcome};
