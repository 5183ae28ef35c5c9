use crate::faces::RekognitionConfig;
use crate::matching::DEFAULT_MATCH_THRESHOLD;
use anyhow::{bail, Context, Result};
use reqwest::Url;
use std::{env, path::PathBuf, time::Duration};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CropMode {
    /// Crops through the image resize service
    Remote,
    /// Crops in-process
    Local,
}

#[derive(Clone, Debug)]
pub struct RollCallConfig {
    pub api_url: Url,
    pub api_timeout: Duration,
    pub resize_url: Url,
    pub crop_mode: CropMode,
    pub enrollment_collection: String,
    pub match_threshold: f32,
    pub capture_dir: PathBuf,
    pub rekognition: RekognitionConfig,
}

impl RollCallConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api = var("ROLLCALL_API_URL").unwrap_or_else(|| "http://127.0.0.1:8080".to_string());
        let api_url = Url::parse(&api).context("invalid ROLLCALL_API_URL")?;

        let api_timeout_ms = match var("ROLLCALL_API_TIMEOUT_MS") {
            Some(v) => v
                .parse::<u64>()
                .context("invalid ROLLCALL_API_TIMEOUT_MS")?,
            None => 10_000,
        };

        let resize_url = match var("ROLLCALL_RESIZE_URL") {
            Some(v) => Url::parse(&v).context("invalid ROLLCALL_RESIZE_URL")?,
            None => api_url.clone(),
        };

        let crop_mode = match var("ROLLCALL_CROP_MODE")
            .unwrap_or_else(|| "remote".to_string())
            .to_lowercase()
            .as_str()
        {
            "remote" => CropMode::Remote,
            "local" => CropMode::Local,
            other => bail!("invalid ROLLCALL_CROP_MODE {:?}, expected remote or local", other),
        };

        let enrollment_collection = var("ROLLCALL_ENROLLMENT_COLLECTION")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "students".to_string());

        let match_threshold = match var("ROLLCALL_MATCH_THRESHOLD") {
            Some(v) => v
                .parse::<f32>()
                .context("invalid ROLLCALL_MATCH_THRESHOLD")?,
            None => DEFAULT_MATCH_THRESHOLD,
        };
        if !(0.0..=100.0).contains(&match_threshold) {
            bail!("ROLLCALL_MATCH_THRESHOLD must be between 0 and 100");
        }

        let capture_dir = var("ROLLCALL_CAPTURE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("rollcall"));

        let rekognition = RekognitionConfig {
            region: var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            access_key: var("ROLLCALL_AWS_ACCESS_KEY"),
            secret_key: var("ROLLCALL_AWS_SECRET_KEY"),
            endpoint: var("ROLLCALL_REKOGNITION_ENDPOINT"),
        };

        Ok(Self {
            api_url,
            api_timeout: Duration::from_millis(api_timeout_ms),
            resize_url,
            crop_mode,
            enrollment_collection,
            match_threshold,
            capture_dir,
            rekognition,
        })
    }
}
