//! Image acquisition.
//!
//! A capture produces one [`CapturedImage`] owned by a single pipeline run.
//! The run hands it back to its source through [`ImageSource::discard`]
//! exactly once, whatever the outcome.

use crate::error::CaptureError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum ImageData {
    File(PathBuf),
    Memory(Arc<Vec<u8>>),
}

/// Handle to one photo taken for a roll call
#[derive(Debug, Clone)]
pub struct CapturedImage {
    id: Uuid,
    data: ImageData,
}

impl CapturedImage {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data: ImageData::File(path.into()),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data: ImageData::Memory(Arc::new(bytes)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Backing file, for file-based captures
    pub fn path(&self) -> Option<&Path> {
        match &self.data {
            ImageData::File(path) => Some(path),
            ImageData::Memory(_) => None,
        }
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>, CaptureError> {
        let bytes = match &self.data {
            ImageData::File(path) => tokio::fs::read(path).await?,
            ImageData::Memory(bytes) => bytes.as_ref().clone(),
        };

        if bytes.is_empty() {
            return Err(CaptureError::Empty);
        }
        Ok(bytes)
    }

    pub async fn read_base64(&self) -> Result<String, CaptureError> {
        let bytes = self.read_bytes().await?;
        Ok(general_purpose::STANDARD.encode(bytes))
    }
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Take one photo. A failed capture leaves nothing to discard.
    async fn capture(&self) -> Result<CapturedImage, CaptureError>;

    /// Release the temporary resources of a capture
    async fn discard(&self, image: CapturedImage) -> Result<()>;
}

/// "Captures" an existing photo by copying it into the capture cache.
pub struct FileImageSource {
    photo: PathBuf,
    cache_dir: PathBuf,
}

impl FileImageSource {
    pub fn new(photo: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            photo: photo.into(),
            cache_dir: cache_dir.into(),
        }
    }
}

#[async_trait]
impl ImageSource for FileImageSource {
    async fn capture(&self) -> Result<CapturedImage, CaptureError> {
        if !tokio::fs::try_exists(&self.photo).await.unwrap_or(false) {
            return Err(CaptureError::Unavailable(format!(
                "{} does not exist",
                self.photo.display()
            )));
        }

        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let extension = self
            .photo
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("jpg");
        let target = self
            .cache_dir
            .join(format!("{}.{}", Uuid::new_v4(), extension));

        if let Err(e) = tokio::fs::copy(&self.photo, &target).await {
            // a partial copy must not outlive the failed capture
            match tokio::fs::remove_file(&target).await {
                Err(cleanup) if cleanup.kind() != std::io::ErrorKind::NotFound => {
                    warn!(path = %target.display(), error = %cleanup, "failed to remove partial capture");
                }
                _ => {}
            }
            return Err(e.into());
        }

        info!(path = %target.display(), "photo captured");
        Ok(CapturedImage::from_file(target))
    }

    async fn discard(&self, image: CapturedImage) -> Result<()> {
        if let Some(path) = image.path() {
            tokio::fs::remove_file(path)
                .await
                .with_context(|| format!("failed to delete {}", path.display()))?;
            debug!(path = %path.display(), "captured photo deleted");
        }
        Ok(())
    }
}

/// In-memory image source for testing
#[derive(Default)]
pub struct MemoryImageSource {
    bytes: Vec<u8>,
    fail_capture: bool,
    fail_discard: bool,
    captures: AtomicUsize,
    discards: AtomicUsize,
}

impl MemoryImageSource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Self::default()
        }
    }

    pub fn with_failure(mut self, should_fail: bool) -> Self {
        self.fail_capture = should_fail;
        self
    }

    pub fn with_discard_failure(mut self, should_fail: bool) -> Self {
        self.fail_discard = should_fail;
        self
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn discard_count(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for MemoryImageSource {
    async fn capture(&self) -> Result<CapturedImage, CaptureError> {
        if self.fail_capture {
            return Err(CaptureError::Unavailable("mock camera offline".to_string()));
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(CapturedImage::from_bytes(self.bytes.clone()))
    }

    async fn discard(&self, _image: CapturedImage) -> Result<()> {
        self.discards.fetch_add(1, Ordering::SeqCst);
        if self.fail_discard {
            return Err(anyhow!("mock discard failed"));
        }
        Ok(())
    }
}
