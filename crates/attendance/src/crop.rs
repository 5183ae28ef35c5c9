//! Face crop back-ends: the remote resize service and an in-process cropper.

use crate::{error::CropError, http::BackendHttp};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use common::faces::{DetectedFace, FaceCrop, ResizeRequest};
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::{io::Cursor, sync::Arc};
use telemetry::metrics::record_remote_call;
use tracing::{debug, instrument, warn};

/// Largest side of a local crop, in pixels
pub const MAX_CROP_SIDE: u32 = 256;

#[async_trait]
pub trait FaceCropper: Send + Sync {
    /// One crop per usable face, in the order of `faces`
    async fn crop(&self, image: &[u8], faces: &[DetectedFace]) -> Result<Vec<FaceCrop>, CropError>;
}

/// Crops through `POST image/resize` of the resize service
pub struct ResizeServiceClient {
    http: Arc<BackendHttp>,
}

impl ResizeServiceClient {
    pub fn new(http: Arc<BackendHttp>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl FaceCropper for ResizeServiceClient {
    #[instrument(skip_all, fields(faces = faces.len()))]
    async fn crop(&self, image: &[u8], faces: &[DetectedFace]) -> Result<Vec<FaceCrop>, CropError> {
        let request = ResizeRequest {
            image_base64: general_purpose::STANDARD.encode(image),
            faces_bounding: faces.iter().map(|f| f.bounding_box).collect(),
        };

        let result: anyhow::Result<Vec<String>> =
            self.http.post_authorized("image/resize", &request).await;
        record_remote_call("resize", "resize", result.is_ok());
        let encoded = result.map_err(|e| CropError::Remote(format!("{:#}", e)))?;

        if encoded.len() != faces.len() {
            return Err(CropError::CountMismatch {
                expected: faces.len(),
                got: encoded.len(),
            });
        }

        encoded
            .iter()
            .enumerate()
            .map(|(index, face)| {
                FaceCrop::from_base64(index, face)
                    .map_err(|e| CropError::Remote(format!("invalid crop {}: {}", index, e)))
            })
            .collect()
    }
}

/// Crops in-process with the `image` crate
#[derive(Debug, Clone)]
pub struct LocalFaceCropper {
    max_side: u32,
}

impl Default for LocalFaceCropper {
    fn default() -> Self {
        Self {
            max_side: MAX_CROP_SIDE,
        }
    }
}

impl LocalFaceCropper {
    pub fn new(max_side: u32) -> Self {
        Self {
            max_side: max_side.max(1),
        }
    }
}

#[async_trait]
impl FaceCropper for LocalFaceCropper {
    async fn crop(&self, image: &[u8], faces: &[DetectedFace]) -> Result<Vec<FaceCrop>, CropError> {
        let bytes = image.to_vec();
        let faces = faces.to_vec();
        let max_side = self.max_side;

        tokio::task::spawn_blocking(move || crop_faces(&bytes, &faces, max_side))
            .await
            .map_err(|e| CropError::Encode(format!("crop task failed: {}", e)))?
    }
}

fn crop_faces(
    image: &[u8],
    faces: &[DetectedFace],
    max_side: u32,
) -> Result<Vec<FaceCrop>, CropError> {
    let source = image::load_from_memory(image).map_err(|e| CropError::Encode(e.to_string()))?;
    let (width, height) = (source.width(), source.height());

    let mut crops = Vec::with_capacity(faces.len());
    for (index, face) in faces.iter().enumerate() {
        let Some((x, y, w, h)) = face.bounding_box.to_pixels(width, height) else {
            warn!(face = index, "bounding box outside the image, skipping");
            continue;
        };

        let mut region = source.crop_imm(x, y, w, h);
        if w > max_side || h > max_side {
            region = region.resize(max_side, max_side, FilterType::Triangle);
        }

        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(region.to_rgb8())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .map_err(|e| CropError::Encode(e.to_string()))?;
        crops.push(FaceCrop::new(index, buf));
    }

    if crops.is_empty() {
        return Err(CropError::Empty);
    }

    debug!(crops = crops.len(), "faces cropped");
    Ok(crops)
}

/// Mock cropper for testing: face `i` is cropped to `crops[i]`
#[derive(Default)]
pub struct MockFaceCropper {
    crops: Vec<Vec<u8>>,
    should_fail: bool,
}

impl MockFaceCropper {
    pub fn new(crops: Vec<Vec<u8>>) -> Self {
        Self {
            crops,
            should_fail: false,
        }
    }

    pub fn with_failure(mut self, should_fail: bool) -> Self {
        self.should_fail = should_fail;
        self
    }
}

#[async_trait]
impl FaceCropper for MockFaceCropper {
    async fn crop(&self, _image: &[u8], faces: &[DetectedFace]) -> Result<Vec<FaceCrop>, CropError> {
        if self.should_fail {
            return Err(CropError::Remote("mock resize failed".to_string()));
        }
        if self.crops.len() < faces.len() {
            return Err(CropError::CountMismatch {
                expected: faces.len(),
                got: self.crops.len(),
            });
        }
        Ok(faces
            .iter()
            .enumerate()
            .map(|(index, _)| FaceCrop::new(index, self.crops[index].clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::faces::BoundingBox;
    use image::{Rgb, RgbImage};

    fn face(left: f32, top: f32, width: f32, height: f32) -> DetectedFace {
        DetectedFace {
            bounding_box: BoundingBox {
                width,
                height,
                left,
                top,
            },
            confidence: 99.0,
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 80, 40]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_local_cropper_resizes_and_keeps_order() {
        let cropper = LocalFaceCropper::new(64);
        let image = png(400, 200);
        let faces = vec![face(0.0, 0.0, 0.5, 1.0), face(0.75, 0.5, 0.125, 0.125)];

        let crops = cropper.crop(&image, &faces).await.unwrap();
        assert_eq!(crops.len(), 2);
        assert_eq!(crops[0].face_index, 0);
        assert_eq!(crops[1].face_index, 1);

        let first = image::load_from_memory(&crops[0].bytes).unwrap();
        assert!(first.width() <= 64 && first.height() <= 64);

        let second = image::load_from_memory(&crops[1].bytes).unwrap();
        assert_eq!((second.width(), second.height()), (50, 25));
    }

    #[tokio::test]
    async fn test_local_cropper_drops_degenerate_boxes() {
        let cropper = LocalFaceCropper::default();
        let image = png(100, 100);
        let faces = vec![face(1.5, 0.0, 0.25, 0.25), face(0.25, 0.25, 0.25, 0.25)];

        let crops = cropper.crop(&image, &faces).await.unwrap();
        assert_eq!(crops.len(), 1);
        assert_eq!(crops[0].face_index, 1);

        let err = cropper.crop(&image, &faces[..1]).await.unwrap_err();
        assert!(matches!(err, CropError::Empty));
    }

    #[tokio::test]
    async fn test_local_cropper_rejects_undecodable_image() {
        let cropper = LocalFaceCropper::default();
        let err = cropper
            .crop(b"not an image", &[face(0.0, 0.0, 1.0, 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, CropError::Encode(_)));
    }
}
