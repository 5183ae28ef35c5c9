//! Face detection and identity collection contracts.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// Face bounding box in coordinates relative to the image size (0.0 to 1.0)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingBox {
    pub width: f32,
    pub height: f32,
    pub left: f32,
    pub top: f32,
}

impl BoundingBox {
    /// Pixel rectangle `(x, y, width, height)` inside an image of the given
    /// size, clamped to the image. Returns `None` when nothing remains.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let clamp = |v: f32| v.clamp(0.0, 1.0);

        let x0 = (clamp(self.left) * image_width as f32).floor() as u32;
        let y0 = (clamp(self.top) * image_height as f32).floor() as u32;
        let x1 = (clamp(self.left + self.width) * image_width as f32).ceil() as u32;
        let y1 = (clamp(self.top + self.height) * image_height as f32).ceil() as u32;

        let width = x1.min(image_width).saturating_sub(x0);
        let height = y1.min(image_height).saturating_sub(y0);
        if width == 0 || height == 0 {
            return None;
        }

        Some((x0, y0, width, height))
    }
}

/// A face found in a captured image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedFace {
    pub bounding_box: BoundingBox,

    /// Detection confidence (0 to 100)
    pub confidence: f32,
}

/// One cropped and resized face region, encoded as an image.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceCrop {
    /// Position of the originating face in the detection result
    pub face_index: usize,
    pub bytes: Vec<u8>,
}

impl FaceCrop {
    pub fn new(face_index: usize, bytes: Vec<u8>) -> Self {
        Self { face_index, bytes }
    }

    pub fn from_base64(face_index: usize, encoded: &str) -> Result<Self, base64::DecodeError> {
        let bytes = general_purpose::STANDARD.decode(encoded.trim())?;
        Ok(Self { face_index, bytes })
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// Best candidate returned by a face search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceMatch {
    /// External identity (student registration number)
    pub ra: String,

    /// Identifier of the matched face inside the searched collection
    pub face_id: String,

    /// Similarity score (0 to 100)
    pub similarity: f32,
}

/// A face enrolled in a collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionMember {
    pub ra: String,
    pub face_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateCollectionOutcome {
    Created,
    AlreadyExists,
}

/// Body of the image resize service call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeRequest {
    pub image_base64: String,
    pub faces_bounding: Vec<BoundingBox>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_to_pixels() {
        let bbox = BoundingBox {
            width: 0.25,
            height: 0.5,
            left: 0.5,
            top: 0.25,
        };
        assert_eq!(bbox.to_pixels(400, 200), Some((200, 50, 100, 100)));
    }

    #[test]
    fn test_bounding_box_clamped_to_image() {
        let bbox = BoundingBox {
            width: 0.5,
            height: 0.5,
            left: -0.25,
            top: 0.75,
        };
        assert_eq!(bbox.to_pixels(100, 100), Some((0, 75, 25, 25)));
    }

    #[test]
    fn test_degenerate_bounding_box() {
        let outside = BoundingBox {
            width: 0.2,
            height: 0.2,
            left: 1.1,
            top: 0.1,
        };
        assert_eq!(outside.to_pixels(100, 100), None);

        let empty = BoundingBox {
            width: 0.0,
            height: 0.3,
            left: 0.1,
            top: 0.1,
        };
        assert_eq!(empty.to_pixels(100, 100), None);
    }

    #[test]
    fn test_resize_request_wire_format() {
        let request = ResizeRequest {
            image_base64: "aGVsbG8=".to_string(),
            faces_bounding: vec![BoundingBox {
                width: 0.1,
                height: 0.2,
                left: 0.3,
                top: 0.4,
            }],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["imageBase64"], "aGVsbG8=");
        assert!(json["facesBounding"][0]["Width"].is_number());
        assert!(json["facesBounding"][0]["Left"].is_number());
    }

    #[test]
    fn test_face_crop_base64() {
        let crop = FaceCrop::from_base64(2, "aGVsbG8=").unwrap();
        assert_eq!(crop.face_index, 2);
        assert_eq!(crop.bytes, b"hello");
        assert_eq!(crop.to_base64(), "aGVsbG8=");

        assert!(FaceCrop::from_base64(0, "not base64!").is_err());
    }
}
