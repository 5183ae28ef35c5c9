use crate::{error::DetectionError, faces::FaceCollectionStore};
use common::faces::DetectedFace;
use tracing::{info, instrument};

/// Detect the faces of a captured image. Zero faces is an error of its own.
#[instrument(skip_all, fields(bytes = image.len()))]
pub async fn detect_faces(
    store: &dyn FaceCollectionStore,
    image: &[u8],
) -> Result<Vec<DetectedFace>, DetectionError> {
    let faces = store
        .detect_faces(image)
        .await
        .map_err(|e| DetectionError::Remote(format!("{:#}", e)))?;

    if faces.is_empty() {
        return Err(DetectionError::NoFaces);
    }

    info!(faces = faces.len(), "faces detected");
    Ok(faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::{FaceOperation, MemoryFaceStore};
    use common::faces::BoundingBox;

    #[tokio::test]
    async fn test_no_faces_is_reported() {
        let store = MemoryFaceStore::new();
        let err = detect_faces(&store, b"img").await.unwrap_err();
        assert!(matches!(err, DetectionError::NoFaces));
    }

    #[tokio::test]
    async fn test_remote_failure() {
        let store = MemoryFaceStore::new().with_failure(FaceOperation::DetectFaces);
        let err = detect_faces(&store, b"img").await.unwrap_err();
        assert!(matches!(err, DetectionError::Remote(_)));
    }

    #[tokio::test]
    async fn test_faces_returned_in_order() {
        let faces: Vec<DetectedFace> = (0..3)
            .map(|i| DetectedFace {
                bounding_box: BoundingBox {
                    width: 0.1,
                    height: 0.1,
                    left: i as f32 * 0.2,
                    top: 0.0,
                },
                confidence: 90.0 + i as f32,
            })
            .collect();
        let store = MemoryFaceStore::new().with_faces(faces.clone());

        assert_eq!(detect_faces(&store, b"img").await.unwrap(), faces);
    }
}
