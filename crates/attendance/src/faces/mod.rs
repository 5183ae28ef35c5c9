//! Identity collection store: face detection, search and enrollment.

mod memory;
mod rekognition;

pub use memory::{FaceOperation, MemoryFaceStore};
pub use rekognition::{RekognitionConfig, RekognitionStore};

use anyhow::Result;
use async_trait::async_trait;
use common::faces::{CollectionMember, CreateCollectionOutcome, DetectedFace, FaceMatch};

#[async_trait]
pub trait FaceCollectionStore: Send + Sync {
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<DetectedFace>>;

    /// Best candidates for the face in `image`, most similar first. An image
    /// without a usable face yields no candidate rather than an error.
    async fn search_by_image(
        &self,
        collection_id: &str,
        image: &[u8],
        max_results: i32,
        threshold: f32,
    ) -> Result<Vec<FaceMatch>>;

    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn collection_exists(&self, collection_id: &str) -> Result<bool> {
        let collections = self.list_collections().await?;
        Ok(collections.iter().any(|id| id == collection_id))
    }

    async fn create_collection(&self, collection_id: &str) -> Result<CreateCollectionOutcome>;

    async fn delete_collection(&self, collection_id: &str) -> Result<()>;

    async fn list_members(&self, collection_id: &str) -> Result<Vec<CollectionMember>>;

    /// Enroll the face in `image` under `ra`, returning the new face id
    async fn index_face(&self, collection_id: &str, image: &[u8], ra: &str) -> Result<String>;
}
