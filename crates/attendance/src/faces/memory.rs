use super::FaceCollectionStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use common::faces::{
    CollectionMember, CreateCollectionOutcome, DetectedFace, FaceMatch,
};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceOperation {
    DetectFaces,
    SearchByImage,
    ListCollections,
    CreateCollection,
    DeleteCollection,
    ListMembers,
    IndexFace,
}

/// In-memory face collection store for testing.
///
/// Faces are recognised by the exact bytes of the searched image. Every call
/// is counted per operation and any operation can be made to fail.
#[derive(Default)]
pub struct MemoryFaceStore {
    detected: Vec<DetectedFace>,
    identities: HashMap<Vec<u8>, String>,
    failing: HashSet<FaceOperation>,
    search_errors: HashSet<Vec<u8>>,
    index_errors: HashSet<String>,
    collections: Mutex<HashMap<String, Vec<CollectionMember>>>,
    calls: Mutex<HashMap<FaceOperation, usize>>,
}

impl MemoryFaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Faces returned by every detection
    pub fn with_faces(mut self, faces: Vec<DetectedFace>) -> Self {
        self.detected = faces;
        self
    }

    /// Searching `image` finds the student `ra`
    pub fn with_identity(mut self, image: impl Into<Vec<u8>>, ra: impl Into<String>) -> Self {
        self.identities.insert(image.into(), ra.into());
        self
    }

    /// Searching `image` fails
    pub fn with_search_error(mut self, image: impl Into<Vec<u8>>) -> Self {
        self.search_errors.insert(image.into());
        self
    }

    /// Indexing a face for `ra` fails
    pub fn with_index_error(mut self, ra: impl Into<String>) -> Self {
        self.index_errors.insert(ra.into());
        self
    }

    pub fn with_failure(mut self, operation: FaceOperation) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Pre-existing collection holding faces of the given students
    pub fn with_collection(mut self, collection_id: impl Into<String>, ras: &[&str]) -> Self {
        let members = ras
            .iter()
            .enumerate()
            .map(|(i, ra)| CollectionMember {
                ra: ra.to_string(),
                face_id: format!("existing-{}", i),
            })
            .collect();
        self.collections
            .get_mut()
            .insert(collection_id.into(), members);
        self
    }

    pub async fn call_count(&self, operation: FaceOperation) -> usize {
        self.calls.lock().await.get(&operation).copied().unwrap_or(0)
    }

    pub async fn members(&self, collection_id: &str) -> Option<Vec<CollectionMember>> {
        self.collections.lock().await.get(collection_id).cloned()
    }

    async fn enter(&self, operation: FaceOperation) -> Result<()> {
        *self.calls.lock().await.entry(operation).or_insert(0) += 1;
        if self.failing.contains(&operation) {
            return Err(anyhow!("mock {:?} failed", operation));
        }
        Ok(())
    }
}

#[async_trait]
impl FaceCollectionStore for MemoryFaceStore {
    async fn detect_faces(&self, _image: &[u8]) -> Result<Vec<DetectedFace>> {
        self.enter(FaceOperation::DetectFaces).await?;
        Ok(self.detected.clone())
    }

    async fn search_by_image(
        &self,
        collection_id: &str,
        image: &[u8],
        max_results: i32,
        threshold: f32,
    ) -> Result<Vec<FaceMatch>> {
        self.enter(FaceOperation::SearchByImage).await?;
        if self.search_errors.contains(image) {
            return Err(anyhow!("mock search failed in {}", collection_id));
        }

        let similarity = 99.0;
        if similarity < threshold || max_results < 1 {
            return Ok(Vec::new());
        }

        Ok(self
            .identities
            .get(image)
            .map(|ra| FaceMatch {
                ra: ra.clone(),
                face_id: format!("enrolled-{}", ra),
                similarity,
            })
            .into_iter()
            .collect())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.enter(FaceOperation::ListCollections).await?;
        let mut ids: Vec<String> = self.collections.lock().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn create_collection(&self, collection_id: &str) -> Result<CreateCollectionOutcome> {
        self.enter(FaceOperation::CreateCollection).await?;
        let mut collections = self.collections.lock().await;
        if collections.contains_key(collection_id) {
            return Ok(CreateCollectionOutcome::AlreadyExists);
        }
        collections.insert(collection_id.to_string(), Vec::new());
        info!(collection = %collection_id, "[MOCK] collection created");
        Ok(CreateCollectionOutcome::Created)
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        self.enter(FaceOperation::DeleteCollection).await?;
        self.collections
            .lock()
            .await
            .remove(collection_id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("collection {} not found", collection_id))
    }

    async fn list_members(&self, collection_id: &str) -> Result<Vec<CollectionMember>> {
        self.enter(FaceOperation::ListMembers).await?;
        self.collections
            .lock()
            .await
            .get(collection_id)
            .cloned()
            .ok_or_else(|| anyhow!("collection {} not found", collection_id))
    }

    async fn index_face(&self, collection_id: &str, _image: &[u8], ra: &str) -> Result<String> {
        self.enter(FaceOperation::IndexFace).await?;
        if self.index_errors.contains(ra) {
            return Err(anyhow!("mock index failed for {}", ra));
        }

        let mut collections = self.collections.lock().await;
        let members = collections
            .get_mut(collection_id)
            .ok_or_else(|| anyhow!("collection {} not found", collection_id))?;
        let face_id = format!("face-{}-{}", ra, members.len());
        members.push(CollectionMember {
            ra: ra.to_string(),
            face_id: face_id.clone(),
        });
        Ok(face_id)
    }
}
