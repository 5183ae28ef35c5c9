use super::FaceCollectionStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_rekognition::{
    config::Builder as RekognitionConfigBuilder,
    error::DisplayErrorContext,
    primitives::Blob,
    types::{Attribute, Image, QualityFilter},
    Client,
};
use common::faces::{
    BoundingBox, CollectionMember, CreateCollectionOutcome, DetectedFace, FaceMatch,
};
use telemetry::metrics::record_remote_call;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct RekognitionConfig {
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub endpoint: Option<String>,
}

impl Default for RekognitionConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".into(),
            access_key: None,
            secret_key: None,
            endpoint: None,
        }
    }
}

/// Face collection store backed by Amazon Rekognition
#[derive(Clone)]
pub struct RekognitionStore {
    client: Client,
}

impl RekognitionStore {
    pub async fn connect(cfg: &RekognitionConfig) -> Self {
        let region = Region::new(cfg.region.clone());
        let region_provider = RegionProviderChain::first_try(region.clone()).or_default_provider();
        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut conf = RekognitionConfigBuilder::from(&base).region(region);
        if let Some(endpoint) = &cfg.endpoint {
            conf = conf.endpoint_url(endpoint.clone());
        }
        if let (Some(access_key), Some(secret_key)) = (&cfg.access_key, &cfg.secret_key) {
            conf = conf.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "static",
            ));
        }

        Self {
            client: Client::from_conf(conf.build()),
        }
    }
}

fn image(bytes: &[u8]) -> Image {
    Image::builder().bytes(Blob::new(bytes.to_vec())).build()
}

fn tracked<T, E>(operation: &str, result: Result<T, E>) -> Result<T, E> {
    record_remote_call("faces", operation, result.is_ok());
    result
}

#[async_trait]
impl FaceCollectionStore for RekognitionStore {
    #[instrument(skip_all, fields(bytes = image_bytes.len()))]
    async fn detect_faces(&self, image_bytes: &[u8]) -> Result<Vec<DetectedFace>> {
        let output = tracked(
            "detect_faces",
            self.client
                .detect_faces()
                .image(image(image_bytes))
                .attributes(Attribute::Default)
                .send()
                .await,
        )
        .map_err(|e| anyhow!("detect faces failed: {}", DisplayErrorContext(&e)))?;

        let faces: Vec<DetectedFace> = output
            .face_details()
            .iter()
            .filter_map(|detail| {
                let bbox = detail.bounding_box()?;
                Some(DetectedFace {
                    bounding_box: BoundingBox {
                        width: bbox.width().unwrap_or_default(),
                        height: bbox.height().unwrap_or_default(),
                        left: bbox.left().unwrap_or_default(),
                        top: bbox.top().unwrap_or_default(),
                    },
                    confidence: detail.confidence().unwrap_or_default(),
                })
            })
            .collect();

        debug!(faces = faces.len(), "faces detected");
        Ok(faces)
    }

    #[instrument(skip(self, image_bytes))]
    async fn search_by_image(
        &self,
        collection_id: &str,
        image_bytes: &[u8],
        max_results: i32,
        threshold: f32,
    ) -> Result<Vec<FaceMatch>> {
        let result = self
            .client
            .search_faces_by_image()
            .collection_id(collection_id)
            .image(image(image_bytes))
            .max_faces(max_results)
            .face_match_threshold(threshold)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_invalid_parameter_exception()) =>
            {
                // no face usable for search in the crop
                record_remote_call("faces", "search_faces", true);
                return Ok(Vec::new());
            }
            Err(e) => {
                record_remote_call("faces", "search_faces", false);
                return Err(anyhow!("face search failed: {}", DisplayErrorContext(&e)));
            }
        };
        record_remote_call("faces", "search_faces", true);

        Ok(output
            .face_matches()
            .iter()
            .filter_map(|m| {
                let face = m.face()?;
                Some(FaceMatch {
                    ra: face.external_image_id()?.to_string(),
                    face_id: face.face_id().unwrap_or_default().to_string(),
                    similarity: m.similarity().unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = tracked(
                "list_collections",
                self.client
                    .list_collections()
                    .set_next_token(next_token.take())
                    .send()
                    .await,
            )
            .map_err(|e| anyhow!("list collections failed: {}", DisplayErrorContext(&e)))?;

            ids.extend(output.collection_ids().iter().cloned());
            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(ids)
    }

    async fn collection_exists(&self, collection_id: &str) -> Result<bool> {
        match self
            .client
            .describe_collection()
            .collection_id(collection_id)
            .send()
            .await
        {
            Ok(_) => {
                record_remote_call("faces", "describe_collection", true);
                Ok(true)
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                record_remote_call("faces", "describe_collection", true);
                Ok(false)
            }
            Err(e) => {
                record_remote_call("faces", "describe_collection", false);
                Err(anyhow!(
                    "describe collection {} failed: {}",
                    collection_id,
                    DisplayErrorContext(&e)
                ))
            }
        }
    }

    #[instrument(skip(self))]
    async fn create_collection(&self, collection_id: &str) -> Result<CreateCollectionOutcome> {
        match self
            .client
            .create_collection()
            .collection_id(collection_id)
            .send()
            .await
        {
            Ok(_) => {
                record_remote_call("faces", "create_collection", true);
                info!(collection = %collection_id, "collection created");
                Ok(CreateCollectionOutcome::Created)
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_already_exists_exception()) =>
            {
                record_remote_call("faces", "create_collection", true);
                Ok(CreateCollectionOutcome::AlreadyExists)
            }
            Err(e) => {
                record_remote_call("faces", "create_collection", false);
                Err(anyhow!(
                    "create collection {} failed: {}",
                    collection_id,
                    DisplayErrorContext(&e)
                ))
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        tracked(
            "delete_collection",
            self.client
                .delete_collection()
                .collection_id(collection_id)
                .send()
                .await,
        )
        .map_err(|e| {
            anyhow!(
                "delete collection {} failed: {}",
                collection_id,
                DisplayErrorContext(&e)
            )
        })?;
        info!(collection = %collection_id, "collection deleted");
        Ok(())
    }

    async fn list_members(&self, collection_id: &str) -> Result<Vec<CollectionMember>> {
        let mut members = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = tracked(
                "list_faces",
                self.client
                    .list_faces()
                    .collection_id(collection_id)
                    .set_next_token(next_token.take())
                    .send()
                    .await,
            )
            .map_err(|e| {
                anyhow!(
                    "list faces of {} failed: {}",
                    collection_id,
                    DisplayErrorContext(&e)
                )
            })?;

            members.extend(output.faces().iter().filter_map(|face| {
                Some(CollectionMember {
                    ra: face.external_image_id()?.to_string(),
                    face_id: face.face_id().unwrap_or_default().to_string(),
                })
            }));
            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(members)
    }

    #[instrument(skip(self, image_bytes))]
    async fn index_face(&self, collection_id: &str, image_bytes: &[u8], ra: &str) -> Result<String> {
        let output = tracked(
            "index_faces",
            self.client
                .index_faces()
                .collection_id(collection_id)
                .image(image(image_bytes))
                .external_image_id(ra)
                .max_faces(1)
                .quality_filter(QualityFilter::Auto)
                .send()
                .await,
        )
        .map_err(|e| anyhow!("index face failed: {}", DisplayErrorContext(&e)))?;

        output
            .face_records()
            .iter()
            .find_map(|record| record.face()?.face_id().map(str::to_string))
            .ok_or_else(|| anyhow!("no face indexed for {}", ra))
    }
}
