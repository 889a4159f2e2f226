//! Object storage client for user uploads.
//!
//! Talks to an Appwrite-compatible storage API: files are posted as multipart
//! to a bucket and served from the bucket's `view` URL.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::StorageConfig;

pub const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unsupported content type '{0}'")]
    UnsupportedContentType(String),
    #[error("File exceeds the {max} byte limit")]
    TooLarge { max: usize },
    #[error("File is empty")]
    Empty,
    #[error("Storage request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Storage rejected the upload with status {0}")]
    Rejected(u16),
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    #[serde(rename = "$id")]
    id: String,
}

#[derive(Clone)]
pub struct BlobStore {
    client: reqwest::Client,
    endpoint: String,
    project_id: String,
    api_key: String,
    bucket_id: String,
    max_upload_bytes: usize,
}

impl BlobStore {
    /// Returns `None` unless every storage setting is present.
    pub fn from_config(config: &StorageConfig) -> Option<Self> {
        Some(Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.as_ref()?.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone()?,
            api_key: config.api_key.clone()?,
            bucket_id: config.bucket_id.clone()?,
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    pub fn validate_image(&self, content_type: &str, len: usize) -> Result<(), StorageError> {
        if !ALLOWED_IMAGE_TYPES.contains(&content_type) {
            return Err(StorageError::UnsupportedContentType(content_type.to_string()));
        }
        if len == 0 {
            return Err(StorageError::Empty);
        }
        if len > self.max_upload_bytes {
            return Err(StorageError::TooLarge {
                max: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    fn files_url(&self) -> String {
        format!("{}/storage/buckets/{}/files", self.endpoint, self.bucket_id)
    }

    pub fn view_url(&self, file_id: &str) -> String {
        format!(
            "{}/{}/view?project={}",
            self.files_url(),
            file_id,
            self.project_id
        )
    }

    /// Uploads an image and returns its public URL.
    pub async fn upload_image(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        self.validate_image(content_type, bytes.len())?;

        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = Form::new()
            .text("fileId", Uuid::new_v4().simple().to_string())
            .part("file", part);

        let response = self
            .client
            .post(self.files_url())
            .header("X-Appwrite-Project", &self.project_id)
            .header("X-Appwrite-Key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), bucket = %self.bucket_id, "Object storage rejected upload");
            return Err(StorageError::Rejected(status.as_u16()));
        }

        let uploaded: UploadedFile = response.json().await?;
        debug!(file_id = %uploaded.id, bucket = %self.bucket_id, "Uploaded file to object storage");

        Ok(self.view_url(&uploaded.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };

    fn config(endpoint: &str) -> StorageConfig {
        StorageConfig {
            endpoint: Some(endpoint.to_string()),
            project_id: Some("proj".to_string()),
            api_key: Some("secret".to_string()),
            bucket_id: Some("avatars".to_string()),
            max_upload_bytes: 16,
        }
    }

    #[test]
    fn test_requires_full_configuration() {
        let mut incomplete = config("https://storage.example.com/v1");
        incomplete.api_key = None;
        assert!(BlobStore::from_config(&incomplete).is_none());
        assert!(BlobStore::from_config(&config("https://storage.example.com/v1")).is_some());
    }

    #[test]
    fn test_view_url() {
        let store = BlobStore::from_config(&config("https://storage.example.com/v1/")).unwrap();
        assert_eq!(
            store.view_url("abc"),
            "https://storage.example.com/v1/storage/buckets/avatars/files/abc/view?project=proj"
        );
    }

    #[test]
    fn test_validate_image() {
        let store = BlobStore::from_config(&config("http://localhost")).unwrap();
        assert!(store.validate_image("image/png", 10).is_ok());
        assert!(matches!(
            store.validate_image("text/plain", 10),
            Err(StorageError::UnsupportedContentType(_))
        ));
        assert!(matches!(
            store.validate_image("image/png", 0),
            Err(StorageError::Empty)
        ));
        assert!(matches!(
            store.validate_image("image/jpeg", 17),
            Err(StorageError::TooLarge { max: 16 })
        ));
    }

    async fn spawn_storage_mock() -> String {
        async fn create_file(headers: HeaderMap) -> Result<Json<serde_json::Value>, StatusCode> {
            match headers.get("X-Appwrite-Key").and_then(|v| v.to_str().ok()) {
                Some("secret") => Ok(Json(serde_json::json!({"$id": "file123"}))),
                _ => Err(StatusCode::UNAUTHORIZED),
            }
        }

        let app = Router::new().route("/storage/buckets/{bucket}/files", post(create_file));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_upload_returns_view_url() {
        let endpoint = spawn_storage_mock().await;
        let store = BlobStore::from_config(&config(&endpoint)).unwrap();

        let url = store
            .upload_image("me.png", "image/png", vec![1, 2, 3])
            .await
            .unwrap();

        assert_eq!(
            url,
            format!("{}/storage/buckets/avatars/files/file123/view?project=proj", endpoint)
        );
    }

    #[tokio::test]
    async fn test_upload_surfaces_rejection() {
        let endpoint = spawn_storage_mock().await;
        let mut cfg = config(&endpoint);
        cfg.api_key = Some("wrong".to_string());
        let store = BlobStore::from_config(&cfg).unwrap();

        let result = store.upload_image("me.png", "image/png", vec![1]).await;
        assert!(matches!(result, Err(StorageError::Rejected(401))));
    }
}
