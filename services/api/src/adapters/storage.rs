//! services/api/src/adapters/storage.rs
//!
//! Adapter implementing the `AssetStorageService` port. Uploads are tried
//! against Cloudinary first, then Google Cloud Storage, then the local
//! uploads directory. Local storage always succeeds, so an upload only
//! fails on I/O problems with the local disk itself.

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use storybook_core::domain::{AssetKind, StoredAsset, UploadOptions};
use storybook_core::ports::{AssetStorageService, PortError, PortResult};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{CloudinaryConfig, GcsConfig};

#[derive(Deserialize)]
struct CloudinaryUploadResponse {
    secure_url: String,
    public_id: String,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that stores generated assets in whichever backend is configured.
pub struct StorageAdapter {
    http: reqwest::Client,
    cloudinary: Option<CloudinaryConfig>,
    gcs: Option<GcsConfig>,
    upload_dir: PathBuf,
}

impl StorageAdapter {
    pub fn new(
        cloudinary: Option<CloudinaryConfig>,
        gcs: Option<GcsConfig>,
        upload_dir: PathBuf,
    ) -> Self {
        if cloudinary.is_none() && gcs.is_none() {
            warn!(
                "No cloud storage configured; assets will be stored under {}",
                upload_dir.display()
            );
        }
        Self {
            http: reqwest::Client::new(),
            cloudinary,
            gcs,
            upload_dir,
        }
    }

    fn default_extension(kind: AssetKind) -> &'static str {
        match kind {
            AssetKind::Image => "png",
            AssetKind::Audio => "mp3",
        }
    }

    fn content_type(kind: AssetKind, extension: &str) -> String {
        match kind {
            AssetKind::Image => format!("image/{}", extension),
            AssetKind::Audio => "audio/mpeg".to_string(),
        }
    }

    fn object_name(options: &UploadOptions) -> String {
        let extension = options
            .format
            .clone()
            .unwrap_or_else(|| Self::default_extension(options.kind).to_string());
        let stem = options
            .public_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        format!("{}/{}.{}", options.folder, stem, extension)
    }

    /// Cloudinary unsigned upload. The file part may be raw bytes or, for
    /// `upload_from_url`, the source URL itself.
    async fn upload_to_cloudinary(
        &self,
        config: &CloudinaryConfig,
        file_part: multipart::Part,
        options: &UploadOptions,
    ) -> PortResult<StoredAsset> {
        let resource_type = match options.kind {
            AssetKind::Image => "image",
            // Cloudinary stores audio under the video resource type.
            AssetKind::Audio => "video",
        };
        let endpoint = format!(
            "https://api.cloudinary.com/v1_1/{}/{}/upload",
            config.cloud_name, resource_type
        );

        let form = multipart::Form::new()
            .part("file", file_part)
            .text("upload_preset", config.upload_preset.clone())
            .text("folder", options.folder.clone());

        let response = self
            .http
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PortError::Upstream(format!("Cloudinary request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PortError::Upstream(format!(
                "Cloudinary returned status {}",
                response.status()
            )));
        }

        let body: CloudinaryUploadResponse = response
            .json()
            .await
            .map_err(|e| PortError::Upstream(format!("Cloudinary response malformed: {}", e)))?;

        Ok(StoredAsset {
            url: body.secure_url,
            public_id: Some(body.public_id),
            service: "cloudinary".to_string(),
        })
    }

    async fn upload_to_gcs(
        &self,
        config: &GcsConfig,
        data: &[u8],
        options: &UploadOptions,
    ) -> PortResult<StoredAsset> {
        let name = Self::object_name(options);
        let extension = name.rsplit('.').next().unwrap_or("bin");
        let endpoint = format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            config.bucket, name
        );

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&config.access_token)
            .header(
                "Content-Type",
                Self::content_type(options.kind, extension),
            )
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| PortError::Upstream(format!("GCS request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PortError::Upstream(format!(
                "GCS returned status {}",
                response.status()
            )));
        }

        Ok(StoredAsset {
            url: format!("https://storage.googleapis.com/{}/{}", config.bucket, name),
            public_id: Some(name),
            service: "gcs".to_string(),
        })
    }

    /// Writes the asset under the uploads directory and returns the path the
    /// static file route serves it from.
    async fn save_locally(&self, data: &[u8], options: &UploadOptions) -> PortResult<StoredAsset> {
        let name = Self::object_name(options);
        let target = self.upload_dir.join(&name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Persistence(e.to_string()))?;
        }
        tokio::fs::write(&target, data)
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        Ok(StoredAsset {
            url: format!("/uploads/{}", name),
            public_id: Some(name),
            service: "local".to_string(),
        })
    }

    async fn upload_bytes(&self, data: &[u8], options: &UploadOptions) -> PortResult<StoredAsset> {
        if let Some(config) = &self.cloudinary {
            let name = Self::object_name(options);
            let part = multipart::Part::bytes(data.to_vec()).file_name(name);
            match self.upload_to_cloudinary(config, part, options).await {
                Ok(asset) => return Ok(asset),
                Err(error) => warn!("Cloudinary upload failed, trying next backend: {}", error),
            }
        }

        if let Some(config) = &self.gcs {
            match self.upload_to_gcs(config, data, options).await {
                Ok(asset) => return Ok(asset),
                Err(error) => warn!("GCS upload failed, falling back to local storage: {}", error),
            }
        }

        self.save_locally(data, options).await
    }
}

//=========================================================================================
// `AssetStorageService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AssetStorageService for StorageAdapter {
    async fn upload_image(&self, data: &[u8], options: &UploadOptions) -> PortResult<StoredAsset> {
        self.upload_bytes(data, options).await
    }

    async fn upload_audio(&self, data: &[u8], options: &UploadOptions) -> PortResult<StoredAsset> {
        self.upload_bytes(data, options).await
    }

    async fn upload_from_url(&self, url: &str, options: &UploadOptions) -> PortResult<StoredAsset> {
        // Cloudinary can ingest a remote URL without us downloading it.
        if let Some(config) = &self.cloudinary {
            let part = multipart::Part::text(url.to_string());
            match self.upload_to_cloudinary(config, part, options).await {
                Ok(asset) => return Ok(asset),
                Err(error) => warn!("Cloudinary URL ingest failed: {}", error),
            }
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PortError::Upstream(format!("Asset download failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(PortError::Upstream(format!(
                "Asset download returned status {}",
                response.status()
            )));
        }
        let data = response
            .bytes()
            .await
            .map_err(|e| PortError::Upstream(format!("Asset download failed: {}", e)))?;

        self.upload_bytes(&data, options).await
    }

    async fn upload_file(&self, path: &Path, options: &UploadOptions) -> PortResult<StoredAsset> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        let mut options = options.clone();
        if options.format.is_none() {
            options.format = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_string);
        }

        self.upload_bytes(&data, &options).await
    }

    async fn delete_file(&self, public_id: &str, service: &str) {
        match service {
            "cloudinary" => {
                // Unsigned presets cannot authorize deletions; the asset is
                // left in place.
                debug!("Skipping Cloudinary deletion of {}", public_id);
            }
            "gcs" => {
                if let Some(config) = &self.gcs {
                    let endpoint = format!(
                        "https://storage.googleapis.com/storage/v1/b/{}/o/{}",
                        config.bucket,
                        public_id.replace('/', "%2F")
                    );
                    if let Err(error) = self
                        .http
                        .delete(&endpoint)
                        .bearer_auth(&config.access_token)
                        .send()
                        .await
                    {
                        debug!("GCS deletion of {} failed: {}", public_id, error);
                    }
                }
            }
            "local" => {
                let target = self.upload_dir.join(public_id);
                if let Err(error) = tokio::fs::remove_file(&target).await {
                    debug!("Local deletion of {} failed: {}", target.display(), error);
                }
            }
            other => debug!("No deletion handler for storage service '{}'", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_adapter(dir: &Path) -> StorageAdapter {
        StorageAdapter::new(None, None, dir.to_path_buf())
    }

    #[tokio::test]
    async fn test_local_upload_writes_file_and_returns_served_path() {
        let dir = std::env::temp_dir().join(format!("storybook_test_{}", Uuid::new_v4()));
        let adapter = local_adapter(&dir);

        let mut options = UploadOptions::image("storybook/images");
        options.public_id = Some("page_1".to_string());

        let asset = adapter.upload_image(b"png bytes", &options).await.unwrap();
        assert_eq!(asset.service, "local");
        assert_eq!(asset.url, "/uploads/storybook/images/page_1.png");

        let stored = tokio::fs::read(dir.join("storybook/images/page_1.png"))
            .await
            .unwrap();
        assert_eq!(stored, b"png bytes");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_audio_upload_uses_mp3_extension() {
        let dir = std::env::temp_dir().join(format!("storybook_test_{}", Uuid::new_v4()));
        let adapter = local_adapter(&dir);

        let asset = adapter
            .upload_audio(b"mp3 bytes", &UploadOptions::audio("storybook/audio"))
            .await
            .unwrap();
        assert!(asset.url.starts_with("/uploads/storybook/audio/"));
        assert!(asset.url.ends_with(".mp3"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_file_is_best_effort() {
        let dir = std::env::temp_dir().join(format!("storybook_test_{}", Uuid::new_v4()));
        let adapter = local_adapter(&dir);

        // Deleting something that never existed must not panic or error.
        adapter.delete_file("storybook/images/missing.png", "local").await;
        adapter.delete_file("whatever", "cloudinary").await;
    }

    #[test]
    fn test_upload_file_extension_dispatch() {
        assert_eq!(StorageAdapter::default_extension(AssetKind::Image), "png");
        assert_eq!(StorageAdapter::default_extension(AssetKind::Audio), "mp3");
        assert_eq!(
            StorageAdapter::content_type(AssetKind::Audio, "mp3"),
            "audio/mpeg"
        );
    }
}
