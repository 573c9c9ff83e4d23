//! Platform blob store backend ("convex" in spec terminology).
//!
//! The real system backing this backend is outside this crate's scope; we
//! ground it the way `rivetdb::storage::filesystem` grounds its local
//! backend - plain files under a base directory, addressed by an opaque
//! handle (`storageId`) rather than a caller-chosen path. Uploads land via
//! a POST the server itself accepts (see `http::routes::accept_blob_upload`)
//! because, unlike the S3-compatible backend, this backend has no
//! independent endpoint to presign a URL against.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use super::{BackendKind, IssuedUpload, ReadObject, StorageBackend, UploadMethod};
use crate::model::BackendLocator;

#[derive(Debug, Clone)]
pub struct ConvexBlobStore {
    base_dir: PathBuf,
    /// Base URL of this server's own upload-accept route, e.g.
    /// `http://localhost:8080/internal/blobs`.
    upload_base_url: String,
}

impl ConvexBlobStore {
    pub fn new(base_dir: impl Into<PathBuf>, upload_base_url: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            upload_base_url: upload_base_url.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, storage_id: &str) -> PathBuf {
        self.base_dir.join(storage_id)
    }

    /// Called by the HTTP layer's upload-accept route once a client's PUT
    /// body has been fully read. Mints a fresh opaque handle and persists
    /// the bytes under it.
    pub async fn store(&self, data: Bytes) -> anyhow::Result<String> {
        fs::create_dir_all(&self.base_dir).await?;
        let storage_id = uuid::Uuid::new_v4().to_string();
        fs::write(self.path_for(&storage_id), &data).await?;
        Ok(storage_id)
    }
}

#[async_trait]
impl StorageBackend for ConvexBlobStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Convex
    }

    async fn issue_upload(
        &self,
        _key_hint: Option<&str>,
        _content_type: Option<&str>,
    ) -> anyhow::Result<IssuedUpload> {
        Ok(IssuedUpload {
            upload_url: format!("{}/internal/blobs", self.upload_base_url),
            method: UploadMethod::Post,
            r2_key: None,
        })
    }

    fn resolve_public_url(&self, _locator: &BackendLocator) -> Option<String> {
        // Convex-backed versions are streamed through the server's own
        // route (see http::routes), never linked to directly.
        None
    }

    async fn signed_read_url(
        &self,
        locator: &BackendLocator,
        _ttl: Duration,
    ) -> anyhow::Result<String> {
        let storage_id = locator
            .storage_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("locator has no storageId"))?;
        Ok(format!("{}/internal/blobs/{storage_id}", self.upload_base_url))
    }

    async fn read_bytes(&self, locator: &BackendLocator) -> anyhow::Result<ReadObject> {
        let storage_id = locator
            .storage_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("locator has no storageId"))?;
        let bytes = fs::read(self.path_for(storage_id)).await?;
        Ok(ReadObject {
            bytes: Bytes::from(bytes),
        })
    }

    async fn write_bytes(
        &self,
        _key: &str,
        _content_type: &str,
        data: Bytes,
    ) -> anyhow::Result<BackendLocator> {
        let storage_id = self.store(data).await?;
        Ok(BackendLocator::convex(storage_id))
    }

    fn key_prefix(&self) -> &str {
        ""
    }
}
