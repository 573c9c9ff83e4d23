//! S3-compatible backend ("r2" in spec terminology).
//!
//! Grounded on `aws-sdk-s3`'s presigning API rather than the teacher's
//! `object_store` crate: `object_store` has no presigned-URL primitive, and
//! §4.1 requires the server to hand the client a presigned PUT URL rather
//! than proxy the upload itself. The presigning shape here follows
//! `examples/other_examples/...get-convex-convex-backend__crates-aws_s3-src-storage.rs`
//! (`PresigningConfig::builder().expires_in(..)`, `.presigned(..)`).

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use bytes::Bytes;

use super::{BackendKind, IssuedUpload, ReadObject, StorageBackend, UploadMethod};
use crate::model::BackendLocator;

#[derive(Clone)]
pub struct S3CompatibleStore {
    client: Client,
    bucket: String,
    key_prefix: String,
    /// CDN-style base URL captured for public reads, e.g.
    /// `https://assets.example.com`. Rotating this later does not break
    /// already-issued versions because each version freezes its own
    /// `r2PublicUrl` at finish time (spec §4.1).
    public_base_url: String,
}

impl std::fmt::Debug for S3CompatibleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3CompatibleStore")
            .field("bucket", &self.bucket)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl S3CompatibleStore {
    pub async fn from_env(
        endpoint: &str,
        access_key_id: &str,
        secret_access_key: &str,
        bucket: &str,
        public_base_url: &str,
        key_prefix: &str,
    ) -> anyhow::Result<Self> {
        let credentials = aws_credential_types::Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "assetvault-r2",
        );
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new("auto"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.to_string(),
            key_prefix: key_prefix.trim_matches('/').to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Builds the pending key used before an upload intent has a real
    /// version number, per §4.2: `keyPrefix/assetId/pending-{intentId}/{basename}`.
    pub fn pending_key(&self, asset_id: &str, intent_id: &str, basename: &str) -> String {
        format!(
            "{}/{asset_id}/pending-{intent_id}/{basename}",
            self.key_prefix
        )
    }

    /// Builds the final key for a finished version:
    /// `keyPrefix/assetId/version/originalFilename`.
    pub fn final_key(&self, asset_id: &str, version: u32, filename: &str) -> String {
        format!("{}/{asset_id}/{version}/{filename}", self.key_prefix)
    }

    fn public_url_for(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }
}

#[async_trait]
impl StorageBackend for S3CompatibleStore {
    fn kind(&self) -> BackendKind {
        BackendKind::R2
    }

    async fn issue_upload(
        &self,
        key_hint: Option<&str>,
        content_type: Option<&str>,
    ) -> anyhow::Result<IssuedUpload> {
        let key = key_hint
            .ok_or_else(|| anyhow::anyhow!("S3-compatible backend requires a key hint"))?;
        let presigning_config = PresigningConfig::builder()
            .expires_in(Duration::from_secs(3600))
            .build()?;

        let mut request = self.client.put_object().bucket(&self.bucket).key(key);
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }
        let presigned = request.presigned(presigning_config).await?;

        Ok(IssuedUpload {
            upload_url: presigned.uri().to_string(),
            method: UploadMethod::Put,
            r2_key: Some(key.to_string()),
        })
    }

    fn resolve_public_url(&self, locator: &BackendLocator) -> Option<String> {
        locator.r2_public_url.clone()
    }

    async fn signed_read_url(
        &self,
        locator: &BackendLocator,
        ttl: Duration,
    ) -> anyhow::Result<String> {
        let key = locator
            .r2_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("locator has no r2Key"))?;
        let presigning_config = PresigningConfig::builder().expires_in(ttl).build()?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await?;
        Ok(presigned.uri().to_string())
    }

    async fn read_bytes(&self, locator: &BackendLocator) -> anyhow::Result<ReadObject> {
        let key = locator
            .r2_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("locator has no r2Key"))?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        let bytes = output.body.collect().await?.into_bytes();
        Ok(ReadObject { bytes })
    }

    async fn write_bytes(
        &self,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> anyhow::Result<BackendLocator> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(data.into())
            .send()
            .await?;
        Ok(BackendLocator::r2(key, self.public_url_for(key)))
    }

    fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    fn pending_key(&self, asset_id: &str, intent_id: &str, basename: &str) -> Option<String> {
        Some(S3CompatibleStore::pending_key(
            self, asset_id, intent_id, basename,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> S3CompatibleStore {
        S3CompatibleStore {
            client: Client::from_conf(
                aws_sdk_s3::config::Builder::new()
                    .region(aws_sdk_s3::config::Region::new("auto"))
                    .credentials_provider(aws_credential_types::Credentials::new(
                        "id", "secret", None, None, "test",
                    ))
                    .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
                    .build(),
            ),
            bucket: "test-bucket".to_string(),
            key_prefix: "assets".to_string(),
            public_base_url: "https://cdn.example.com".to_string(),
        }
    }

    #[test]
    fn pending_key_avoids_collisions_across_intents() {
        let store = store();
        let k1 = store.pending_key("asset-1", "intent-a", "a.png");
        let k2 = store.pending_key("asset-1", "intent-b", "a.png");
        assert_ne!(k1, k2);
        assert_eq!(k1, "assets/asset-1/pending-intent-a/a.png");
    }

    #[test]
    fn final_key_uses_version_and_filename() {
        let store = store();
        assert_eq!(
            store.final_key("asset-1", 3, "a.png"),
            "assets/asset-1/3/a.png"
        );
    }

    #[test]
    fn public_url_prefers_published_base() {
        let store = store();
        assert_eq!(
            store.public_url_for("assets/asset-1/3/a.png"),
            "https://cdn.example.com/assets/asset-1/3/a.png"
        );
    }

    #[test]
    fn resolve_public_url_reads_frozen_locator() {
        let store = store();
        let locator = BackendLocator::r2("k", "https://cdn.example.com/k");
        assert_eq!(
            store.resolve_public_url(&locator),
            Some("https://cdn.example.com/k".to_string())
        );
    }
}
