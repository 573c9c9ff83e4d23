//! Storage backend abstraction (spec §4.1).
//!
//! The two backends form a closed sum - implemented here as a small
//! capability trait plus a tagged enum, not an open hierarchy (spec §9
//! "Inheritance / polymorphism").

pub mod convex;
pub mod s3;

pub use convex::ConvexBlobStore;
pub use s3::S3CompatibleStore;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::model::BackendLocator;

/// Which backend produced/owns a locator. Mirrors `BackendKindTag` in the
/// data model but lives in `storage` because it also tags backend-failure
/// errors that never touch a stored version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Convex,
    R2,
}

impl From<BackendKind> for crate::model::BackendKindTag {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Convex => crate::model::BackendKindTag::Convex,
            BackendKind::R2 => crate::model::BackendKindTag::R2,
        }
    }
}

/// HTTP method the client must use against an issued upload URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadMethod {
    Post,
    Put,
}

/// The result of `issue_upload`: a URL the client sends bytes to, the
/// method to use, and a hint for what `finishUpload` must receive back.
#[derive(Debug, Clone)]
pub struct IssuedUpload {
    pub upload_url: String,
    pub method: UploadMethod,
    /// For the platform backend this is `None` - the client's upload
    /// response carries the `storageId` itself. For the S3-compatible
    /// backend this is the key the object will land at.
    pub r2_key: Option<String>,
}

/// Bytes read back from a backend.
pub struct ReadObject {
    pub bytes: Bytes,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Issues an upload URL for a not-yet-existing object. `key_hint` is
    /// the S3-compatible key to use if this backend is key-addressed;
    /// ignored by backends that mint their own handle (Convex).
    async fn issue_upload(
        &self,
        key_hint: Option<&str>,
        content_type: Option<&str>,
    ) -> anyhow::Result<IssuedUpload>;

    /// The publicly reachable URL for a locator, if this backend serves
    /// reads directly (S3-compatible). Returns `None` for backends that
    /// must stream through the server (Convex).
    fn resolve_public_url(&self, locator: &BackendLocator) -> Option<String>;

    /// A short-lived signed URL for private access.
    async fn signed_read_url(
        &self,
        locator: &BackendLocator,
        ttl: Duration,
    ) -> anyhow::Result<String>;

    /// Server-side read of the full object, used for streaming through
    /// the HTTP layer and for migration.
    async fn read_bytes(&self, locator: &BackendLocator) -> anyhow::Result<ReadObject>;

    /// Writes bytes directly, used by the migration engine to copy a
    /// version's content into this backend.
    async fn write_bytes(
        &self,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> anyhow::Result<BackendLocator>;

    /// Deterministic key prefix applied to every object this backend
    /// writes. Only meaningful for key-addressed backends.
    fn key_prefix(&self) -> &str;

    /// Pre-assigns the key an upload intent will land at, for
    /// key-addressed backends (spec §4.2: `pending-{intentId}` avoids
    /// collisions between concurrent intents on the same asset). Handle
    /// backends that mint their own identifier return `None`.
    fn pending_key(&self, _asset_id: &str, _intent_id: &str, _basename: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_tag_roundtrip() {
        let tag: crate::model::BackendKindTag = BackendKind::R2.into();
        assert_eq!(tag, crate::model::BackendKindTag::R2);
    }
}
