//! Domain error kinds for the asset store (spec §7).
//!
//! Validation and authorization errors are surfaced unchanged to callers.
//! `BackendFailure` embeds the backend identity that produced it.
//! `Transient` is only ever returned after an internal bounded retry has
//! already been exhausted - see [`crate::upload::RETRY_BACKOFF_MS`].

use thiserror::Error;

use crate::ids::{AssetId, IntentId, VersionId};
use crate::storage::BackendKind;

#[derive(Debug, Error)]
pub enum AssetStoreError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: actor lacks required role")]
    Forbidden,

    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("version not found: {0:?}")]
    VersionNotFound(VersionId),

    #[error("upload intent not found: {0:?}")]
    IntentNotFound(IntentId),

    #[error("folder already exists: {0}")]
    FolderExists(String),

    #[error("asset already exists at {folder_path}/{basename}")]
    AssetExists {
        folder_path: String,
        basename: String,
    },

    #[error("upload intent already consumed: {0:?}")]
    IntentConsumed(IntentId),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid basename: {0}")]
    InvalidBasename(String),

    #[error("invalid upload response: {0}")]
    InvalidUploadResponse(String),

    #[error("basename too long ({0} bytes)")]
    BasenameTooLong(usize),

    #[error("parent folder missing: {0}")]
    ParentMissing(String),

    #[error("{backend:?} backend failure: {message}")]
    BackendFailure {
        backend: BackendKind,
        message: String,
    },

    #[error("transient failure, retries exhausted: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AssetStoreError {
    pub fn asset_not_found(id: AssetId) -> Self {
        Self::AssetNotFound(id.to_string())
    }

    pub fn asset_not_found_at(folder_path: &str, basename: &str) -> Self {
        Self::AssetNotFound(format!("{folder_path}/{basename}"))
    }
}
