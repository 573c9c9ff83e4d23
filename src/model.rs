//! The asset/folder/version data model (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AssetId, ChangelogId, FolderId, IntentId, VersionId};

/// A node in the folder hierarchy. `path` is normalized (`""` for root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub path: String,
    pub name: String,
    pub parent_path: String,
    pub created_at: DateTime<Utc>,
}

/// The stable identity `(folder_path, basename)` under which versions
/// accumulate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub folder_path: String,
    pub basename: String,
    pub version_counter: u32,
    pub published_version_id: Option<VersionId>,
    pub updated_at: DateTime<Utc>,
}

/// Which storage backend a version's bytes live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKindTag {
    Convex,
    R2,
}

/// Lifecycle state of a version (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionState {
    Published,
    Archived,
}

/// Backend-specific locator for a version's bytes. At most one backend's
/// fields are populated, except transiently during migration (§4.7) when
/// both may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendLocator {
    pub storage_id: Option<String>,
    pub r2_key: Option<String>,
    pub r2_public_url: Option<String>,
}

impl BackendLocator {
    pub fn convex(storage_id: impl Into<String>) -> Self {
        Self {
            storage_id: Some(storage_id.into()),
            ..Default::default()
        }
    }

    pub fn r2(key: impl Into<String>, public_url: impl Into<String>) -> Self {
        Self {
            r2_key: Some(key.into()),
            r2_public_url: Some(public_url.into()),
            ..Default::default()
        }
    }

    /// The locator to prefer for a live read per §4.7: S3-compatible when
    /// both are populated (dual-pointed during migration).
    pub fn preferred_backend(&self) -> Option<BackendKindTag> {
        if self.r2_key.is_some() {
            Some(BackendKindTag::R2)
        } else if self.storage_id.is_some() {
            Some(BackendKindTag::Convex)
        } else {
            None
        }
    }
}

/// One immutable snapshot of bytes plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetVersion {
    pub id: VersionId,
    pub asset_id: AssetId,
    pub version: u32,
    pub state: VersionState,
    pub created_at: DateTime<Utc>,
    pub label: Option<String>,
    pub size: u64,
    pub content_type: String,
    pub original_filename: Option<String>,
    pub backend: BackendKindTag,
    pub locator: BackendLocator,
}

/// Ephemeral record coupling a future `finishUpload` to a specific
/// `startUpload` (spec §3, §4.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadIntent {
    pub intent_id: IntentId,
    pub asset_id: AssetId,
    pub folder_path: String,
    pub basename: String,
    pub backend: BackendKindTag,
    pub r2_key: Option<String>,
    pub storage_id: Option<String>,
    pub label: Option<String>,
    pub original_filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set by `finishUpload` the first time an intent is claimed. A second
    /// `finishUpload` on an already-consumed intent fails `IntentConsumed`
    /// rather than the misleading `IntentNotFound` (spec §4.2, §8 S5).
    pub consumed_at: Option<DateTime<Utc>>,
}

/// Kinds of changelog events (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangelogKind {
    FolderCreated,
    FolderRenamed,
    AssetCreated,
    AssetRenamed,
    VersionCreated,
    VersionPublished,
    VersionArchived,
}

/// One append-only changelog record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub id: ChangelogId,
    pub created_at: i64,
    pub kind: ChangelogKind,
    pub folder_path: String,
    pub basename: Option<String>,
    pub asset_id: Option<AssetId>,
    pub version_id: Option<VersionId>,
}

/// `(createdAt, id)` compound cursor used for changelog pagination
/// (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor {
    pub created_at: i64,
    pub id: ChangelogId,
}

impl Cursor {
    /// The initial cursor a fresh subscriber starts from.
    pub fn initial() -> Self {
        Self {
            created_at: 0,
            id: ChangelogId::from(uuid::Uuid::nil()),
        }
    }
}

impl From<&ChangelogEntry> for Cursor {
    fn from(entry: &ChangelogEntry) -> Self {
        Self {
            created_at: entry.created_at,
            id: entry.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_backend_favors_r2_when_dual_pointed() {
        let locator = BackendLocator {
            storage_id: Some("abc".into()),
            r2_key: Some("k".into()),
            r2_public_url: Some("https://cdn/k".into()),
        };
        assert_eq!(locator.preferred_backend(), Some(BackendKindTag::R2));
    }

    #[test]
    fn preferred_backend_falls_back_to_convex() {
        let locator = BackendLocator::convex("abc");
        assert_eq!(locator.preferred_backend(), Some(BackendKindTag::Convex));
    }

    #[test]
    fn initial_cursor_sorts_before_everything() {
        let entry_cursor = Cursor {
            created_at: 1,
            id: ChangelogId::new(),
        };
        assert!(Cursor::initial() < entry_cursor);
    }
}
