//! Orchestration / public API layer (spec §6).
//!
//! Wraps every core operation with the authorization rule §6 assigns it
//! and threads the environment-derived [`BackendConfig`] through to
//! component construction rather than letting components read the
//! environment themselves (spec §9 "Global config as capability").
//! Mirrors the shape of `rivetdb`'s `HotDataEngine`, which is likewise
//! the single struct `bin/server.rs` constructs and hands to the router.

use std::sync::RwLock;
use std::time::Duration;

use bytes::Bytes;

use crate::auth::{Actor, Role};
use crate::changelog::{ChangelogEngine, ChangelogPage};
use crate::config::{BackendConfig, BackendSelection};
use crate::error::AssetStoreError;
use crate::folder::FolderManager;
use crate::ids::{AssetId, IntentId, VersionId};
use crate::migration::MigrationEngine;
use crate::model::{Asset, AssetVersion, ChangelogKind, Cursor, Folder};
use crate::paths;
use crate::repo::AssetRepository;
use crate::storage::{BackendKind, ConvexBlobStore, S3CompatibleStore, StorageBackend};
use crate::upload::{FinishUploadResult, StartUploadResult, UploadConfirmation, UploadCoordinator};
use crate::version::{RestoreResult, VersionManager};

/// What a read route should do with a resolved version: stream bytes
/// through the server, or redirect the client to a backend-served URL
/// (spec §4.6).
pub enum ServeOutcome {
    Inline { content_type: String, bytes: Bytes },
    Redirect(String),
}

enum BackendHandle {
    Convex(ConvexBlobStore),
    R2(S3CompatibleStore),
}

impl BackendHandle {
    fn as_backend(&self) -> &dyn StorageBackend {
        match self {
            BackendHandle::Convex(store) => store,
            BackendHandle::R2(store) => store,
        }
    }
}

pub struct AssetStore {
    repo: AssetRepository,
    config: RwLock<BackendConfig>,
}

impl AssetStore {
    pub fn new(repo: AssetRepository, config: BackendConfig) -> Self {
        Self {
            repo,
            config: RwLock::new(config),
        }
    }

    pub fn repo(&self) -> &AssetRepository {
        &self.repo
    }

    /// Re-reads the active backend config. Call sites hold the lock only
    /// long enough to clone it, matching spec §4.1's "read per request so
    /// hot-swapping is permitted".
    pub fn set_backend_config(&self, config: BackendConfig) {
        *self.config.write().expect("config lock poisoned") = config;
    }

    fn current_config(&self) -> BackendConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    async fn build_backend(&self) -> Result<BackendHandle, AssetStoreError> {
        let config = self.current_config();
        match config.selection {
            BackendSelection::Convex => Ok(BackendHandle::Convex(ConvexBlobStore::new(
                config.blob_base_dir,
                config.upload_base_url,
            ))),
            BackendSelection::R2(r2) => {
                let store = S3CompatibleStore::from_env(
                    &r2.endpoint,
                    &r2.access_key_id,
                    &r2.secret_access_key,
                    &r2.bucket,
                    &r2.public_url,
                    &r2.key_prefix,
                )
                .await
                .map_err(|e| AssetStoreError::BackendFailure {
                    backend: BackendKind::R2,
                    message: e.to_string(),
                })?;
                Ok(BackendHandle::R2(store))
            }
        }
    }

    /// Builds the backend a specific version's bytes actually live in,
    /// rather than whichever backend the process currently issues new
    /// uploads against. Reads must key off the version (§4.6) - or, for a
    /// version mid-migration, off whichever locator field is populated
    /// (§4.7) - not off the hot-swappable upload selection.
    async fn build_backend_for(
        &self,
        kind: crate::model::BackendKindTag,
    ) -> Result<BackendHandle, AssetStoreError> {
        use crate::model::BackendKindTag;

        let config = self.current_config();
        match kind {
            BackendKindTag::Convex => Ok(BackendHandle::Convex(ConvexBlobStore::new(
                config.blob_base_dir,
                config.upload_base_url,
            ))),
            BackendKindTag::R2 => match config.selection {
                BackendSelection::R2(r2) => {
                    let store = S3CompatibleStore::from_env(
                        &r2.endpoint,
                        &r2.access_key_id,
                        &r2.secret_access_key,
                        &r2.bucket,
                        &r2.public_url,
                        &r2.key_prefix,
                    )
                    .await
                    .map_err(|e| AssetStoreError::BackendFailure {
                        backend: BackendKind::R2,
                        message: e.to_string(),
                    })?;
                    Ok(BackendHandle::R2(store))
                }
                BackendSelection::Convex => Err(AssetStoreError::BackendFailure {
                    backend: BackendKind::R2,
                    message: "S3-compatible backend is not configured".into(),
                }),
            },
        }
    }

    /// Resolves which concrete backend a version's bytes live in, per
    /// §4.7: prefer the S3-compatible locator when both are populated
    /// (mid-migration), otherwise fall back to the version's recorded
    /// backend.
    async fn build_backend_for_version(
        &self,
        version: &AssetVersion,
    ) -> Result<BackendHandle, AssetStoreError> {
        let kind = version
            .locator
            .preferred_backend()
            .unwrap_or(version.backend);
        self.build_backend_for(kind).await
    }

    /// True if `email` is listed in `ADMIN_EMAILS` or matches the
    /// `CONVEX_ADMIN_KEY` bypass token (spec §6 env vars).
    pub fn resolve_actor(&self, email: Option<&str>, bypass_token: Option<&str>) -> Actor {
        let config = self.current_config();
        if let (Some(expected), Some(provided)) =
            (config.convex_admin_key.as_deref(), bypass_token)
        {
            if expected == provided {
                return Actor::Admin;
            }
        }
        match email {
            None => Actor::Anonymous,
            Some(email) if config.admin_emails.iter().any(|e| e == email) => Actor::Admin,
            Some(_) => Actor::Authed,
        }
    }

    // -----------------------------------------------------------------
    // Folders (admin)
    // -----------------------------------------------------------------

    pub async fn list_folders(
        &self,
        actor: Actor,
        parent_path: &str,
    ) -> Result<Vec<Folder>, AssetStoreError> {
        actor.require(Role::Admin)?;
        FolderManager::new(&self.repo).list_folders(parent_path).await
    }

    pub async fn list_all_folders(&self, actor: Actor) -> Result<Vec<Folder>, AssetStoreError> {
        actor.require(Role::Admin)?;
        FolderManager::new(&self.repo).list_all_folders().await
    }

    pub async fn get_folder(&self, actor: Actor, path: &str) -> Result<Folder, AssetStoreError> {
        actor.require(Role::Admin)?;
        FolderManager::new(&self.repo).get_folder(path).await
    }

    pub async fn create_folder_by_name(
        &self,
        actor: Actor,
        parent_path: &str,
        name: &str,
    ) -> Result<Folder, AssetStoreError> {
        actor.require(Role::Admin)?;
        FolderManager::new(&self.repo)
            .create_folder_by_name(parent_path, name)
            .await
    }

    pub async fn create_folder_by_path(
        &self,
        actor: Actor,
        path: &str,
    ) -> Result<Folder, AssetStoreError> {
        actor.require(Role::Admin)?;
        FolderManager::new(&self.repo).create_folder_by_path(path).await
    }

    /// `Folder` has no mutable field besides identity (rename is
    /// deliberately out of scope, spec §4.4), so this only authorizes and
    /// confirms existence - there is nothing else for it to change.
    pub async fn update_folder(&self, actor: Actor, path: &str) -> Result<Folder, AssetStoreError> {
        actor.require(Role::Admin)?;
        FolderManager::new(&self.repo).get_folder(path).await
    }

    // -----------------------------------------------------------------
    // Assets (admin for management, public for reads)
    // -----------------------------------------------------------------

    pub async fn list_assets(
        &self,
        actor: Actor,
        folder_path: &str,
    ) -> Result<Vec<Asset>, AssetStoreError> {
        actor.require(Role::Admin)?;
        let folder_path = paths::normalize_folder_path(folder_path);
        Ok(self.repo.list_assets_in_folder(&folder_path).await?)
    }

    pub async fn get_asset(
        &self,
        actor: Actor,
        folder_path: &str,
        basename: &str,
    ) -> Result<Asset, AssetStoreError> {
        actor.require(Role::Admin)?;
        let folder_path = paths::normalize_folder_path(folder_path);
        self.repo
            .get_asset(&folder_path, basename)
            .await?
            .ok_or_else(|| AssetStoreError::asset_not_found_at(&folder_path, basename))
    }

    pub async fn create_asset(
        &self,
        actor: Actor,
        folder_path: &str,
        basename: &str,
    ) -> Result<Asset, AssetStoreError> {
        actor.require(Role::Admin)?;
        let folder_path = paths::normalize_folder_path(folder_path);
        paths::validate_basename(basename)?;

        FolderManager::new(&self.repo).get_folder(&folder_path).await?;
        if self.repo.get_asset(&folder_path, basename).await?.is_some() {
            return Err(AssetStoreError::AssetExists {
                folder_path,
                basename: basename.to_string(),
            });
        }

        let asset = Asset {
            id: AssetId::new(),
            folder_path: folder_path.clone(),
            basename: basename.to_string(),
            version_counter: 0,
            published_version_id: None,
            updated_at: chrono::Utc::now(),
        };
        let mut tx = self.repo.begin().await?;
        self.repo.insert_asset(&mut tx, &asset).await?;
        crate::changelog::append(
            &self.repo,
            &mut tx,
            ChangelogKind::AssetCreated,
            &folder_path,
            Some(basename),
            Some(asset.id),
            None,
        )
        .await?;
        tx.commit().await.map_err(anyhow::Error::from)?;

        Ok(asset)
    }

    pub async fn rename_asset(
        &self,
        actor: Actor,
        folder_path: &str,
        basename: &str,
        new_basename: &str,
    ) -> Result<(), AssetStoreError> {
        VersionManager::new(&self.repo)
            .rename_asset(actor, folder_path, basename, new_basename)
            .await
    }

    // -----------------------------------------------------------------
    // Versions (public reads, authed mutations)
    // -----------------------------------------------------------------

    pub async fn get_asset_versions(
        &self,
        actor: Actor,
        folder_path: &str,
        basename: &str,
    ) -> Result<Vec<AssetVersion>, AssetStoreError> {
        actor.require(Role::Public)?;
        let folder_path = paths::normalize_folder_path(folder_path);
        let asset = self
            .repo
            .get_asset(&folder_path, basename)
            .await?
            .ok_or_else(|| AssetStoreError::asset_not_found_at(&folder_path, basename))?;
        VersionManager::new(&self.repo).list_versions(asset.id).await
    }

    pub async fn restore_version(
        &self,
        actor: Actor,
        version_id: VersionId,
    ) -> Result<RestoreResult, AssetStoreError> {
        VersionManager::new(&self.repo)
            .restore_version(actor, version_id)
            .await
    }

    /// Resolves `(folderPath, basename)` to its published version and how
    /// the HTTP layer should serve it (spec §4.6 stable path route).
    pub async fn get_published_file(
        &self,
        actor: Actor,
        folder_path: &str,
        basename: &str,
    ) -> Result<(AssetVersion, ServeOutcome), AssetStoreError> {
        actor.require(Role::Public)?;
        let folder_path = paths::normalize_folder_path(folder_path);
        let asset = self
            .repo
            .get_asset(&folder_path, basename)
            .await?
            .ok_or_else(|| AssetStoreError::asset_not_found_at(&folder_path, basename))?;
        let version = self
            .repo
            .get_published_version(&asset)
            .await?
            .ok_or_else(|| AssetStoreError::asset_not_found_at(&folder_path, basename))?;
        let outcome = self.serve(&version).await?;
        Ok((version, outcome))
    }

    /// Resolves an immutable version ID regardless of publish state (spec
    /// §4.6 `/assets/v/{versionId}` route).
    pub async fn get_version_file(
        &self,
        actor: Actor,
        version_id: VersionId,
    ) -> Result<(AssetVersion, ServeOutcome), AssetStoreError> {
        actor.require(Role::Public)?;
        let version = self
            .repo
            .get_version(version_id)
            .await?
            .ok_or(AssetStoreError::VersionNotFound(version_id))?;
        let outcome = self.serve(&version).await?;
        Ok((version, outcome))
    }

    async fn serve(&self, version: &AssetVersion) -> Result<ServeOutcome, AssetStoreError> {
        let handle = self.build_backend_for_version(version).await?;
        let backend = handle.as_backend();
        if let Some(url) = backend.resolve_public_url(&version.locator) {
            return Ok(ServeOutcome::Redirect(url));
        }
        let read = backend
            .read_bytes(&version.locator)
            .await
            .map_err(|e| AssetStoreError::BackendFailure {
                backend: backend.kind(),
                message: e.to_string(),
            })?;
        Ok(ServeOutcome::Inline {
            content_type: version.content_type.clone(),
            bytes: read.bytes,
        })
    }

    pub async fn list_published_files_in_folder(
        &self,
        actor: Actor,
        folder_path: &str,
    ) -> Result<Vec<(Asset, AssetVersion)>, AssetStoreError> {
        actor.require(Role::Public)?;
        let folder_path = paths::normalize_folder_path(folder_path);
        let assets = self.repo.list_assets_in_folder(&folder_path).await?;
        let mut out = Vec::with_capacity(assets.len());
        for asset in assets {
            if let Some(version) = self.repo.get_published_version(&asset).await? {
                out.push((asset, version));
            }
        }
        Ok(out)
    }

    pub async fn get_version_preview_url(
        &self,
        actor: Actor,
        version_id: VersionId,
    ) -> Result<String, AssetStoreError> {
        actor.require(Role::Public)?;
        let version = self
            .repo
            .get_version(version_id)
            .await?
            .ok_or(AssetStoreError::VersionNotFound(version_id))?;
        let handle = self.build_backend_for_version(&version).await?;
        let backend = handle.as_backend();
        if let Some(url) = backend.resolve_public_url(&version.locator) {
            return Ok(url);
        }
        backend
            .signed_read_url(&version.locator, Duration::from_secs(300))
            .await
            .map_err(|e| AssetStoreError::BackendFailure {
                backend: backend.kind(),
                message: e.to_string(),
            })
    }

    pub async fn get_signed_url(
        &self,
        actor: Actor,
        version_id: VersionId,
        ttl: Duration,
    ) -> Result<String, AssetStoreError> {
        actor.require(Role::Public)?;
        let version = self
            .repo
            .get_version(version_id)
            .await?
            .ok_or(AssetStoreError::VersionNotFound(version_id))?;
        let handle = self.build_backend_for_version(&version).await?;
        let backend = handle.as_backend();
        backend
            .signed_read_url(&version.locator, ttl)
            .await
            .map_err(|e| AssetStoreError::BackendFailure {
                backend: backend.kind(),
                message: e.to_string(),
            })
    }

    pub async fn get_text_content(
        &self,
        actor: Actor,
        folder_path: &str,
        basename: &str,
    ) -> Result<String, AssetStoreError> {
        actor.require(Role::Public)?;
        let folder_path = paths::normalize_folder_path(folder_path);
        let asset = self
            .repo
            .get_asset(&folder_path, basename)
            .await?
            .ok_or_else(|| AssetStoreError::asset_not_found_at(&folder_path, basename))?;
        let version = self
            .repo
            .get_published_version(&asset)
            .await?
            .ok_or_else(|| AssetStoreError::asset_not_found_at(&folder_path, basename))?;
        let handle = self.build_backend_for_version(&version).await?;
        let backend = handle.as_backend();
        let read = backend
            .read_bytes(&version.locator)
            .await
            .map_err(|e| AssetStoreError::BackendFailure {
                backend: backend.kind(),
                message: e.to_string(),
            })?;
        String::from_utf8(read.bytes.to_vec())
            .map_err(|e| AssetStoreError::InvalidUploadResponse(e.to_string()))
    }

    /// Backs the platform backend's own upload-accept route
    /// (`POST /internal/blobs`): mints a fresh opaque handle and persists
    /// the client's uploaded bytes under it. Not part of the §6 operation
    /// surface - it is the HTTP-layer counterpart to the URL
    /// `issue_upload` hands out for the platform backend.
    pub async fn accept_blob_upload(&self, data: Bytes) -> Result<String, AssetStoreError> {
        let config = self.current_config();
        let backend = ConvexBlobStore::new(config.blob_base_dir, config.upload_base_url);
        backend
            .store(data)
            .await
            .map_err(|e| AssetStoreError::BackendFailure {
                backend: BackendKind::Convex,
                message: e.to_string(),
            })
    }

    // -----------------------------------------------------------------
    // Uploads (authed)
    // -----------------------------------------------------------------

    pub async fn start_upload(
        &self,
        actor: Actor,
        folder_path: &str,
        basename: &str,
        filename: Option<&str>,
        label: Option<&str>,
    ) -> Result<StartUploadResult, AssetStoreError> {
        let handle = self.build_backend().await?;
        UploadCoordinator::new(&self.repo, handle.as_backend())
            .start_upload(actor, folder_path, basename, filename, label)
            .await
    }

    pub async fn finish_upload(
        &self,
        actor: Actor,
        intent_id: IntentId,
        confirmation: UploadConfirmation,
        size: u64,
        content_type: &str,
    ) -> Result<FinishUploadResult, AssetStoreError> {
        let handle = self.build_backend().await?;
        UploadCoordinator::new(&self.repo, handle.as_backend())
            .finish_upload(actor, intent_id, confirmation, size, content_type)
            .await
    }

    // -----------------------------------------------------------------
    // Changelog (admin)
    //
    // This returns the current page only - the "value" half of spec §9's
    // query-plus-subscribe pair. The subscribe half (WebSocket fan-out
    // driven by the by_created_at index) lives in the HTTP/transport
    // layer the spec places out of scope, not in this core.
    // -----------------------------------------------------------------

    pub async fn watch_changelog(
        &self,
        actor: Actor,
        cursor: Cursor,
    ) -> Result<ChangelogPage, AssetStoreError> {
        actor.require(Role::Admin)?;
        Ok(ChangelogEngine::new(&self.repo)
            .list_since(cursor, None)
            .await?)
    }

    pub async fn watch_folder_changes(
        &self,
        actor: Actor,
        folder_path: &str,
        cursor: Cursor,
    ) -> Result<ChangelogPage, AssetStoreError> {
        actor.require(Role::Admin)?;
        let folder_path = paths::normalize_folder_path(folder_path);
        Ok(ChangelogEngine::new(&self.repo)
            .list_for_folder(&folder_path, cursor, None)
            .await?)
    }

    // -----------------------------------------------------------------
    // Migration (admin)
    // -----------------------------------------------------------------

    pub async fn migrate_all_to_r2(
        &self,
        actor: Actor,
    ) -> Result<Vec<(VersionId, Result<(), AssetStoreError>)>, AssetStoreError> {
        actor.require(Role::Admin)?;
        let config = self.current_config();
        let BackendSelection::R2(r2) = config.selection else {
            return Err(AssetStoreError::BackendFailure {
                backend: BackendKind::R2,
                message: "no S3-compatible backend configured".into(),
            });
        };
        let source = ConvexBlobStore::new(config.blob_base_dir, config.upload_base_url);
        let target = S3CompatibleStore::from_env(
            &r2.endpoint,
            &r2.access_key_id,
            &r2.secret_access_key,
            &r2.bucket,
            &r2.public_url,
            &r2.key_prefix,
        )
        .await
        .map_err(|e| AssetStoreError::BackendFailure {
            backend: BackendKind::R2,
            message: e.to_string(),
        })?;
        MigrationEngine::new(&self.repo, &source, &target)
            .migrate_all_to_r2()
            .await
    }

    // -----------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------

    /// Deletes upload intents past their TTL (spec §4.2 "expires after a
    /// bounded TTL... after which it is ignored and may be swept", §5
    /// "sweep is at most best-effort"). Not gated on an `Actor` - it has
    /// no user-facing effect beyond freeing rows, and `bin/server.rs` runs
    /// it from a background task rather than an HTTP route.
    pub async fn sweep_expired_intents(&self) -> Result<u64, AssetStoreError> {
        Ok(self.repo.sweep_expired_intents(chrono::Utc::now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (AssetStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = AssetRepository::in_memory().await.unwrap();
        let asset_store = AssetStore::new(
            repo,
            BackendConfig {
                selection: BackendSelection::Convex,
                admin_emails: vec!["admin@example.com".to_string()],
                convex_admin_key: Some("bypass-token".to_string()),
                blob_base_dir: dir.path().to_string_lossy().to_string(),
                upload_base_url: "http://localhost:8080".to_string(),
            },
        );
        (asset_store, dir)
    }

    #[tokio::test]
    async fn resolve_actor_matches_admin_email() {
        let (store, _dir) = store().await;
        assert_eq!(
            store.resolve_actor(Some("admin@example.com"), None),
            Actor::Admin
        );
        assert_eq!(
            store.resolve_actor(Some("someone@example.com"), None),
            Actor::Authed
        );
        assert_eq!(store.resolve_actor(None, None), Actor::Anonymous);
    }

    #[tokio::test]
    async fn resolve_actor_bypass_token_grants_admin() {
        let (store, _dir) = store().await;
        assert_eq!(
            store.resolve_actor(None, Some("bypass-token")),
            Actor::Admin
        );
    }

    #[tokio::test]
    async fn end_to_end_s1_create_upload_publish() {
        let (store, dir) = store().await;
        store
            .create_folder_by_path(Actor::Admin, "images/hero")
            .await
            .unwrap();

        let started = store
            .start_upload(
                Actor::Authed,
                "images/hero",
                "a.png",
                Some("a.png"),
                None,
            )
            .await
            .unwrap();

        // Simulate the client's direct POST to the issued upload URL: the
        // platform backend mints a storageId and persists the bytes.
        let backend = ConvexBlobStore::new(dir.path(), "http://localhost:8080");
        let storage_id = backend
            .store(Bytes::from_static(b"\x89PNG fake bytes"))
            .await
            .unwrap();

        let finished = store
            .finish_upload(
                Actor::Authed,
                started.intent_id,
                UploadConfirmation::Convex { storage_id },
                1234,
                "image/png",
            )
            .await
            .unwrap();
        assert_eq!(finished.version, 1);

        let (version, outcome) = store
            .get_published_file(Actor::Anonymous, "images/hero", "a.png")
            .await
            .unwrap();
        assert_eq!(version.version, 1);
        match outcome {
            ServeOutcome::Inline { bytes, .. } => {
                assert_eq!(&bytes[..], b"\x89PNG fake bytes")
            }
            ServeOutcome::Redirect(_) => panic!("convex backend should stream, not redirect"),
        }

        let versions = store
            .get_asset_versions(Actor::Anonymous, "images/hero", "a.png")
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
    }
}
