//! Version manager: publish/archive/restore state machine (spec §4.3).

use chrono::Utc;

use crate::auth::{Actor, Role};
use crate::changelog;
use crate::error::AssetStoreError;
use crate::ids::VersionId;
use crate::model::{AssetVersion, ChangelogKind, VersionState};
use crate::paths;
use crate::repo::AssetRepository;

pub struct RestoreResult {
    pub version_id: VersionId,
    pub version: u32,
}

pub struct VersionManager<'a> {
    repo: &'a AssetRepository,
}

impl<'a> VersionManager<'a> {
    pub fn new(repo: &'a AssetRepository) -> Self {
        Self { repo }
    }

    pub async fn get_version(&self, id: VersionId) -> Result<AssetVersion, AssetStoreError> {
        self.repo
            .get_version(id)
            .await?
            .ok_or(AssetStoreError::VersionNotFound(id))
    }

    pub async fn list_versions(
        &self,
        asset_id: crate::ids::AssetId,
    ) -> Result<Vec<AssetVersion>, AssetStoreError> {
        Ok(self.repo.list_versions_for_asset(asset_id).await?)
    }

    /// Duplicates `version_id`'s metadata and locator as a fresh, newly
    /// numbered published version, archiving whatever was previously
    /// published. Not idempotent: calling it twice on the same archived
    /// version produces two distinct new versions (spec §8).
    pub async fn restore_version(
        &self,
        actor: Actor,
        version_id: VersionId,
    ) -> Result<RestoreResult, AssetStoreError> {
        actor.require(Role::Authed)?;

        let source = self.get_version(version_id).await?;
        let asset = self
            .repo
            .get_asset_by_id(source.asset_id)
            .await?
            .ok_or(AssetStoreError::asset_not_found(source.asset_id))?;

        let mut tx = self.repo.begin().await?;

        let new_version_number = asset.version_counter + 1;
        let restored = AssetVersion {
            id: VersionId::new(),
            asset_id: asset.id,
            version: new_version_number,
            state: VersionState::Published,
            created_at: Utc::now(),
            label: source.label.clone(),
            size: source.size,
            content_type: source.content_type.clone(),
            original_filename: source.original_filename.clone(),
            backend: source.backend,
            locator: source.locator.clone(),
        };
        self.repo.insert_version(&mut tx, &restored).await?;
        changelog::append(
            self.repo,
            &mut tx,
            ChangelogKind::VersionCreated,
            &asset.folder_path,
            Some(&asset.basename),
            Some(asset.id),
            Some(restored.id),
        )
        .await?;

        if let Some(previous_id) = asset.published_version_id {
            self.repo.archive_version(&mut tx, previous_id).await?;
            changelog::append(
                self.repo,
                &mut tx,
                ChangelogKind::VersionArchived,
                &asset.folder_path,
                Some(&asset.basename),
                Some(asset.id),
                Some(previous_id),
            )
            .await?;
        }

        self.repo
            .update_asset_after_finish(
                &mut tx,
                asset.id,
                new_version_number,
                restored.id,
                Utc::now(),
            )
            .await?;
        changelog::append(
            self.repo,
            &mut tx,
            ChangelogKind::VersionPublished,
            &asset.folder_path,
            Some(&asset.basename),
            Some(asset.id),
            Some(restored.id),
        )
        .await?;

        tx.commit().await.map_err(anyhow::Error::from)?;

        Ok(RestoreResult {
            version_id: restored.id,
            version: new_version_number,
        })
    }

    pub async fn rename_asset(
        &self,
        actor: Actor,
        folder_path: &str,
        basename: &str,
        new_basename: &str,
    ) -> Result<(), AssetStoreError> {
        actor.require(Role::Admin)?;

        paths::validate_basename(new_basename)?;
        let folder_path = paths::normalize_folder_path(folder_path);

        let asset = self
            .repo
            .get_asset(&folder_path, basename)
            .await?
            .ok_or_else(|| AssetStoreError::asset_not_found_at(&folder_path, basename))?;

        if self
            .repo
            .get_asset(&folder_path, new_basename)
            .await?
            .is_some()
        {
            return Err(AssetStoreError::AssetExists {
                folder_path,
                basename: new_basename.to_string(),
            });
        }

        let mut tx = self.repo.begin().await?;
        self.repo
            .rename_asset(&mut tx, asset.id, new_basename, Utc::now())
            .await?;
        changelog::append(
            self.repo,
            &mut tx,
            ChangelogKind::AssetRenamed,
            &folder_path,
            Some(new_basename),
            Some(asset.id),
            None,
        )
        .await?;
        tx.commit().await.map_err(anyhow::Error::from)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::FolderManager;
    use crate::storage::ConvexBlobStore;
    use crate::upload::{UploadConfirmation, UploadCoordinator};

    async fn seed_one_version() -> (AssetRepository, crate::ids::AssetId, VersionId) {
        let repo = AssetRepository::in_memory().await.unwrap();
        FolderManager::new(&repo)
            .create_folder_by_path("images")
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let backend = ConvexBlobStore::new(dir.path(), "http://localhost:8080");
        let coordinator = UploadCoordinator::new(&repo, &backend);
        let started = coordinator
            .start_upload(Actor::Authed, "images", "a.png", None, None)
            .await
            .unwrap();
        let finished = coordinator
            .finish_upload(
                Actor::Authed,
                started.intent_id,
                UploadConfirmation::Convex {
                    storage_id: "s1".into(),
                },
                10,
                "image/png",
            )
            .await
            .unwrap();
        (repo, finished.asset_id, finished.version_id)
    }

    #[tokio::test]
    async fn restore_archives_current_and_publishes_copy() {
        let (repo, asset_id, v1) = seed_one_version().await;
        let manager = VersionManager::new(&repo);

        let restored = manager.restore_version(Actor::Authed, v1).await.unwrap();
        assert_eq!(restored.version, 2);

        let asset = repo.get_asset_by_id(asset_id).await.unwrap().unwrap();
        assert_eq!(asset.published_version_id, Some(restored.version_id));
        assert_eq!(asset.version_counter, 2);

        let original = manager.get_version(v1).await.unwrap();
        assert_eq!(original.state, VersionState::Archived);

        let new_version = manager.get_version(restored.version_id).await.unwrap();
        assert_eq!(new_version.locator, original.locator);
    }

    #[tokio::test]
    async fn restore_is_not_idempotent() {
        let (repo, _asset_id, v1) = seed_one_version().await;
        let manager = VersionManager::new(&repo);

        let first = manager.restore_version(Actor::Authed, v1).await.unwrap();
        let second = manager.restore_version(Actor::Authed, v1).await.unwrap();
        assert_ne!(first.version_id, second.version_id);
        assert_eq!(second.version, 3);
    }

    #[tokio::test]
    async fn rename_asset_rejects_conflict() {
        let (repo, _asset_id, _v1) = seed_one_version().await;
        let manager = VersionManager::new(&repo);

        let err = manager
            .rename_asset(Actor::Admin, "images", "a.png", "a.png")
            .await
            .unwrap_err();
        assert!(matches!(err, AssetStoreError::AssetExists { .. }));
    }

    #[tokio::test]
    async fn rename_asset_updates_basename() {
        let (repo, asset_id, _v1) = seed_one_version().await;
        let manager = VersionManager::new(&repo);

        manager
            .rename_asset(Actor::Admin, "images", "a.png", "b.png")
            .await
            .unwrap();

        let asset = repo.get_asset_by_id(asset_id).await.unwrap().unwrap();
        assert_eq!(asset.basename, "b.png");
    }
}
