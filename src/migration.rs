//! Migration engine: bulk move of backend-A blobs to backend-B without
//! breaking live reads (spec §4.7).

use crate::error::AssetStoreError;
use crate::ids::VersionId;
use crate::model::{AssetVersion, BackendKindTag};
use crate::repo::AssetRepository;
use crate::storage::{S3CompatibleStore, StorageBackend};

pub struct MigrationEngine<'a> {
    repo: &'a AssetRepository,
    source: &'a dyn StorageBackend,
    target: &'a S3CompatibleStore,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(
        repo: &'a AssetRepository,
        source: &'a dyn StorageBackend,
        target: &'a S3CompatibleStore,
    ) -> Self {
        Self {
            repo,
            source,
            target,
        }
    }

    /// Copies a `backend == convex` version's bytes to the S3-compatible
    /// backend and dual-points the row: `r2Key`/`r2PublicUrl` are added
    /// while `storageId` is left in place. Live reads prefer the
    /// S3-compatible locator once both are set (`BackendLocator::preferred_backend`).
    pub async fn migrate_version_to_r2(
        &self,
        version_id: VersionId,
    ) -> Result<AssetVersion, AssetStoreError> {
        let version = self
            .repo
            .get_version(version_id)
            .await?
            .ok_or(AssetStoreError::VersionNotFound(version_id))?;

        if version.backend != BackendKindTag::Convex {
            return Ok(version);
        }

        let read = self
            .source
            .read_bytes(&version.locator)
            .await
            .map_err(|e| AssetStoreError::BackendFailure {
                backend: self.source.kind(),
                message: e.to_string(),
            })?;

        let filename = version
            .original_filename
            .clone()
            .unwrap_or_else(|| version.id.to_string());
        let key = self
            .target
            .final_key(&version.asset_id.to_string(), version.version, &filename);

        let locator = self
            .target
            .write_bytes(&key, &version.content_type, read.bytes)
            .await
            .map_err(|e| AssetStoreError::BackendFailure {
                backend: self.target.kind(),
                message: e.to_string(),
            })?;

        let dual_pointed = crate::model::BackendLocator {
            storage_id: version.locator.storage_id.clone(),
            r2_key: locator.r2_key,
            r2_public_url: locator.r2_public_url,
        };

        let mut tx = self.repo.begin().await?;
        self.repo
            .set_version_locator(&mut tx, version_id, &dual_pointed)
            .await?;
        tx.commit().await.map_err(anyhow::Error::from)?;

        self.repo
            .get_version(version_id)
            .await?
            .ok_or(AssetStoreError::VersionNotFound(version_id))
    }

    /// Migrates every `convex`-backed version. Best-effort: one failing
    /// version does not abort the others, and failures are returned
    /// alongside successes for the caller to log/retry.
    pub async fn migrate_all_to_r2(
        &self,
    ) -> Result<Vec<(VersionId, Result<(), AssetStoreError>)>, AssetStoreError> {
        let versions = self
            .repo
            .list_versions_by_backend(BackendKindTag::Convex)
            .await?;
        let mut results = Vec::with_capacity(versions.len());
        for version in versions {
            let outcome = self.migrate_version_to_r2(version.id).await.map(|_| ());
            results.push((version.id, outcome));
        }
        Ok(results)
    }

    /// Idempotent backfill of `r2PublicUrl` for a version that already has
    /// an `r2Key` but was migrated before a public base URL was
    /// configured. Skips versions with no `r2Key` or an already-set
    /// `r2PublicUrl` (spec §4.7).
    pub async fn set_version_r2_public_url(
        &self,
        version_id: VersionId,
    ) -> Result<(), AssetStoreError> {
        let version = self
            .repo
            .get_version(version_id)
            .await?
            .ok_or(AssetStoreError::VersionNotFound(version_id))?;

        let Some(key) = version.locator.r2_key.clone() else {
            return Ok(());
        };
        if version.locator.r2_public_url.is_some() {
            return Ok(());
        }

        let public_url = self
            .target
            .resolve_public_url(&crate::model::BackendLocator::r2(key, ""))
            .ok_or_else(|| AssetStoreError::BackendFailure {
                backend: self.target.kind(),
                message: "S3-compatible backend produced no public URL".into(),
            })?;

        let mut tx = self.repo.begin().await?;
        self.repo
            .set_version_locator(
                &mut tx,
                version_id,
                &crate::model::BackendLocator {
                    storage_id: version.locator.storage_id,
                    r2_key: version.locator.r2_key,
                    r2_public_url: Some(public_url),
                },
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
    use crate::ids::{AssetId, VersionId};
    use crate::model::{Asset, BackendLocator};
    use crate::storage::ConvexBlobStore;
    use chrono::Utc;

    async fn s3_store() -> S3CompatibleStore {
        // Explicit static credentials and endpoint mean this never
        // consults the IMDS/profile credential chain, so building the
        // client performs no network I/O.
        S3CompatibleStore::from_env(
            "https://r2.example.invalid",
            "test-access-key",
            "test-secret-key",
            "test-bucket",
            "https://cdn.example.com",
            "assets",
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn migrating_an_already_r2_version_is_a_no_op() {
        let repo = AssetRepository::in_memory().await.unwrap();
        FolderManager::new(&repo)
            .create_folder_by_path("images")
            .await
            .unwrap();

        let asset = Asset {
            id: AssetId::new(),
            folder_path: "images".into(),
            basename: "a.png".into(),
            version_counter: 1,
            published_version_id: None,
            updated_at: Utc::now(),
        };
        let version = AssetVersion {
            id: VersionId::new(),
            asset_id: asset.id,
            version: 1,
            state: crate::model::VersionState::Published,
            created_at: Utc::now(),
            label: None,
            size: 10,
            content_type: "image/png".into(),
            original_filename: Some("a.png".into()),
            backend: BackendKindTag::R2,
            locator: BackendLocator::r2("assets/a.png", "https://cdn.example.com/assets/a.png"),
        };

        let mut tx = repo.begin().await.unwrap();
        repo.insert_asset(&mut tx, &asset).await.unwrap();
        repo.insert_version(&mut tx, &version).await.unwrap();
        tx.commit().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let convex = ConvexBlobStore::new(dir.path(), "http://localhost:8080");
        let target = s3_store().await;
        let engine = MigrationEngine::new(&repo, &convex, &target);

        let result = engine.migrate_version_to_r2(version.id).await.unwrap();
        assert_eq!(result.locator, version.locator);
    }

    #[tokio::test]
    async fn migrate_all_skips_versions_with_no_convex_backend() {
        let repo = AssetRepository::in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let convex = ConvexBlobStore::new(dir.path(), "http://localhost:8080");
        let target = s3_store().await;
        let engine = MigrationEngine::new(&repo, &convex, &target);

        let results = engine.migrate_all_to_r2().await.unwrap();
        assert!(results.is_empty());
    }
}
