//! Upload coordinator: the two-phase `startUpload` / `finishUpload`
//! protocol (spec §4.2).

use chrono::{Duration as ChronoDuration, Utc};

use crate::auth::{Actor, Role};
use crate::changelog;
use crate::error::AssetStoreError;
use crate::ids::{AssetId, IntentId};
use crate::model::{Asset, AssetVersion, BackendLocator, ChangelogKind, UploadIntent, VersionState};
use crate::paths;
use crate::repo::AssetRepository;
use crate::storage::{BackendKind, IssuedUpload, StorageBackend, UploadMethod};

/// Bounded retry schedule for transient failures (spec §7): up to 3
/// retries after the initial attempt, exponential backoff 50/200/800ms
/// between them. Exhausting the schedule surfaces `AssetStoreError::Transient`.
pub const RETRY_BACKOFF_MS: [u64; 3] = [50, 200, 800];

/// Issues an upload URL, retrying a failing backend call per
/// `RETRY_BACKOFF_MS` before giving up with `Transient` (spec §7:
/// "retryable backend timeout... retried internally up to the bound").
async fn issue_upload_with_retry(
    backend: &dyn StorageBackend,
    key_hint: Option<&str>,
    content_type: Option<&str>,
) -> Result<IssuedUpload, AssetStoreError> {
    let mut attempt = 0;
    loop {
        match backend.issue_upload(key_hint, content_type).await {
            Ok(issued) => return Ok(issued),
            Err(_) if attempt < RETRY_BACKOFF_MS.len() => {
                tokio::time::sleep(std::time::Duration::from_millis(RETRY_BACKOFF_MS[attempt]))
                    .await;
                attempt += 1;
            }
            Err(e) => return Err(AssetStoreError::Transient(e.to_string())),
        }
    }
}

/// TTL for an upload intent before it is eligible for sweeping (spec §3,
/// §4.2: "recommend 1 hour").
pub const INTENT_TTL_MINUTES: i64 = 60;

#[derive(Debug)]
pub struct StartUploadResult {
    pub intent_id: IntentId,
    pub backend: BackendKind,
    pub upload_url: String,
    pub method: UploadMethod,
    pub r2_key: Option<String>,
}

#[derive(Debug)]
pub struct FinishUploadResult {
    pub asset_id: AssetId,
    pub version_id: crate::ids::VersionId,
    pub version: u32,
}

/// What the client hands back to `finishUpload` to let the backend
/// confirm the blob landed. The platform backend's upload response
/// carries a freshly minted `storageId`; the S3-compatible backend has
/// no equivalent because the key was pre-agreed at `startUpload`.
pub enum UploadConfirmation {
    Convex { storage_id: String },
    R2,
}

pub struct UploadCoordinator<'a> {
    repo: &'a AssetRepository,
    backend: &'a dyn StorageBackend,
}

impl<'a> UploadCoordinator<'a> {
    pub fn new(repo: &'a AssetRepository, backend: &'a dyn StorageBackend) -> Self {
        Self { repo, backend }
    }

    pub async fn start_upload(
        &self,
        actor: Actor,
        folder_path: &str,
        basename: &str,
        filename: Option<&str>,
        label: Option<&str>,
    ) -> Result<StartUploadResult, AssetStoreError> {
        actor.require(Role::Authed)?;

        let folder_path = paths::normalize_folder_path(folder_path);
        paths::validate_basename(basename)?;

        if self
            .repo
            .get_folder_by_path(&folder_path)
            .await?
            .is_none()
            && !folder_path.is_empty()
        {
            return Err(AssetStoreError::FolderNotFound(folder_path));
        }

        let existing_asset = self.repo.get_asset(&folder_path, basename).await?;

        let mut tx = self.repo.begin().await?;

        let asset = match existing_asset {
            Some(asset) => asset,
            None => {
                let asset = Asset {
                    id: AssetId::new(),
                    folder_path: folder_path.clone(),
                    basename: basename.to_string(),
                    version_counter: 0,
                    published_version_id: None,
                    updated_at: Utc::now(),
                };
                self.repo.insert_asset(&mut tx, &asset).await?;
                changelog::append(
                    self.repo,
                    &mut tx,
                    ChangelogKind::AssetCreated,
                    &folder_path,
                    Some(basename),
                    Some(asset.id),
                    None,
                )
                .await?;
                asset
            }
        };

        let intent_id = IntentId::new();
        let r2_key = self
            .backend
            .pending_key(&asset.id.to_string(), &intent_id.to_string(), basename);

        let now = Utc::now();
        let intent = UploadIntent {
            intent_id,
            asset_id: asset.id,
            folder_path: folder_path.clone(),
            basename: basename.to_string(),
            backend: self.backend.kind().into(),
            r2_key: r2_key.clone(),
            storage_id: None,
            label: label.map(str::to_string),
            original_filename: filename.map(str::to_string),
            created_at: now,
            expires_at: now + ChronoDuration::minutes(INTENT_TTL_MINUTES),
            consumed_at: None,
        };
        self.repo.insert_intent(&mut tx, &intent).await?;

        let issued = issue_upload_with_retry(self.backend, r2_key.as_deref(), None).await?;

        tx.commit().await.map_err(anyhow::Error::from)?;

        Ok(StartUploadResult {
            intent_id,
            backend: self.backend.kind(),
            upload_url: issued.upload_url,
            method: issued.method,
            r2_key: issued.r2_key,
        })
    }

    pub async fn finish_upload(
        &self,
        actor: Actor,
        intent_id: IntentId,
        confirmation: UploadConfirmation,
        size: u64,
        content_type: &str,
    ) -> Result<FinishUploadResult, AssetStoreError> {
        actor.require(Role::Authed)?;

        let intent = self
            .repo
            .get_intent(intent_id)
            .await?
            .ok_or(AssetStoreError::IntentNotFound(intent_id))?;

        if intent.expires_at < Utc::now() {
            return Err(AssetStoreError::IntentNotFound(intent_id));
        }
        if intent.consumed_at.is_some() {
            return Err(AssetStoreError::IntentConsumed(intent_id));
        }

        let locator = match confirmation {
            UploadConfirmation::Convex { storage_id } => {
                if intent.backend != crate::model::BackendKindTag::Convex {
                    return Err(AssetStoreError::InvalidUploadResponse(
                        "intent was not issued against the platform backend".into(),
                    ));
                }
                BackendLocator::convex(storage_id)
            }
            UploadConfirmation::R2 => {
                if intent.backend != crate::model::BackendKindTag::R2 {
                    return Err(AssetStoreError::InvalidUploadResponse(
                        "intent was not issued against the S3-compatible backend".into(),
                    ));
                }
                let key = intent.r2_key.clone().ok_or_else(|| {
                    AssetStoreError::InvalidUploadResponse("intent has no r2Key".into())
                })?;
                let public_url = self
                    .backend
                    .resolve_public_url(&BackendLocator::r2(key.clone(), ""))
                    .unwrap_or_default();
                BackendLocator::r2(key, public_url)
            }
        };

        let asset = self
            .repo
            .get_asset_by_id(intent.asset_id)
            .await?
            .ok_or(AssetStoreError::asset_not_found(intent.asset_id))?;

        let mut tx = self.repo.begin().await?;

        // Claim the intent under the transaction: a concurrent finishUpload
        // racing on the same intent loses here, even though both passed
        // the unguarded check above.
        if !self
            .repo
            .claim_intent(&mut tx, intent_id, Utc::now())
            .await?
        {
            return Err(AssetStoreError::IntentConsumed(intent_id));
        }

        let version_number = asset.version_counter + 1;
        let version = AssetVersion {
            id: crate::ids::VersionId::new(),
            asset_id: asset.id,
            version: version_number,
            state: VersionState::Published,
            created_at: Utc::now(),
            label: intent.label.clone(),
            size,
            content_type: content_type.to_string(),
            original_filename: intent.original_filename.clone(),
            backend: intent.backend,
            locator,
        };
        self.repo.insert_version(&mut tx, &version).await?;
        changelog::append(
            self.repo,
            &mut tx,
            ChangelogKind::VersionCreated,
            &asset.folder_path,
            Some(&asset.basename),
            Some(asset.id),
            Some(version.id),
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
            .update_asset_after_finish(&mut tx, asset.id, version_number, version.id, Utc::now())
            .await?;
        changelog::append(
            self.repo,
            &mut tx,
            ChangelogKind::VersionPublished,
            &asset.folder_path,
            Some(&asset.basename),
            Some(asset.id),
            Some(version.id),
        )
        .await?;

        tx.commit().await.map_err(anyhow::Error::from)?;

        Ok(FinishUploadResult {
            asset_id: asset.id,
            version_id: version.id,
            version: version_number,
        })
    }
}
