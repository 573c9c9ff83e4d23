//! Folder manager (spec §4.4).
//!
//! Folder deletion and rename are explicitly out of scope (spec §4.4,
//! §9 Open Question 1) - this module only ever appends rows.

use chrono::Utc;

use crate::changelog;
use crate::error::AssetStoreError;
use crate::ids::FolderId;
use crate::model::{ChangelogKind, Folder};
use crate::paths;
use crate::repo::AssetRepository;

pub struct FolderManager<'a> {
    repo: &'a AssetRepository,
}

impl<'a> FolderManager<'a> {
    pub fn new(repo: &'a AssetRepository) -> Self {
        Self { repo }
    }

    /// Creates a single folder under `parent_path` named `name`. Fails
    /// `ParentMissing` if `parent_path` is non-empty and absent, and
    /// `FolderExists` on conflict.
    pub async fn create_folder_by_name(
        &self,
        parent_path: &str,
        name: &str,
    ) -> Result<Folder, AssetStoreError> {
        let parent_path = paths::normalize_folder_path(parent_path);
        paths::validate_segment(name)?;

        if !parent_path.is_empty() && self.repo.get_folder_by_path(&parent_path).await?.is_none()
        {
            return Err(AssetStoreError::ParentMissing(parent_path));
        }

        let path = paths::join(&parent_path, name);
        if self.repo.get_folder_by_path(&path).await?.is_some() {
            return Err(AssetStoreError::FolderExists(path));
        }

        let folder = Folder {
            id: FolderId::new(),
            path: path.clone(),
            name: name.to_string(),
            parent_path,
            created_at: Utc::now(),
        };

        let mut tx = self.repo.begin().await?;
        self.repo.insert_folder(&mut tx, &folder).await?;
        changelog::append(
            self.repo,
            &mut tx,
            ChangelogKind::FolderCreated,
            &folder.path,
            None,
            None,
            None,
        )
        .await?;
        tx.commit().await.map_err(anyhow::Error::from)?;

        Ok(folder)
    }

    /// Creates every missing ancestor along `path` and returns the leaf
    /// folder. Idempotent: a no-op for any folder that already exists.
    pub async fn create_folder_by_path(&self, path: &str) -> Result<Folder, AssetStoreError> {
        let path = paths::normalize_folder_path(path);
        paths::validate_folder_path(&path)?;

        if path.is_empty() {
            return Err(AssetStoreError::InvalidPath(
                "cannot create the root folder".into(),
            ));
        }

        let mut current = String::new();
        let mut leaf = None;
        for segment in paths::split_segments(&path) {
            let candidate = paths::join(&current, segment);
            leaf = Some(match self.repo.get_folder_by_path(&candidate).await? {
                Some(existing) => existing,
                None => self.create_folder_by_name(&current, segment).await?,
            });
            current = candidate;
        }

        // `path` is non-empty so the loop ran at least once.
        Ok(leaf.expect("non-empty path always produces a leaf"))
    }

    pub async fn list_folders(&self, parent_path: &str) -> Result<Vec<Folder>, AssetStoreError> {
        let parent_path = paths::normalize_folder_path(parent_path);
        Ok(self.repo.list_children(&parent_path).await?)
    }

    pub async fn list_all_folders(&self) -> Result<Vec<Folder>, AssetStoreError> {
        Ok(self.repo.list_all_folders().await?)
    }

    pub async fn get_folder(&self, path: &str) -> Result<Folder, AssetStoreError> {
        let path = paths::normalize_folder_path(path);
        self.repo
            .get_folder_by_path(&path)
            .await?
            .ok_or(AssetStoreError::FolderNotFound(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_by_path_creates_every_missing_ancestor() {
        let repo = AssetRepository::in_memory().await.unwrap();
        let manager = FolderManager::new(&repo);

        let leaf = manager.create_folder_by_path("images/hero").await.unwrap();
        assert_eq!(leaf.path, "images/hero");

        let images = manager.get_folder("images").await.unwrap();
        assert_eq!(images.parent_path, "");
        let hero = manager.get_folder("images/hero").await.unwrap();
        assert_eq!(hero.parent_path, "images");
    }

    #[tokio::test]
    async fn create_by_path_is_idempotent() {
        let repo = AssetRepository::in_memory().await.unwrap();
        let manager = FolderManager::new(&repo);

        manager.create_folder_by_path("images/hero").await.unwrap();
        let second = manager.create_folder_by_path("images/hero").await.unwrap();
        assert_eq!(second.path, "images/hero");

        let all = manager.list_all_folders().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn create_by_name_fails_when_parent_missing() {
        let repo = AssetRepository::in_memory().await.unwrap();
        let manager = FolderManager::new(&repo);

        let err = manager
            .create_folder_by_name("nope", "child")
            .await
            .unwrap_err();
        assert!(matches!(err, AssetStoreError::ParentMissing(_)));
    }

    #[tokio::test]
    async fn create_by_name_fails_on_conflict() {
        let repo = AssetRepository::in_memory().await.unwrap();
        let manager = FolderManager::new(&repo);

        manager.create_folder_by_name("", "images").await.unwrap();
        let err = manager
            .create_folder_by_name("", "images")
            .await
            .unwrap_err();
        assert!(matches!(err, AssetStoreError::FolderExists(_)));
    }

    #[tokio::test]
    async fn list_folders_orders_by_name() {
        let repo = AssetRepository::in_memory().await.unwrap();
        let manager = FolderManager::new(&repo);
        for name in ["zeta", "alpha"] {
            manager.create_folder_by_name("", name).await.unwrap();
        }
        let children = manager.list_folders("").await.unwrap();
        let names: Vec<_> = children.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
