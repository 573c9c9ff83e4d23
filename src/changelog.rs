//! Changelog engine (spec §4.5).
//!
//! Entries are appended inside the same transaction as the data mutation
//! that produced them - callers pass their open transaction to [`append`]
//! rather than this module owning its own.

use chrono::Utc;
use sqlx::{Sqlite, Transaction};

use crate::ids::{AssetId, ChangelogId, VersionId};
use crate::model::{ChangelogEntry, ChangelogKind, Cursor};
use crate::repo::AssetRepository;

const DEFAULT_LIMIT: u32 = 100;

/// Appends one changelog entry inside `tx`. `created_at` is milliseconds
/// since epoch, assigned here rather than trusted from the caller so the
/// ordering guarantee in spec §4.5 holds even if a caller forgets.
pub async fn append(
    repo: &AssetRepository,
    tx: &mut Transaction<'_, Sqlite>,
    kind: ChangelogKind,
    folder_path: &str,
    basename: Option<&str>,
    asset_id: Option<AssetId>,
    version_id: Option<VersionId>,
) -> anyhow::Result<ChangelogEntry> {
    let entry = ChangelogEntry {
        id: ChangelogId::new(),
        created_at: Utc::now().timestamp_millis(),
        kind,
        folder_path: folder_path.to_string(),
        basename: basename.map(str::to_string),
        asset_id,
        version_id,
    };
    repo.append_changelog(tx, &entry).await?;
    Ok(entry)
}

pub struct ChangelogPage {
    pub entries: Vec<ChangelogEntry>,
    pub next_cursor: Cursor,
}

pub struct ChangelogEngine<'a> {
    repo: &'a AssetRepository,
}

impl<'a> ChangelogEngine<'a> {
    pub fn new(repo: &'a AssetRepository) -> Self {
        Self { repo }
    }

    /// Global feed, ordered `(createdAt, id)` ascending. Returns the input
    /// cursor unchanged when no new entries exist, per spec §4.5.
    pub async fn list_since(
        &self,
        cursor: Cursor,
        limit: Option<u32>,
    ) -> anyhow::Result<ChangelogPage> {
        let entries = self
            .repo
            .list_since(cursor, limit.unwrap_or(DEFAULT_LIMIT))
            .await?;
        let next_cursor = entries.last().map(Cursor::from).unwrap_or(cursor);
        Ok(ChangelogPage {
            entries,
            next_cursor,
        })
    }

    /// Per-folder feed over the `by_folder_path` index.
    pub async fn list_for_folder(
        &self,
        folder_path: &str,
        cursor: Cursor,
        limit: Option<u32>,
    ) -> anyhow::Result<ChangelogPage> {
        let entries = self
            .repo
            .list_for_folder(folder_path, cursor, limit.unwrap_or(DEFAULT_LIMIT))
            .await?;
        let next_cursor = entries.last().map(Cursor::from).unwrap_or(cursor);
        Ok(ChangelogPage {
            entries,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::FolderId;
    use crate::model::Folder;

    #[tokio::test]
    async fn list_since_returns_input_cursor_when_empty() {
        let repo = AssetRepository::in_memory().await.unwrap();
        let engine = ChangelogEngine::new(&repo);
        let page = engine.list_since(Cursor::initial(), None).await.unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(page.next_cursor, Cursor::initial());
    }

    #[tokio::test]
    async fn list_since_advances_cursor_and_never_repeats() {
        let repo = AssetRepository::in_memory().await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        repo.insert_folder(
            &mut tx,
            &Folder {
                id: FolderId::new(),
                path: "images".into(),
                name: "images".into(),
                parent_path: "".into(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        append(
            &repo,
            &mut tx,
            ChangelogKind::FolderCreated,
            "images",
            None,
            None,
            None,
        )
        .await
        .unwrap();
        append(
            &repo,
            &mut tx,
            ChangelogKind::FolderCreated,
            "images/hero",
            None,
            None,
            None,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let engine = ChangelogEngine::new(&repo);
        let first_page = engine
            .list_since(Cursor::initial(), Some(1))
            .await
            .unwrap();
        assert_eq!(first_page.entries.len(), 1);

        let second_page = engine
            .list_since(first_page.next_cursor, Some(10))
            .await
            .unwrap();
        assert_eq!(second_page.entries.len(), 1);
        assert_ne!(
            first_page.entries[0].id, second_page.entries[0].id,
            "no entry should repeat across pages"
        );
    }

    #[tokio::test]
    async fn list_for_folder_filters_by_path() {
        let repo = AssetRepository::in_memory().await.unwrap();
        let mut tx = repo.begin().await.unwrap();
        append(
            &repo,
            &mut tx,
            ChangelogKind::FolderCreated,
            "images",
            None,
            None,
            None,
        )
        .await
        .unwrap();
        append(
            &repo,
            &mut tx,
            ChangelogKind::FolderCreated,
            "docs",
            None,
            None,
            None,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let engine = ChangelogEngine::new(&repo);
        let page = engine
            .list_for_folder("docs", Cursor::initial(), None)
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].folder_path, "docs");
    }
}
