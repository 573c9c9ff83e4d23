//! End-to-end scenario tests exercising the public `AssetStore` API the
//! way the HTTP layer does, one test per literal scenario.

use assetvault::api::{AssetStore, ServeOutcome};
use assetvault::auth::Actor;
use assetvault::config::{BackendConfig, BackendSelection};
use assetvault::error::AssetStoreError;
use assetvault::model::VersionState;
use assetvault::repo::AssetRepository;
use assetvault::storage::ConvexBlobStore;
use assetvault::upload::UploadConfirmation;
use bytes::Bytes;

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

async fn upload_one(
    store: &AssetStore,
    dir: &tempfile::TempDir,
    folder_path: &str,
    basename: &str,
    bytes: &'static [u8],
) -> assetvault::upload::FinishUploadResult {
    let started = store
        .start_upload(Actor::Authed, folder_path, basename, Some(basename), None)
        .await
        .unwrap();

    let backend = ConvexBlobStore::new(dir.path(), "http://localhost:8080");
    let storage_id = backend.store(Bytes::from_static(bytes)).await.unwrap();

    store
        .finish_upload(
            Actor::Authed,
            started.intent_id,
            UploadConfirmation::Convex { storage_id },
            bytes.len() as u64,
            "image/png",
        )
        .await
        .unwrap()
}

/// S1. Create folder tree + upload + publish.
#[tokio::test]
async fn s1_create_folder_tree_upload_publish() {
    let (store, dir) = store().await;
    store
        .create_folder_by_path(Actor::Admin, "images/hero")
        .await
        .unwrap();

    assert!(store.get_folder(Actor::Admin, "images").await.is_ok());
    assert!(store.get_folder(Actor::Admin, "images/hero").await.is_ok());

    let finished = upload_one(&store, &dir, "images/hero", "a.png", b"\x89PNG fake bytes").await;
    assert_eq!(finished.version, 1);

    let (version, _) = store
        .get_published_file(Actor::Anonymous, "images/hero", "a.png")
        .await
        .unwrap();
    assert_eq!(version.version, 1);

    let versions = store
        .get_asset_versions(Actor::Anonymous, "images/hero", "a.png")
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);

    let page = store
        .watch_folder_changes(
            Actor::Admin,
            "images/hero",
            assetvault::model::Cursor::initial(),
        )
        .await
        .unwrap();
    let kinds: Vec<_> = page.entries.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&assetvault::model::ChangelogKind::AssetCreated));
    assert!(kinds.contains(&assetvault::model::ChangelogKind::VersionCreated));
    assert!(kinds.contains(&assetvault::model::ChangelogKind::VersionPublished));
}

/// S2. Second upload archives the prior published version.
#[tokio::test]
async fn s2_second_upload_archives_prior() {
    let (store, dir) = store().await;
    store
        .create_folder_by_path(Actor::Admin, "images/hero")
        .await
        .unwrap();
    let first = upload_one(&store, &dir, "images/hero", "a.png", b"one").await;
    let second = upload_one(&store, &dir, "images/hero", "a.png", b"two-bytes").await;

    assert_eq!(second.version, 2);

    let versions = store
        .get_asset_versions(Actor::Anonymous, "images/hero", "a.png")
        .await
        .unwrap();
    let v1 = versions.iter().find(|v| v.id == first.version_id).unwrap();
    let v2 = versions.iter().find(|v| v.id == second.version_id).unwrap();
    assert_eq!(v1.state, VersionState::Archived);
    assert_eq!(v2.state, VersionState::Published);
}

/// S3. Restoring an archived version publishes a fresh copy of its bytes.
#[tokio::test]
async fn s3_restore_publishes_a_copy() {
    let (store, dir) = store().await;
    store
        .create_folder_by_path(Actor::Admin, "images/hero")
        .await
        .unwrap();
    let first = upload_one(&store, &dir, "images/hero", "a.png", b"one").await;
    let second = upload_one(&store, &dir, "images/hero", "a.png", b"two-bytes").await;

    let restored = store
        .restore_version(Actor::Authed, first.version_id)
        .await
        .unwrap();
    assert_eq!(restored.version, 3);

    let versions = store
        .get_asset_versions(Actor::Anonymous, "images/hero", "a.png")
        .await
        .unwrap();
    let v1 = versions.iter().find(|v| v.id == first.version_id).unwrap();
    let v2 = versions.iter().find(|v| v.id == second.version_id).unwrap();
    let v3 = versions.iter().find(|v| v.id == restored.version_id).unwrap();
    assert_eq!(v1.state, VersionState::Archived);
    assert_eq!(v2.state, VersionState::Archived);
    assert_eq!(v3.state, VersionState::Published);
    assert_eq!(v3.locator, v1.locator);

    let (_, outcome) = store
        .get_published_file(Actor::Anonymous, "images/hero", "a.png")
        .await
        .unwrap();
    match outcome {
        ServeOutcome::Inline { bytes, .. } => assert_eq!(&bytes[..], b"one"),
        ServeOutcome::Redirect(_) => panic!("convex backend should stream, not redirect"),
    }
}

/// S5. A duplicate `finishUpload` on an already-consumed intent fails
/// `IntentConsumed`, and no second version is created.
#[tokio::test]
async fn s5_duplicate_finish_upload_fails_intent_consumed() {
    let (store, dir) = store().await;
    store
        .create_folder_by_path(Actor::Admin, "images/hero")
        .await
        .unwrap();

    let started = store
        .start_upload(Actor::Authed, "images/hero", "a.png", Some("a.png"), None)
        .await
        .unwrap();
    let backend = ConvexBlobStore::new(dir.path(), "http://localhost:8080");
    let storage_id = backend
        .store(Bytes::from_static(b"one"))
        .await
        .unwrap();

    store
        .finish_upload(
            Actor::Authed,
            started.intent_id,
            UploadConfirmation::Convex {
                storage_id: storage_id.clone(),
            },
            3,
            "image/png",
        )
        .await
        .unwrap();

    let retry = store
        .finish_upload(
            Actor::Authed,
            started.intent_id,
            UploadConfirmation::Convex { storage_id },
            3,
            "image/png",
        )
        .await;
    assert!(matches!(retry, Err(AssetStoreError::IntentConsumed(_))));

    let versions = store
        .get_asset_versions(Actor::Anonymous, "images/hero", "a.png")
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);
}

/// S6. An unknown version id resolves to `VersionNotFound`; a known one
/// serves bytes with the expected content type.
#[tokio::test]
async fn s6_unknown_version_not_found_known_version_serves() {
    let (store, dir) = store().await;
    store
        .create_folder_by_path(Actor::Admin, "images/hero")
        .await
        .unwrap();
    let finished = upload_one(&store, &dir, "images/hero", "a.png", b"\x89PNG fake bytes").await;

    let missing = store
        .get_version_file(Actor::Anonymous, assetvault::ids::VersionId::new())
        .await;
    assert!(matches!(missing, Err(AssetStoreError::VersionNotFound(_))));

    let (version, outcome) = store
        .get_version_file(Actor::Anonymous, finished.version_id)
        .await
        .unwrap();
    assert_eq!(version.version, 1);
    match outcome {
        ServeOutcome::Inline { content_type, bytes } => {
            assert_eq!(content_type, "image/png");
            assert_eq!(&bytes[..], b"\x89PNG fake bytes");
        }
        ServeOutcome::Redirect(_) => panic!("convex backend should stream, not redirect"),
    }
}
