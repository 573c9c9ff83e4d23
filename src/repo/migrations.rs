//! Schema creation for the asset store's SQLite catalog.
//!
//! The teacher's `catalog::migrations` module hashes each migration's SQL
//! at compile time via `build.rs` and refuses to start if an applied
//! migration's hash no longer matches the compiled one. That machinery
//! earns its keep across many backend-specific migration sets; this crate
//! has exactly one schema revision, so we keep the teacher's
//! "migrations table + ordered, idempotent steps" shape without the
//! build-time hashing.

use anyhow::Result;
use sqlx::SqlitePool;

struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
            CREATE TABLE IF NOT EXISTS folders (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                parent_path TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS folders_by_parent_path ON folders(parent_path);

            CREATE TABLE IF NOT EXISTS assets (
                id TEXT PRIMARY KEY,
                folder_path TEXT NOT NULL,
                basename TEXT NOT NULL,
                version_counter INTEGER NOT NULL DEFAULT 0,
                published_version_id TEXT,
                updated_at TEXT NOT NULL,
                UNIQUE (folder_path, basename)
            );

            CREATE TABLE IF NOT EXISTS asset_versions (
                id TEXT PRIMARY KEY,
                asset_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                label TEXT,
                size INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                original_filename TEXT,
                backend TEXT NOT NULL,
                storage_id TEXT,
                r2_key TEXT,
                r2_public_url TEXT,
                UNIQUE (asset_id, version)
            );
            CREATE INDEX IF NOT EXISTS asset_versions_by_asset_and_state
                ON asset_versions(asset_id, state);

            CREATE TABLE IF NOT EXISTS upload_intents (
                intent_id TEXT PRIMARY KEY,
                asset_id TEXT NOT NULL,
                folder_path TEXT NOT NULL,
                basename TEXT NOT NULL,
                backend TEXT NOT NULL,
                r2_key TEXT,
                storage_id TEXT,
                label TEXT,
                original_filename TEXT,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                consumed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS upload_intents_by_expires_at
                ON upload_intents(expires_at);

            CREATE TABLE IF NOT EXISTS changelog (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                kind TEXT NOT NULL,
                folder_path TEXT NOT NULL,
                basename TEXT,
                asset_id TEXT,
                version_id TEXT
            );
            CREATE INDEX IF NOT EXISTS changelog_by_created_at ON changelog(created_at, id);
            CREATE INDEX IF NOT EXISTS changelog_by_folder_path
                ON changelog(folder_path, created_at, id);
        "#,
    },
];

async fn ensure_migrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let version: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    ensure_migrations_table(pool).await?;
    let applied = current_version(pool).await?;

    for migration in MIGRATIONS {
        if migration.version <= applied {
            continue;
        }
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}
