use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::{MediaRow, MediaUpsert};

/// the embedded relational store: WAL-mode, single-writer by discipline
/// (the db actor's mailbox serializes every write), schema migration on
/// open, and the query functions used by both the Indexer and the Query
/// Engine.
#[derive(Clone)]
pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    #[instrument(skip_all)]
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL;")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys = OFF;")
            .execute(&pool)
            .await?;

        let store = IndexStore { pool };
        store.migrate().await?;

        Ok(store)
    }

    #[instrument(skip_all)]
    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS media_items (
                dirId TEXT NOT NULL,
                relPath TEXT NOT NULL,
                ext TEXT NOT NULL,
                kind TEXT NOT NULL,
                timeText TEXT NOT NULL,
                iso TEXT,
                timestampMs INTEGER,
                author TEXT NOT NULL DEFAULT '',
                theme TEXT NOT NULL DEFAULT '',
                typeText TEXT NOT NULL DEFAULT '',
                seq INTEGER,
                mtimeMs REAL NOT NULL,
                size INTEGER NOT NULL,
                seenRun INTEGER NOT NULL,
                createdAtMs INTEGER,
                updatedAtMs INTEGER,
                PRIMARY KEY (dirId, relPath)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS media_item_types (
                dirId TEXT NOT NULL,
                relPath TEXT NOT NULL,
                type TEXT NOT NULL,
                PRIMARY KEY (dirId, relPath, type)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS media_item_tags (
                dirId TEXT NOT NULL,
                relPath TEXT NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY (dirId, relPath, tag)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dir_state (
                dirId TEXT PRIMARY KEY,
                dirPath TEXT NOT NULL,
                dirMtimeMs REAL,
                scannedAtMs INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT);")
            .execute(&self.pool)
            .await?;

        // migration policy: attempt to add createdAtMs/updatedAtMs if an
        // older database lacks them; idempotent, errors ignored
        let _ = sqlx::query("ALTER TABLE media_items ADD COLUMN createdAtMs INTEGER;")
            .execute(&self.pool)
            .await;
        let _ = sqlx::query("ALTER TABLE media_items ADD COLUMN updatedAtMs INTEGER;")
            .execute(&self.pool)
            .await;

        for stmt in [
            "CREATE INDEX IF NOT EXISTS idx_media_items_sort ON media_items(timestampMs DESC, timeText, author, theme);",
            "CREATE INDEX IF NOT EXISTS idx_media_items_author ON media_items(author);",
            "CREATE INDEX IF NOT EXISTS idx_media_items_theme ON media_items(theme);",
            "CREATE INDEX IF NOT EXISTS idx_media_items_timetext ON media_items(timeText);",
            "CREATE INDEX IF NOT EXISTS idx_media_item_types_type ON media_item_types(type);",
            "CREATE INDEX IF NOT EXISTS idx_media_item_tags_tag ON media_item_tags(tag);",
            "CREATE INDEX IF NOT EXISTS idx_media_items_created ON media_items(createdAtMs DESC);",
            "CREATE INDEX IF NOT EXISTS idx_media_items_updated ON media_items(updatedAtMs DESC);",
        ] {
            sqlx::query(stmt).execute(&self.pool).await?;
        }

        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query("UPDATE media_items SET createdAtMs = ?1 WHERE createdAtMs IS NULL;")
            .bind(now)
            .execute(&self.pool)
            .await?;
        sqlx::query("UPDATE media_items SET updatedAtMs = ?1 WHERE updatedAtMs IS NULL;")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// on-conflict-preserve-createdAtMs upsert, followed by a full
    /// replace-the-set rewrite of types/tags
    #[instrument(skip_all, fields(dir_id = %item.dir_id, rel_path = %item.rel_path))]
    pub async fn upsert_media_item(&self, item: &MediaUpsert, run_id: i64) -> Result<bool> {
        let existed: Option<(i64,)> =
            sqlx::query_as("SELECT createdAtMs FROM media_items WHERE dirId = ?1 AND relPath = ?2;")
                .bind(&item.dir_id)
                .bind(&item.rel_path)
                .fetch_optional(&self.pool)
                .await?;

        let is_new = existed.is_none();
        let created_at_ms = existed.map(|(c,)| c).unwrap_or(run_id);

        sqlx::query(
            r#"
            INSERT INTO media_items
                (dirId, relPath, ext, kind, timeText, iso, timestampMs, author, theme,
                 typeText, seq, mtimeMs, size, seenRun, createdAtMs, updatedAtMs)
            VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?15)
            ON CONFLICT(dirId, relPath) DO UPDATE SET
                ext = excluded.ext,
                kind = excluded.kind,
                timeText = excluded.timeText,
                iso = excluded.iso,
                timestampMs = excluded.timestampMs,
                author = excluded.author,
                theme = excluded.theme,
                typeText = excluded.typeText,
                seq = excluded.seq,
                mtimeMs = excluded.mtimeMs,
                size = excluded.size,
                seenRun = excluded.seenRun,
                createdAtMs = COALESCE(media_items.createdAtMs, excluded.createdAtMs),
                updatedAtMs = ?16;
            "#,
        )
        .bind(&item.dir_id)
        .bind(&item.rel_path)
        .bind(&item.ext)
        .bind(&item.kind)
        .bind(&item.time_text)
        .bind(&item.iso)
        .bind(item.timestamp_ms)
        .bind(&item.author)
        .bind(&item.theme)
        .bind(&item.type_text)
        .bind(item.seq)
        .bind(item.mtime_ms)
        .bind(item.size)
        .bind(item.seen_run)
        .bind(created_at_ms)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        self.rewrite_types_tags(&item.dir_id, &item.rel_path, &item.types, &item.tags)
            .await?;

        Ok(is_new)
    }

    /// forced backfill path: rebuild derived fields without touching the
    /// row's own columns
    pub async fn rebuild_types_tags(
        &self,
        dir_id: &str,
        rel_path: &str,
        types: &[String],
        tags: &[String],
    ) -> Result<()> {
        self.rewrite_types_tags(dir_id, rel_path, types, tags).await
    }

    async fn rewrite_types_tags(
        &self,
        dir_id: &str,
        rel_path: &str,
        types: &[String],
        tags: &[String],
    ) -> Result<()> {
        sqlx::query("DELETE FROM media_item_types WHERE dirId = ?1 AND relPath = ?2;")
            .bind(dir_id)
            .bind(rel_path)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM media_item_tags WHERE dirId = ?1 AND relPath = ?2;")
            .bind(dir_id)
            .bind(rel_path)
            .execute(&self.pool)
            .await?;

        for t in types {
            sqlx::query(
                "INSERT OR IGNORE INTO media_item_types (dirId, relPath, type) VALUES (?1,?2,?3);",
            )
            .bind(dir_id)
            .bind(rel_path)
            .bind(t)
            .execute(&self.pool)
            .await?;
        }

        for t in tags {
            sqlx::query(
                "INSERT OR IGNORE INTO media_item_tags (dirId, relPath, tag) VALUES (?1,?2,?3);",
            )
            .bind(dir_id)
            .bind(rel_path)
            .bind(t)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    pub async fn touch_seen_run(&self, dir_id: &str, rel_path: &str, run_id: i64) -> Result<()> {
        sqlx::query("UPDATE media_items SET seenRun = ?1 WHERE dirId = ?2 AND relPath = ?3;")
            .bind(run_id)
            .bind(dir_id)
            .bind(rel_path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_media_item(&self, dir_id: &str, rel_path: &str) -> Result<Option<MediaRow>> {
        let row = sqlx::query(
            "SELECT dirId, relPath, ext, kind, timeText, iso, timestampMs, author, theme, \
             typeText, seq, mtimeMs, size, seenRun, createdAtMs, updatedAtMs \
             FROM media_items WHERE dirId = ?1 AND relPath = ?2;",
        )
        .bind(dir_id)
        .bind(rel_path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_media(&r)))
    }

    /// delete every row for `dirId` whose `seenRun` didn't advance this scan
    #[instrument(skip(self))]
    pub async fn delete_vanished(&self, dir_id: &str, run_id: i64) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM media_items WHERE dirId = ?1 AND seenRun != ?2;")
                .bind(dir_id)
                .bind(run_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// global orphan cleanup for types/tags rows whose parent no longer
    /// exists (spec.md's open question on scope is resolved as global)
    pub async fn orphan_cleanup(&self) -> Result<()> {
        sqlx::query(
            "DELETE FROM media_item_types \
             WHERE NOT EXISTS (SELECT 1 FROM media_items m \
                WHERE m.dirId = media_item_types.dirId AND m.relPath = media_item_types.relPath);",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "DELETE FROM media_item_tags \
             WHERE NOT EXISTS (SELECT 1 FROM media_items m \
                WHERE m.dirId = media_item_tags.dirId AND m.relPath = media_item_tags.relPath);",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// drop every row belonging to a dirId no longer in the configuration
    #[instrument(skip(self))]
    pub async fn prune_dirs_not_in(&self, keep_ids: &HashSet<String>) -> Result<()> {
        // sqlite has no array binding; keep_ids is small (one row per
        // configured directory) so build the IN-list inline, safely, since
        // dirIds are our own sha1 hex hashes (no user-controlled characters)
        let kept: Vec<String> = keep_ids.iter().map(|id| format!("'{id}'")).collect();
        let in_list = if kept.is_empty() {
            "('')".to_owned()
        } else {
            format!("({})", kept.join(","))
        };

        for table in ["media_items", "media_item_types", "media_item_tags", "dir_state"] {
            let stmt = format!("DELETE FROM {table} WHERE dirId NOT IN {in_list};");
            sqlx::query(&stmt).execute(&self.pool).await?;
        }

        Ok(())
    }

    pub async fn get_dir_state(&self, dir_id: &str) -> Result<Option<(String, f64, i64)>> {
        let row: Option<(String, f64, i64)> = sqlx::query_as(
            "SELECT dirPath, dirMtimeMs, scannedAtMs FROM dir_state WHERE dirId = ?1;",
        )
        .bind(dir_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn upsert_dir_state(
        &self,
        dir_id: &str,
        dir_path: &str,
        dir_mtime_ms: f64,
        scanned_at_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dir_state (dirId, dirPath, dirMtimeMs, scannedAtMs)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(dirId) DO UPDATE SET
                dirPath = excluded.dirPath,
                dirMtimeMs = excluded.dirMtimeMs,
                scannedAtMs = excluded.scannedAtMs;
            "#,
        )
        .bind(dir_id)
        .bind(dir_path)
        .bind(dir_mtime_ms)
        .bind(scanned_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_media(r: &SqliteRow) -> MediaRow {
    MediaRow {
        dir_id: r.get("dirId"),
        rel_path: r.get("relPath"),
        ext: r.get("ext"),
        kind: r.get("kind"),
        time_text: r.get("timeText"),
        iso: r.try_get("iso").ok(),
        timestamp_ms: r.try_get("timestampMs").ok(),
        author: r.get("author"),
        theme: r.get("theme"),
        type_text: r.get("typeText"),
        seq: r.try_get("seq").ok(),
        mtime_ms: r.get("mtimeMs"),
        size: r.get("size"),
        seen_run: r.get("seenRun"),
        created_at_ms: r.get("createdAtMs"),
        updated_at_ms: r.get("updatedAtMs"),
    }
}
