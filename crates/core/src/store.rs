//! SQLite-backed tag index.
//!
//! The write helpers belong to the tagging and directory-management side;
//! the query engine only consumes [`SnapshotSource::load_snapshot`].

use crate::error::IndexError;
use crate::index::{IndexSnapshot, SnapshotSource};
use crate::models::{normalize_tag, Directory, DirectoryId, ItemId, TagAssignment, TagCategory};
use sqlx::SqlitePool;
use storage::models::{DirectoryRow, ItemRow, ItemTagRow, TagRow};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct TagStore {
    pool: SqlitePool,
}

impl TagStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn upsert_directory(&self, path: &str, active: bool) -> anyhow::Result<DirectoryId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO directories (path, active)
            VALUES (?1, ?2)
            ON CONFLICT(path) DO UPDATE SET active = excluded.active
            RETURNING id
            "#,
        )
        .bind(path)
        .bind(active)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Returns false when no directory has this id.
    pub async fn set_directory_active(&self, id: DirectoryId, active: bool) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE directories SET active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Deletes a directory with its items, then drops tags nothing uses anymore.
    pub async fn remove_directory(&self, id: DirectoryId) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM directories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Ok(false);
        }
        self.remove_orphaned_tags().await?;
        Ok(true)
    }

    pub async fn directories(&self) -> anyhow::Result<Vec<Directory>> {
        let rows = sqlx::query_as::<_, DirectoryRow>(
            "SELECT id, path, active FROM directories ORDER BY path",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| Directory {
                id: r.id,
                path: r.path,
                active: r.active,
            })
            .collect())
    }

    pub async fn upsert_item(&self, directory_id: DirectoryId, path: &str) -> anyhow::Result<ItemId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO items (directory_id, path)
            VALUES (?1, ?2)
            ON CONFLICT(path) DO UPDATE SET directory_id = excluded.directory_id
            RETURNING id
            "#,
        )
        .bind(directory_id)
        .bind(path)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn item_id_for_path(&self, path: &str) -> anyhow::Result<Option<ItemId>> {
        let id = sqlx::query_scalar("SELECT id FROM items WHERE path = ?1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// Replaces every tag of `item` in one transaction.
    ///
    /// Names are normalized and blank ones skipped; confidences are clamped to
    /// `[0, 1]`. A name listed twice keeps its highest confidence.
    pub async fn set_item_tags(&self, item: ItemId, tags: &[TagAssignment]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM item_tags WHERE item_id = ?1")
            .bind(item)
            .execute(&mut *tx)
            .await?;

        for assignment in tags {
            let name = normalize_tag(&assignment.name);
            if name.is_empty() {
                continue;
            }
            let confidence = if assignment.confidence.is_nan() {
                0.0
            } else {
                assignment.confidence.clamp(0.0, 1.0)
            };
            sqlx::query("INSERT INTO tags (name, category) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING")
                .bind(&name)
                .bind(assignment.category.as_str())
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                r#"
                INSERT INTO item_tags (item_id, tag_id, confidence)
                VALUES (?1, (SELECT id FROM tags WHERE name = ?2), ?3)
                ON CONFLICT(item_id, tag_id) DO UPDATE SET
                    confidence = MAX(confidence, excluded.confidence)
                "#,
            )
            .bind(item)
            .bind(&name)
            .bind(f64::from(confidence))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(item, tags = tags.len(), "item tags replaced");
        Ok(())
    }

    /// Deletes tags no item references. Returns how many were removed.
    pub async fn remove_orphaned_tags(&self) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM tags WHERE id NOT IN (SELECT DISTINCT tag_id FROM item_tags)")
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[async_trait::async_trait]
impl SnapshotSource for TagStore {
    /// Reads every table inside one transaction so a concurrent writer
    /// cannot leave the snapshot half-updated.
    async fn load_snapshot(&self) -> Result<IndexSnapshot, IndexError> {
        let mut tx = self.pool.begin().await?;
        let directories = sqlx::query_as::<_, DirectoryRow>("SELECT id, path, active FROM directories")
            .fetch_all(&mut *tx)
            .await?;
        let items = sqlx::query_as::<_, ItemRow>("SELECT id, directory_id, path FROM items")
            .fetch_all(&mut *tx)
            .await?;
        let tags = sqlx::query_as::<_, TagRow>("SELECT id, name, category FROM tags")
            .fetch_all(&mut *tx)
            .await?;
        let links = sqlx::query_as::<_, ItemTagRow>("SELECT item_id, tag_id, confidence FROM item_tags")
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        let mut builder = IndexSnapshot::builder();
        for d in directories {
            builder = builder.directory(d.id, d.path, d.active);
        }
        for i in items {
            builder = builder.item(i.id, i.directory_id, i.path);
        }
        for t in tags {
            let category = t.category.parse::<TagCategory>().unwrap_or_else(|err| {
                warn!(tag = %t.name, "{err}; treating as general");
                TagCategory::General
            });
            builder = builder.tag(t.id, &t.name, category);
        }
        for l in links {
            builder = builder.item_tag(l.item_id, l.tag_id, l.confidence as f32);
        }
        Ok(builder.build())
    }
}
