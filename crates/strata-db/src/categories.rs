//! PostgreSQL implementation of the category store.

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use strata_core::{
    Category, CategoryRecord, CategoryStore, Error, Membership, Post, PostHashtags, Result,
    TaxonomySnapshot,
};

const CATEGORY_COLUMNS: &str =
    "id, name, description, post_count, embedding, is_parent, parent_id";

fn require_rows(rows: u64, id: Uuid) -> Result<()> {
    if rows == 0 {
        return Err(Error::CategoryNotFound(id));
    }
    Ok(())
}

fn category_from_row(r: &PgRow) -> Category {
    Category {
        id: r.get("id"),
        name: r.get("name"),
        description: r.get("description"),
        post_count: r.get("post_count"),
        embedding: r.get::<Option<Vector>, _>("embedding"),
        is_parent: r.get("is_parent"),
        parent_id: r.get("parent_id"),
    }
}

/// PostgreSQL + pgvector category store.
///
/// Soft delete sets `deleted_at`; every query over "categories" filters on
/// `deleted_at IS NULL` except snapshots.
#[derive(Clone)]
pub struct PgCategoryStore {
    pool: Pool<Postgres>,
}

impl PgCategoryStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a post with an optional embedding. Posts are owned by the
    /// collection layer; this exists for seeding and tests.
    pub async fn insert_post(&self, embedding: Option<Vector>) -> Result<Uuid> {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO post (id, embedding) VALUES ($1, $2)")
            .bind(id)
            .bind(embedding)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(id)
    }
}

#[async_trait]
impl CategoryStore for PgCategoryStore {
    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM category WHERE deleted_at IS NULL ORDER BY created_at, id",
            CATEGORY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(category_from_row).collect())
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM category WHERE id = $1 AND deleted_at IS NULL",
            CATEGORY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(category_from_row))
    }

    async fn create_category(&self, name: &str, description: Option<&str>) -> Result<Category> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO category (id, name, description, post_count, created_at, updated_at)
            VALUES ($1, $2, $3, 0, $4, $4)
            RETURNING {}
            "#,
            CATEGORY_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(category_from_row(&row))
    }

    async fn soft_delete_category(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE category SET deleted_at = COALESCE(deleted_at, $2), updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        require_rows(result.rows_affected(), id)
    }

    async fn reassign_posts(&self, from: Uuid, to: Uuid) -> Result<u64> {
        if from == to {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let moved = sqlx::query(
            r#"
            UPDATE post_category AS outer_row
            SET category_id = $1
            WHERE outer_row.category_id = $2 AND NOT EXISTS (
                SELECT 1 FROM post_category
                WHERE post_id = outer_row.post_id AND category_id = $1
            )
            "#,
        )
        .bind(to)
        .bind(from)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        // Whatever is left was already linked to the target.
        let duplicates = sqlx::query("DELETE FROM post_category WHERE category_id = $1")
            .bind(from)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "categories",
            op = "reassign_posts",
            from = %from,
            to = %to,
            moved,
            duplicates,
            "Reassigned post edges"
        );
        Ok(moved)
    }

    async fn set_category_parent(&self, child_id: Uuid, parent_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE category SET parent_id = $2, updated_at = $3 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(child_id)
        .bind(parent_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        require_rows(result.rows_affected(), child_id)
    }

    async fn set_category_is_parent(&self, id: Uuid, is_parent: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE category SET is_parent = $2, updated_at = $3 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(is_parent)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        require_rows(result.rows_affected(), id)
    }

    async fn rename_category(&self, id: Uuid, name: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE category SET name = $2, updated_at = $3 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        require_rows(result.rows_affected(), id)
    }

    async fn update_category_embedding(&self, id: Uuid, embedding: Vector) -> Result<()> {
        let result = sqlx::query(
            "UPDATE category SET embedding = $2, updated_at = $3 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(embedding)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        require_rows(result.rows_affected(), id)
    }

    async fn refresh_post_count(&self, id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE category
            SET post_count = (
                SELECT COUNT(DISTINCT post_id) FROM post_category WHERE category_id = $1
            ), updated_at = $2
            WHERE id = $1
            RETURNING post_count
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| r.get("post_count"))
            .ok_or(Error::CategoryNotFound(id))
    }

    async fn posts_for_category(&self, id: Uuid) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT post_id FROM post_category WHERE category_id = $1 ORDER BY post_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(|r| r.get("post_id")).collect())
    }

    async fn categories_for_post(&self, post_id: Uuid) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT pc.category_id
            FROM post_category pc
            JOIN category c ON c.id = pc.category_id
            WHERE pc.post_id = $1 AND c.deleted_at IS NULL
            ORDER BY pc.category_id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(|r| r.get("category_id")).collect())
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT id, embedding FROM post WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let hashtags = sqlx::query(
            "SELECT hashtag FROM post_hashtag WHERE post_id = $1 ORDER BY created_at, hashtag",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?
        .iter()
        .map(|r| r.get("hashtag"))
        .collect();

        Ok(Some(Post {
            id: row.get("id"),
            category_ids: self.categories_for_post(id).await?,
            embedding: row.get::<Option<Vector>, _>("embedding"),
            hashtags,
        }))
    }

    async fn add_hashtag(&self, post_id: Uuid, hashtag: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO post_hashtag (post_id, hashtag) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(hashtag)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn link_post(&self, post_id: Uuid, category_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO post_category (post_id, category_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(category_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn unlink_post(&self, post_id: Uuid, category_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM post_category WHERE post_id = $1 AND category_id = $2")
            .bind(post_id)
            .bind(category_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn unlink_posts(&self, post_ids: &[Uuid], category_id: Uuid) -> Result<u64> {
        if post_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "DELETE FROM post_category WHERE category_id = $1 AND post_id = ANY($2::uuid[])",
        )
        .bind(category_id)
        .bind(post_ids)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn find_orphan_posts(&self, keep_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pc.post_id
            FROM post_category pc
            WHERE NOT EXISTS (
                SELECT 1 FROM post_category k
                WHERE k.post_id = pc.post_id AND k.category_id = ANY($1::uuid[])
            )
            ORDER BY pc.post_id
            "#,
        )
        .bind(keep_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(|r| r.get("post_id")).collect())
    }

    async fn snapshot(&self) -> Result<TaxonomySnapshot> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let categories = sqlx::query(
            r#"
            SELECT id, name, description, post_count, is_parent, parent_id,
                   deleted_at IS NOT NULL AS deleted
            FROM category
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?
        .iter()
        .map(|r| CategoryRecord {
            id: r.get("id"),
            name: r.get("name"),
            description: r.get("description"),
            post_count: r.get("post_count"),
            is_parent: r.get("is_parent"),
            parent_id: r.get("parent_id"),
            deleted: r.get("deleted"),
        })
        .collect();

        let memberships = sqlx::query(
            "SELECT post_id, category_id FROM post_category ORDER BY post_id, category_id",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?
        .iter()
        .map(|r| Membership {
            post_id: r.get("post_id"),
            category_id: r.get("category_id"),
        })
        .collect();

        let hashtags = sqlx::query(
            r#"
            SELECT post_id, array_agg(hashtag ORDER BY hashtag) AS hashtags
            FROM post_hashtag
            GROUP BY post_id
            ORDER BY post_id
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?
        .iter()
        .map(|r| PostHashtags {
            post_id: r.get("post_id"),
            hashtags: r.get("hashtags"),
        })
        .collect();

        tx.commit().await.map_err(Error::Database)?;

        Ok(TaxonomySnapshot {
            taken_at: Utc::now(),
            categories,
            memberships,
            hashtags,
        })
    }

    async fn restore_snapshot(&self, snapshot: &TaxonomySnapshot) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Parents first cleared so upserts never reference a missing row.
        for record in &snapshot.categories {
            sqlx::query(
                r#"
                INSERT INTO category (id, name, description, post_count, is_parent,
                                      parent_id, deleted_at, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, NULL, $6, $7, $7)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    description = EXCLUDED.description,
                    post_count = EXCLUDED.post_count,
                    is_parent = EXCLUDED.is_parent,
                    parent_id = NULL,
                    deleted_at = EXCLUDED.deleted_at,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(record.id)
            .bind(&record.name)
            .bind(&record.description)
            .bind(record.post_count)
            .bind(record.is_parent)
            .bind(if record.deleted { Some(now) } else { None })
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        for record in snapshot.categories.iter().filter(|r| r.parent_id.is_some()) {
            sqlx::query("UPDATE category SET parent_id = $2 WHERE id = $1")
                .bind(record.id)
                .bind(record.parent_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }

        // Categories created after the snapshot are retired.
        let known: Vec<Uuid> = snapshot.categories.iter().map(|r| r.id).collect();
        sqlx::query(
            r#"
            UPDATE category
            SET deleted_at = COALESCE(deleted_at, $2), is_parent = FALSE, parent_id = NULL,
                updated_at = $2
            WHERE id <> ALL($1::uuid[])
            "#,
        )
        .bind(&known)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query("DELETE FROM post_category")
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        let (post_ids, category_ids): (Vec<Uuid>, Vec<Uuid>) = snapshot
            .memberships
            .iter()
            .map(|m| (m.post_id, m.category_id))
            .unzip();
        sqlx::query(
            r#"
            INSERT INTO post_category (post_id, category_id)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&post_ids)
        .bind(&category_ids)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query("DELETE FROM post_hashtag")
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        let (tag_posts, tags): (Vec<Uuid>, Vec<String>) = snapshot
            .hashtags
            .iter()
            .flat_map(|h| h.hashtags.iter().map(move |t| (h.post_id, t.clone())))
            .unzip();
        sqlx::query(
            r#"
            INSERT INTO post_hashtag (post_id, hashtag)
            SELECT * FROM UNNEST($1::uuid[], $2::text[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&tag_posts)
        .bind(&tags)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "categories",
            op = "restore_snapshot",
            categories = snapshot.categories.len(),
            memberships = snapshot.memberships.len(),
            "Restored taxonomy snapshot"
        );
        Ok(())
    }
}
