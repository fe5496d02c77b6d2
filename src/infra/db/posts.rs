use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::application::repos::{
    NewPost, PostContentUpdate, PostScope, PostsRepo, PostsWriteRepo, RepoError,
};
use crate::domain::entities::{PostGroupRef, PostRecord};

use super::PostgresRepositories;
use super::util::map_sqlx_error;

/// Base projection for posts with author and group display fields joined in.
const POSTS_BASE_SELECT: &str = "SELECT p.id, p.text, p.author_id, \
    u.username AS author_username, p.group_id, g.title AS group_title, \
    g.slug AS group_slug, p.image_path, p.created_at \
    FROM posts p \
    INNER JOIN users u ON u.id = p.author_id \
    LEFT JOIN groups g ON g.id = p.group_id";

/// Feed order: newest first, insertion order (id ascending) on ties.
const POSTS_FEED_ORDER: &str = " ORDER BY p.created_at DESC, p.id ASC ";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    text: String,
    author_id: i64,
    author_username: String,
    group_id: Option<i64>,
    group_title: Option<String>,
    group_slug: Option<String>,
    image_path: Option<String>,
    created_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        let group = match (row.group_id, row.group_title, row.group_slug) {
            (Some(id), Some(title), Some(slug)) => Some(PostGroupRef { id, title, slug }),
            _ => None,
        };

        PostRecord {
            id: row.id,
            text: row.text,
            author_id: row.author_id,
            author_username: row.author_username,
            group,
            image_path: row.image_path,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_posts(
        &self,
        scope: PostScope,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let limit = i64::from(limit.clamp(1, 100));
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        let mut qb = QueryBuilder::new(POSTS_BASE_SELECT);
        qb.push(" WHERE 1=1 ");
        Self::apply_scope_conditions(&mut qb, scope);
        qb.push(POSTS_FEED_ORDER);
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows: Vec<PostRow> = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE 1=1 ");
        Self::apply_scope_conditions(&mut qb, scope);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("{POSTS_BASE_SELECT} WHERE p.id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn insert_post(&self, post: NewPost) -> Result<PostRecord, RepoError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO posts (text, author_id, group_id, image_path) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&post.text)
        .bind(post.author_id)
        .bind(post.group_id)
        .bind(&post.image_path)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        self.find_post(id).await?.ok_or(RepoError::NotFound)
    }

    async fn update_post(
        &self,
        update: PostContentUpdate,
    ) -> Result<Option<PostRecord>, RepoError> {
        // Authorship is re-checked in the WHERE clause; a concurrent author
        // mismatch or delete makes this a no-op rather than a lost guard.
        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE posts SET text = $1, group_id = $2, \
             image_path = COALESCE($3, image_path) \
             WHERE id = $4 AND author_id = $5 RETURNING id",
        )
        .bind(&update.text)
        .bind(update.group_id)
        .bind(&update.image_path)
        .bind(update.id)
        .bind(update.author_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match updated {
            Some(id) => self.find_post(id).await,
            None => Ok(None),
        }
    }

    async fn delete_post(&self, id: i64) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
