//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, SessionRecord, UserRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Which posts a feed query selects.
///
/// Scoping keys are resolved ids: slug and username resolution happens in the
/// feed service, so unknown keys surface as NotFound before a list query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScope {
    All,
    Group(i64),
    Author(i64),
    FollowedBy(i64),
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: i64,
    pub text: String,
    pub group_id: Option<i64>,
    pub image_path: Option<String>,
}

/// Guarded content update: the author id is part of the WHERE clause, not
/// just a precondition checked by the caller.
#[derive(Debug, Clone)]
pub struct PostContentUpdate {
    pub id: i64,
    pub author_id: i64,
    pub text: String,
    pub group_id: Option<i64>,
    /// `None` keeps the stored image.
    pub image_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub author_id: i64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// List a window of posts in feed order: created_at descending, id
    /// ascending on equal timestamps.
    async fn list_posts(
        &self,
        scope: PostScope,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<PostRecord>, RepoError>;

    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError>;

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn insert_post(&self, post: NewPost) -> Result<PostRecord, RepoError>;

    /// Apply the update when both id and author match. `Ok(None)` means the
    /// guarded update matched no row.
    async fn update_post(&self, update: PostContentUpdate)
    -> Result<Option<PostRecord>, RepoError>;

    async fn delete_post(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    /// Comments for a post, newest first, id ascending on ties.
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError>;

    async fn insert_comment(&self, comment: NewComment) -> Result<CommentRecord, RepoError>;
}

#[async_trait]
pub trait GroupsRepo: Send + Sync {
    async fn list_all(&self) -> Result<Vec<GroupRecord>, RepoError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError>;
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, RepoError>;
    /// Credential lookup for login; returns the user together with the
    /// stored password hash.
    async fn load_credentials(
        &self,
        username: &str,
    ) -> Result<Option<(UserRecord, String)>, RepoError>;
}

#[async_trait]
pub trait FollowsRepo: Send + Sync {
    /// Get-or-create semantics; returns `true` when a new edge was written.
    /// The unique (user, author) constraint is the storage-level backstop.
    async fn insert_follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError>;

    /// Idempotent delete; returns `true` when an edge was removed.
    async fn delete_follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError>;

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    /// Cheap storage liveness probe backing the health endpoint.
    async fn ping(&self) -> Result<(), RepoError>;
}

#[async_trait]
pub trait SessionsRepo: Send + Sync {
    async fn insert_session(&self, session: SessionRecord) -> Result<(), RepoError>;

    /// Resolve a session token to its user, ignoring expired sessions.
    async fn find_viewer(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<UserRecord>, RepoError>;

    async fn delete_session(&self, token: Uuid) -> Result<(), RepoError>;
}
