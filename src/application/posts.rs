//! Post and comment mutations: validation, ownership, write-through.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::repos::{
    CommentsRepo, GroupsRepo, NewComment, NewPost, PostContentUpdate, PostsRepo, PostsWriteRepo,
    RepoError,
};
use crate::domain::entities::{CommentRecord, PostRecord, UserRecord};
use crate::domain::ownership::{EditAccess, edit_access};

#[derive(Debug, Error)]
pub enum PostError {
    #[error("unknown post")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Field-level validation errors for the post form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFormErrors {
    pub text: Option<&'static str>,
    pub group: Option<&'static str>,
}

impl PostFormErrors {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.group.is_none()
    }
}

pub const TEXT_REQUIRED: &str = "Enter the post text.";
pub const GROUP_UNKNOWN: &str = "Pick an existing group.";

/// User-submitted post content, before validation.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub text: String,
    pub group_id: Option<i64>,
    /// Stored media path; set by the HTTP layer after validation passed.
    pub image_path: Option<String>,
}

#[derive(Debug)]
pub enum CreateOutcome {
    Created(PostRecord),
    Invalid(PostFormErrors),
}

#[derive(Debug)]
pub enum EditOutcome {
    Updated(PostRecord),
    Invalid(PostFormErrors),
    /// The viewer is not the author. No mutation happened; the caller
    /// redirects to the post detail without surfacing an error.
    Denied { post_id: i64 },
}

/// Loading a post for the edit form is itself capability-gated.
#[derive(Debug)]
pub enum EditLoad {
    Editable(PostRecord),
    Denied { post_id: i64 },
}

#[derive(Debug)]
pub enum CommentOutcome {
    Created(CommentRecord),
    /// Validation failed; nothing was written. The HTTP layer still
    /// redirects to the post detail, matching the long-standing behavior.
    Rejected,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    posts_write: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        posts_write: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            posts,
            posts_write,
            groups,
            comments,
        }
    }

    /// Validate a draft without writing anything. The HTTP layer calls this
    /// before storing an uploaded image so invalid submissions never leave
    /// stray files behind.
    pub async fn validate(&self, draft: &PostDraft) -> Result<PostFormErrors, RepoError> {
        let mut errors = PostFormErrors::default();

        if draft.text.trim().is_empty() {
            errors.text = Some(TEXT_REQUIRED);
        }

        if let Some(group_id) = draft.group_id
            && self.groups.find_by_id(group_id).await?.is_none()
        {
            errors.group = Some(GROUP_UNKNOWN);
        }

        Ok(errors)
    }

    /// Create a post authored by `author`. Invalid drafts write nothing.
    pub async fn create_post(
        &self,
        author: &UserRecord,
        draft: PostDraft,
    ) -> Result<CreateOutcome, PostError> {
        let errors = self.validate(&draft).await?;
        if !errors.is_empty() {
            return Ok(CreateOutcome::Invalid(errors));
        }

        let record = self
            .posts_write
            .insert_post(NewPost {
                author_id: author.id,
                text: draft.text,
                group_id: draft.group_id,
                image_path: draft.image_path,
            })
            .await?;

        Ok(CreateOutcome::Created(record))
    }

    /// Fetch a post for the edit form, applying the ownership gate.
    pub async fn load_for_edit(
        &self,
        viewer: &UserRecord,
        post_id: i64,
    ) -> Result<EditLoad, PostError> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or(PostError::NotFound)?;

        match edit_access(viewer.id, post.author_id) {
            EditAccess::Authorized => Ok(EditLoad::Editable(post)),
            EditAccess::Denied => Ok(EditLoad::Denied { post_id }),
        }
    }

    /// Apply an edit. Non-authors are turned away before validation runs,
    /// and the underlying UPDATE re-checks authorship in its WHERE clause.
    pub async fn edit_post(
        &self,
        viewer: &UserRecord,
        post_id: i64,
        draft: PostDraft,
    ) -> Result<EditOutcome, PostError> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or(PostError::NotFound)?;

        if let EditAccess::Denied = edit_access(viewer.id, post.author_id) {
            return Ok(EditOutcome::Denied { post_id });
        }

        let errors = self.validate(&draft).await?;
        if !errors.is_empty() {
            return Ok(EditOutcome::Invalid(errors));
        }

        let updated = self
            .posts_write
            .update_post(PostContentUpdate {
                id: post.id,
                author_id: viewer.id,
                text: draft.text,
                group_id: draft.group_id,
                image_path: draft.image_path,
            })
            .await?
            // The guarded update lost a race (post deleted underneath us).
            .ok_or(PostError::NotFound)?;

        Ok(EditOutcome::Updated(updated))
    }

    /// Attach a comment to a post. Unknown posts are a terminal NotFound;
    /// blank text is rejected without a write.
    pub async fn add_comment(
        &self,
        author: &UserRecord,
        post_id: i64,
        text: &str,
    ) -> Result<CommentOutcome, PostError> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or(PostError::NotFound)?;

        if text.trim().is_empty() {
            debug!(
                target = "brusio::posts",
                post_id = post.id,
                author = %author.username,
                "rejected empty comment"
            );
            return Ok(CommentOutcome::Rejected);
        }

        let record = self
            .comments
            .insert_comment(NewComment {
                post_id: post.id,
                author_id: author.id,
                text: text.to_string(),
            })
            .await?;

        Ok(CommentOutcome::Created(record))
    }
}
