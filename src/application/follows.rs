//! Follow-edge mutations: idempotent create and delete.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown author")]
    UnknownAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    /// A user may not follow themself; refused before the insert.
    SelfFollowRefused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowOutcome {
    Removed,
    NotFollowing,
}

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    async fn resolve_author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or(FollowError::UnknownAuthor)
    }

    /// Follow `author_username`. Following an already-followed author is a
    /// no-op, not an error; self-follows are refused outright.
    pub async fn follow(
        &self,
        viewer: &UserRecord,
        author_username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self.resolve_author(author_username).await?;

        if viewer.id == author.id {
            debug!(
                target = "brusio::follows",
                user = %viewer.username,
                "refused self-follow"
            );
            return Ok(FollowOutcome::SelfFollowRefused);
        }

        match self.follows.insert_follow(viewer.id, author.id).await {
            Ok(true) => Ok(FollowOutcome::Created),
            Ok(false) => Ok(FollowOutcome::AlreadyFollowing),
            // Two concurrent follows can both pass the existence probe; the
            // unique pair constraint resolves the race in storage.
            Err(RepoError::Duplicate { .. }) => Ok(FollowOutcome::AlreadyFollowing),
            Err(err) => Err(err.into()),
        }
    }

    /// Unfollow `author_username`. Unfollowing a non-followed author is a
    /// no-op.
    pub async fn unfollow(
        &self,
        viewer: &UserRecord,
        author_username: &str,
    ) -> Result<UnfollowOutcome, FollowError> {
        let author = self.resolve_author(author_username).await?;

        if self.follows.delete_follow(viewer.id, author.id).await? {
            Ok(UnfollowOutcome::Removed)
        } else {
            Ok(UnfollowOutcome::NotFollowing)
        }
    }
}
