//! Feed composition: the ordered post lists behind every public screen.

use std::sync::Arc;

use thiserror::Error;

use crate::application::pagination::{Page, PageNumber, Paginator};
use crate::application::repos::{
    CommentsRepo, FollowsRepo, GroupsRepo, PostScope, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};

pub type FeedPage = Page<PostRecord>;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group")]
    UnknownGroup,
    #[error("unknown author")]
    UnknownAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// A group feed together with the group it is scoped to.
#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: FeedPage,
}

/// An author feed together with the author and the viewer's follow state
/// (`None` when the viewer is anonymous).
#[derive(Debug, Clone)]
pub struct AuthorFeed {
    pub author: UserRecord,
    pub page: FeedPage,
    pub viewer_follows: Option<bool>,
}

/// A single post with its comment thread, newest comment first.
#[derive(Debug, Clone)]
pub struct PostThread {
    pub post: PostRecord,
    pub comments: Vec<CommentRecord>,
}

/// Read-side service composing repositories into the four feed kinds.
///
/// Every ordering is created_at descending with an id-ascending tiebreak;
/// the repositories own that contract, this service owns scope resolution
/// and pagination.
#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    comments: Arc<dyn CommentsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    paginator: Paginator,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        comments: Arc<dyn CommentsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        page_size: u32,
    ) -> Self {
        Self {
            posts,
            comments,
            groups,
            users,
            follows,
            paginator: Paginator::new(page_size),
        }
    }

    async fn scoped_page(
        &self,
        scope: PostScope,
        requested: PageNumber,
    ) -> Result<FeedPage, FeedError> {
        let total = self.posts.count_posts(scope).await?;
        let window = self.paginator.locate(total, requested);
        let items = self
            .posts
            .list_posts(scope, window.limit, window.offset)
            .await?;
        Ok(Page::assemble(window, items))
    }

    /// The global feed: every post, newest first.
    pub async fn global_page(&self, requested: PageNumber) -> Result<FeedPage, FeedError> {
        self.scoped_page(PostScope::All, requested).await
    }

    /// Posts in one group; unknown slugs are a terminal NotFound.
    pub async fn group_page(
        &self,
        slug: &str,
        requested: PageNumber,
    ) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or(FeedError::UnknownGroup)?;
        let page = self.scoped_page(PostScope::Group(group.id), requested).await?;
        Ok(GroupFeed { group, page })
    }

    /// Posts by one author; unknown usernames are a terminal NotFound.
    pub async fn author_page(
        &self,
        username: &str,
        viewer: Option<&UserRecord>,
        requested: PageNumber,
    ) -> Result<AuthorFeed, FeedError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(FeedError::UnknownAuthor)?;
        let page = self
            .scoped_page(PostScope::Author(author.id), requested)
            .await?;

        let viewer_follows = match viewer {
            Some(viewer) => Some(self.follows.is_following(viewer.id, author.id).await?),
            None => None,
        };

        Ok(AuthorFeed {
            author,
            page,
            viewer_follows,
        })
    }

    /// Posts by authors the viewer follows.
    ///
    /// An anonymous viewer gets `Ok(None)`: the absence of a feed object,
    /// deliberately distinct from an empty page.
    pub async fn subscription_page(
        &self,
        viewer: Option<&UserRecord>,
        requested: PageNumber,
    ) -> Result<Option<FeedPage>, FeedError> {
        let Some(viewer) = viewer else {
            return Ok(None);
        };
        let page = self
            .scoped_page(PostScope::FollowedBy(viewer.id), requested)
            .await?;
        Ok(Some(page))
    }

    /// One post with its comment thread; `None` for unknown ids.
    pub async fn post_thread(&self, post_id: i64) -> Result<Option<PostThread>, FeedError> {
        let Some(post) = self.posts.find_post(post_id).await? else {
            return Ok(None);
        };
        let comments = self.comments.list_for_post(post.id).await?;
        Ok(Some(PostThread { post, comments }))
    }
}
