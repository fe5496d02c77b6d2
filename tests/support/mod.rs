//! Shared test harness: an in-memory implementation of every repository
//! trait, plus helpers for driving the real router.
#![allow(dead_code)]

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use tempfile::TempDir;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use brusio::application::auth::AuthService;
use brusio::application::feed::FeedService;
use brusio::application::follows::FollowService;
use brusio::application::posts::PostService;
use brusio::application::repos::{
    CommentsRepo, FollowsRepo, GroupsRepo, HealthRepo, NewComment, NewPost, NewUser,
    PostContentUpdate, PostScope, PostsRepo, PostsWriteRepo, RepoError, SessionsRepo, UsersRepo,
};
use brusio::cache::{CacheConfig, CacheState, PageCache};
use brusio::domain::entities::{
    CommentRecord, FollowRecord, GroupRecord, PostGroupRef, PostRecord, SessionRecord, UserRecord,
};
use brusio::infra::http::{HttpState, build_router};
use brusio::infra::media::MediaStorage;

const BASE_TIME: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

#[derive(Clone)]
struct StoredUser {
    record: UserRecord,
    password_hash: String,
}

#[derive(Clone)]
struct StoredPost {
    id: i64,
    text: String,
    author_id: i64,
    group_id: Option<i64>,
    image_path: Option<String>,
    created_at: OffsetDateTime,
}

#[derive(Clone)]
struct StoredComment {
    id: i64,
    post_id: i64,
    author_id: i64,
    text: String,
    created_at: OffsetDateTime,
}

#[derive(Default)]
struct Tables {
    users: Vec<StoredUser>,
    groups: Vec<GroupRecord>,
    posts: Vec<StoredPost>,
    comments: Vec<StoredComment>,
    follows: Vec<FollowRecord>,
    sessions: Vec<SessionRecord>,
}

/// In-memory stand-in for the Postgres adapter, mirroring its join and
/// ordering behavior.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_id: AtomicI64,
    clock_offset: AtomicI64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_id: AtomicI64::new(1),
            clock_offset: AtomicI64::new(0),
        }
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Monotonic fake clock so insertion order is visible in timestamps.
    fn next_instant(&self) -> OffsetDateTime {
        let offset = self.clock_offset.fetch_add(1, Ordering::SeqCst);
        BASE_TIME + Duration::seconds(offset)
    }

    pub fn add_user(&self, username: &str) -> UserRecord {
        let record = UserRecord {
            id: self.allocate_id(),
            username: username.to_string(),
            created_at: self.next_instant(),
        };
        self.tables.write().unwrap().users.push(StoredUser {
            record: record.clone(),
            password_hash: "unused".to_string(),
        });
        record
    }

    pub fn add_group(&self, title: &str, slug: &str, description: &str) -> GroupRecord {
        let record = GroupRecord {
            id: self.allocate_id(),
            title: title.to_string(),
            slug: slug.to_string(),
            description: description.to_string(),
        };
        self.tables.write().unwrap().groups.push(record.clone());
        record
    }

    pub fn add_post(&self, author_id: i64, group_id: Option<i64>, text: &str) -> i64 {
        let created_at = self.next_instant();
        self.add_post_at(author_id, group_id, text, created_at)
    }

    pub fn add_post_at(
        &self,
        author_id: i64,
        group_id: Option<i64>,
        text: &str,
        created_at: OffsetDateTime,
    ) -> i64 {
        let id = self.allocate_id();
        self.tables.write().unwrap().posts.push(StoredPost {
            id,
            text: text.to_string(),
            author_id,
            group_id,
            image_path: None,
            created_at,
        });
        id
    }

    pub fn open_session(&self, user_id: i64) -> Uuid {
        let token = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        self.tables.write().unwrap().sessions.push(SessionRecord {
            token,
            user_id,
            created_at: now,
            expires_at: now + Duration::hours(1),
        });
        token
    }

    pub fn find_user(&self, username: &str) -> Option<UserRecord> {
        self.tables
            .read()
            .unwrap()
            .users
            .iter()
            .find(|user| user.record.username == username)
            .map(|user| user.record.clone())
    }

    pub fn add_follow(&self, user_id: i64, author_id: i64) {
        let id = self.allocate_id();
        self.tables.write().unwrap().follows.push(FollowRecord {
            id,
            user_id,
            author_id,
        });
    }

    pub fn add_comment(&self, post_id: i64, author_id: i64, text: &str) -> i64 {
        let id = self.allocate_id();
        let created_at = self.next_instant();
        self.tables.write().unwrap().comments.push(StoredComment {
            id,
            post_id,
            author_id,
            text: text.to_string(),
            created_at,
        });
        id
    }

    pub fn follow_count(&self, user_id: i64, author_id: i64) -> usize {
        self.tables
            .read()
            .unwrap()
            .follows
            .iter()
            .filter(|edge| edge.user_id == user_id && edge.author_id == author_id)
            .count()
    }

    pub fn post_count(&self) -> usize {
        self.tables.read().unwrap().posts.len()
    }

    pub fn comment_count(&self) -> usize {
        self.tables.read().unwrap().comments.len()
    }

    pub fn post_text(&self, post_id: i64) -> Option<String> {
        self.tables
            .read()
            .unwrap()
            .posts
            .iter()
            .find(|post| post.id == post_id)
            .map(|post| post.text.clone())
    }

    fn compose_post(&self, tables: &Tables, post: &StoredPost) -> PostRecord {
        let author_username = tables
            .users
            .iter()
            .find(|user| user.record.id == post.author_id)
            .map(|user| user.record.username.clone())
            .unwrap_or_default();
        let group = post.group_id.and_then(|group_id| {
            tables
                .groups
                .iter()
                .find(|group| group.id == group_id)
                .map(|group| PostGroupRef {
                    id: group.id,
                    title: group.title.clone(),
                    slug: group.slug.clone(),
                })
        });

        PostRecord {
            id: post.id,
            text: post.text.clone(),
            author_id: post.author_id,
            author_username,
            group,
            image_path: post.image_path.clone(),
            created_at: post.created_at,
        }
    }

    fn scope_matches(tables: &Tables, scope: PostScope, post: &StoredPost) -> bool {
        match scope {
            PostScope::All => true,
            PostScope::Group(group_id) => post.group_id == Some(group_id),
            PostScope::Author(author_id) => post.author_id == author_id,
            PostScope::FollowedBy(user_id) => tables
                .follows
                .iter()
                .any(|edge| edge.user_id == user_id && edge.author_id == post.author_id),
        }
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn list_posts(
        &self,
        scope: PostScope,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let tables = self.tables.read().unwrap();
        let mut posts: Vec<&StoredPost> = tables
            .posts
            .iter()
            .filter(|post| Self::scope_matches(&tables, scope, post))
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(posts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|post| self.compose_post(&tables, post))
            .collect())
    }

    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let tables = self.tables.read().unwrap();
        let count = tables
            .posts
            .iter()
            .filter(|post| Self::scope_matches(&tables, scope, post))
            .count();
        Ok(count as u64)
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| self.compose_post(&tables, post)))
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn insert_post(&self, post: NewPost) -> Result<PostRecord, RepoError> {
        let id = self.allocate_id();
        let created_at = self.next_instant();
        let mut tables = self.tables.write().unwrap();
        let stored = StoredPost {
            id,
            text: post.text,
            author_id: post.author_id,
            group_id: post.group_id,
            image_path: post.image_path,
            created_at,
        };
        tables.posts.push(stored);
        let stored = tables.posts.last().expect("just pushed").clone();
        Ok(self.compose_post(&tables, &stored))
    }

    async fn update_post(
        &self,
        update: PostContentUpdate,
    ) -> Result<Option<PostRecord>, RepoError> {
        let mut tables = self.tables.write().unwrap();
        let Some(post) = tables
            .posts
            .iter_mut()
            .find(|post| post.id == update.id && post.author_id == update.author_id)
        else {
            return Ok(None);
        };

        post.text = update.text;
        post.group_id = update.group_id;
        if let Some(image_path) = update.image_path {
            post.image_path = Some(image_path);
        }

        let updated = post.clone();
        Ok(Some(self.compose_post(&tables, &updated)))
    }

    async fn delete_post(&self, id: i64) -> Result<(), RepoError> {
        let mut tables = self.tables.write().unwrap();
        tables.posts.retain(|post| post.id != id);
        tables.comments.retain(|comment| comment.post_id != id);
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let tables = self.tables.read().unwrap();
        let mut comments: Vec<&StoredComment> = tables
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(comments
            .into_iter()
            .map(|comment| CommentRecord {
                id: comment.id,
                post_id: comment.post_id,
                author_id: comment.author_id,
                author_username: tables
                    .users
                    .iter()
                    .find(|user| user.record.id == comment.author_id)
                    .map(|user| user.record.username.clone())
                    .unwrap_or_default(),
                text: comment.text.clone(),
                created_at: comment.created_at,
            })
            .collect())
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<CommentRecord, RepoError> {
        let id = self.allocate_id();
        let created_at = self.next_instant();
        let mut tables = self.tables.write().unwrap();
        tables.comments.push(StoredComment {
            id,
            post_id: comment.post_id,
            author_id: comment.author_id,
            text: comment.text.clone(),
            created_at,
        });

        Ok(CommentRecord {
            id,
            post_id: comment.post_id,
            author_id: comment.author_id,
            author_username: tables
                .users
                .iter()
                .find(|user| user.record.id == comment.author_id)
                .map(|user| user.record.username.clone())
                .unwrap_or_default(),
            text: comment.text,
            created_at,
        })
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn list_all(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut groups = self.tables.read().unwrap().groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .groups
            .iter()
            .find(|group| group.slug == slug)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .groups
            .iter()
            .find(|group| group.id == id)
            .cloned())
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .users
            .iter()
            .find(|user| user.record.username == username)
            .map(|user| user.record.clone()))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .users
            .iter()
            .find(|user| user.record.id == id)
            .map(|user| user.record.clone()))
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.write().unwrap();
        if tables
            .users
            .iter()
            .any(|existing| existing.record.username == user.username)
        {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }

        let record = UserRecord {
            id: self.allocate_id(),
            username: user.username,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.push(StoredUser {
            record: record.clone(),
            password_hash: user.password_hash,
        });
        Ok(record)
    }

    async fn load_credentials(
        &self,
        username: &str,
    ) -> Result<Option<(UserRecord, String)>, RepoError> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .users
            .iter()
            .find(|user| user.record.username == username)
            .map(|user| (user.record.clone(), user.password_hash.clone())))
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn insert_follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut tables = self.tables.write().unwrap();
        if tables
            .follows
            .iter()
            .any(|edge| edge.user_id == user_id && edge.author_id == author_id)
        {
            return Ok(false);
        }
        let id = self.allocate_id();
        tables.follows.push(FollowRecord {
            id,
            user_id,
            author_id,
        });
        Ok(true)
    }

    async fn delete_follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut tables = self.tables.write().unwrap();
        let before = tables.follows.len();
        tables
            .follows
            .retain(|edge| !(edge.user_id == user_id && edge.author_id == author_id));
        Ok(tables.follows.len() < before)
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .follows
            .iter()
            .any(|edge| edge.user_id == user_id && edge.author_id == author_id))
    }
}

#[async_trait]
impl SessionsRepo for MemoryStore {
    async fn insert_session(&self, session: SessionRecord) -> Result<(), RepoError> {
        self.tables.write().unwrap().sessions.push(session);
        Ok(())
    }

    async fn find_viewer(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .sessions
            .iter()
            .find(|session| session.token == token && session.expires_at > now)
            .and_then(|session| {
                tables
                    .users
                    .iter()
                    .find(|user| user.record.id == session.user_id)
                    .map(|user| user.record.clone())
            }))
    }

    async fn delete_session(&self, token: Uuid) -> Result<(), RepoError> {
        self.tables
            .write()
            .unwrap()
            .sessions
            .retain(|session| session.token != token);
        Ok(())
    }
}

#[async_trait]
impl HealthRepo for MemoryStore {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

pub const TEST_PAGE_SIZE: u32 = 10;

pub fn feed_service(store: &Arc<MemoryStore>) -> FeedService {
    FeedService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        TEST_PAGE_SIZE,
    )
}

pub fn post_service(store: &Arc<MemoryStore>) -> PostService {
    PostService::new(store.clone(), store.clone(), store.clone(), store.clone())
}

pub fn follow_service(store: &Arc<MemoryStore>) -> FollowService {
    FollowService::new(store.clone(), store.clone())
}

/// A router wired to an in-memory store, with its media directory kept
/// alive for the duration of the test.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub router: Router,
    _media_dir: TempDir,
}

pub fn build_app(cache_config: Option<CacheConfig>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let media_dir = tempfile::tempdir().expect("media tempdir");

    let state = HttpState {
        feed: Arc::new(feed_service(&store)),
        posts: Arc::new(post_service(&store)),
        follows: Arc::new(follow_service(&store)),
        auth: Arc::new(AuthService::new(
            store.clone(),
            store.clone(),
            Duration::hours(1),
        )),
        groups: store.clone(),
        health: store.clone(),
        media: Arc::new(
            MediaStorage::new(media_dir.path().to_path_buf()).expect("media storage"),
        ),
        media_body_limit: 10 * 1024 * 1024,
        cache: cache_config.map(|config| CacheState {
            pages: Arc::new(PageCache::new(config)),
        }),
    };

    TestApp {
        router: build_router(state),
        store,
        _media_dir: media_dir,
    }
}

impl TestApp {
    pub async fn get(&self, path: &str) -> Response<Body> {
        self.request(Request::get(path).body(Body::empty()).expect("request"))
            .await
    }

    pub async fn get_as(&self, path: &str, token: Uuid) -> Response<Body> {
        self.request(
            Request::get(path)
                .header(header::COOKIE, format!("sid={token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
    }

    pub async fn post_form(&self, path: &str, token: Option<Uuid>, body: &str) -> Response<Body> {
        let mut builder = Request::post(path).header(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        );
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("sid={token}"));
        }
        self.request(builder.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        token: Option<Uuid>,
        form: &MultipartForm,
    ) -> Response<Body> {
        let mut builder = Request::post(path).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", form.boundary),
        );
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("sid={token}"));
        }
        self.request(builder.body(Body::from(form.encode())).expect("request"))
            .await
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collected body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub fn set_cookie_token(response: &Response<Body>) -> Option<Uuid> {
    let raw = response
        .headers()
        .get(header::SET_COOKIE)?
        .to_str()
        .ok()?;
    let value = raw.split(';').next()?.strip_prefix("sid=")?;
    Uuid::parse_str(value).ok()
}

/// Hand-rolled multipart body for driving the post form in tests.
pub struct MultipartForm {
    pub boundary: String,
    fields: Vec<(String, String)>,
    file: Option<(String, String, Vec<u8>)>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: "brusio-test-boundary".to_string(),
            fields: Vec::new(),
            file: None,
        }
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    pub fn image(mut self, filename: &str, data: &[u8]) -> Self {
        self.file = Some(("image".to_string(), filename.to_string(), data.to_vec()));
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in &self.fields {
            body.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        if let Some((name, filename, data)) = &self.file {
            body.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        body
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}
