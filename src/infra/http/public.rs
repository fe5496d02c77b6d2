//! Public HTTP surface: feeds, post detail, follow edges, media, maintenance.

use std::{io::ErrorKind, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;

use crate::{
    application::auth::AuthService,
    application::error::{ErrorReport, HttpError},
    application::feed::{FeedError, FeedService},
    application::follows::{FollowError, FollowService},
    application::pagination::PageNumber,
    application::posts::PostService,
    application::repos::{GroupsRepo, HealthRepo, RepoError},
    cache::{CacheState, page_cache_layer},
    domain::ownership::edit_access,
    infra::media::{MediaStorage, MediaStorageError},
    presentation::views::{
        FeedScreenContext, FollowTemplate, GroupContext, GroupTemplate, IndexTemplate,
        LayoutChrome, LayoutContext, PostDetailContext, PostDetailTemplate, ProfileContext,
        ProfileTemplate, comment_view, feed_context, post_card, render_not_found_response,
        render_template_response,
    },
};

use super::auth::{Viewer, login_form, login_submit, logout, signup_form, signup_submit};
use super::middleware::{log_responses, set_request_context};
use super::posts::{
    add_comment, create_post_form, create_post_submit, edit_post_form, edit_post_submit,
    parse_post_id,
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub auth: Arc<AuthService>,
    pub groups: Arc<dyn GroupsRepo>,
    pub health: Arc<dyn HealthRepo>,
    pub media: Arc<MediaStorage>,
    pub media_body_limit: usize,
    pub cache: Option<CacheState>,
}

pub fn build_router(state: HttpState) -> Router {
    // The global feed is the only cached surface; everything else renders
    // per request.
    let cached_routes = Router::new().route("/", get(index));
    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.layer(middleware::from_fn_with_state(
            cache_state,
            page_cache_layer,
        ))
    } else {
        cached_routes
    };

    let routes = Router::new()
        .route("/group/{slug}", get(group_feed))
        .route("/profile/{username}", get(profile))
        .route("/profile/{username}/follow", get(follow_author))
        .route("/profile/{username}/unfollow", get(unfollow_author))
        .route("/posts/{id}", get(post_detail))
        .route("/posts/{id}/edit", get(edit_post_form).post(edit_post_submit))
        .route("/posts/{id}/comment", post(add_comment))
        .route("/create", get(create_post_form).post(create_post_submit))
        .route("/follow", get(subscription_feed))
        .route("/auth/login", get(login_form).post(login_submit))
        .route("/auth/signup", get(signup_form).post(signup_submit))
        .route("/auth/logout", get(logout))
        .route("/media/{*path}", get(serve_media))
        .route("/_health/db", get(health))
        .route("/_maintenance/cache/clear", post(clear_page_cache))
        .fallback(fallback);

    let body_limit = state.media_body_limit;

    cached_routes
        .merge(routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

pub(crate) fn post_detail_path(post_id: i64) -> String {
    format!("/posts/{post_id}")
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageQuery {
    page: Option<String>,
}

fn feed_error_to_response(err: FeedError, chrome: LayoutChrome) -> Response {
    match err {
        FeedError::UnknownGroup | FeedError::UnknownAuthor => render_not_found_response(chrome),
        FeedError::Repo(_) => HttpError::from(err).into_response(),
    }
}

async fn index(
    State(state): State<HttpState>,
    viewer: Viewer,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = LayoutChrome::for_viewer(viewer.user());
    let page = PageNumber::parse(query.page.as_deref());

    match state.feed.global_page(page).await {
        Ok(feed_page) => {
            let content = FeedScreenContext {
                feed: feed_context(&feed_page, "/"),
            };
            let view = LayoutContext::new(chrome, "Latest posts", content);
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn group_feed(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = LayoutChrome::for_viewer(viewer.user());
    let page = PageNumber::parse(query.page.as_deref());

    match state.feed.group_page(&slug, page).await {
        Ok(group_feed) => {
            let content = GroupContext {
                feed: feed_context(&group_feed.page, &format!("/group/{}", group_feed.group.slug)),
                title: group_feed.group.title,
                description: group_feed.group.description,
            };
            let title = content.title.clone();
            let view = LayoutContext::new(chrome, title, content);
            render_template_response(GroupTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn profile(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = LayoutChrome::for_viewer(viewer.user());
    let page = PageNumber::parse(query.page.as_deref());

    match state.feed.author_page(&username, viewer.user(), page).await {
        Ok(author_feed) => {
            let is_self = viewer
                .user()
                .map(|user| user.id == author_feed.author.id)
                .unwrap_or(false);
            let content = ProfileContext {
                feed: feed_context(
                    &author_feed.page,
                    &format!("/profile/{}", author_feed.author.username),
                ),
                post_total: author_feed.page.total_items,
                following: author_feed.viewer_follows,
                is_self,
                username: author_feed.author.username,
            };
            let title = format!("Posts by {}", content.username);
            let view = LayoutContext::new(chrome, title, content);
            render_template_response(ProfileTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(post_id): Path<String>,
) -> Response {
    let chrome = LayoutChrome::for_viewer(viewer.user());
    let Some(post_id) = parse_post_id(&post_id) else {
        return render_not_found_response(chrome);
    };

    match state.feed.post_thread(post_id).await {
        Ok(Some(thread)) => {
            let can_edit = viewer
                .user()
                .map(|user| edit_access(user.id, thread.post.author_id).is_authorized())
                .unwrap_or(false);
            let content = PostDetailContext {
                post: post_card(&thread.post),
                comments: thread.comments.iter().map(comment_view).collect(),
                can_edit,
            };
            let title = format!("Post by {}", content.post.author_username);
            let view = LayoutContext::new(chrome, title, content);
            render_template_response(PostDetailTemplate { view }, StatusCode::OK)
        }
        Ok(None) => render_not_found_response(chrome),
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn subscription_feed(
    State(state): State<HttpState>,
    viewer: Viewer,
    Query(query): Query<PageQuery>,
) -> Response {
    let user = match viewer.require("/follow") {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = LayoutChrome::for_viewer(Some(&user));
    let page = PageNumber::parse(query.page.as_deref());

    match state.feed.subscription_page(Some(&user), page).await {
        Ok(Some(feed_page)) => {
            let content = FeedScreenContext {
                feed: feed_context(&feed_page, "/follow"),
            };
            let view = LayoutContext::new(chrome, "Your subscriptions", content);
            render_template_response(FollowTemplate { view }, StatusCode::OK)
        }
        // The service treats an anonymous viewer as "no feed"; with a
        // required viewer this arm only guards the contract.
        Ok(None) => super::auth::login_redirect("/follow"),
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn follow_author(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(username): Path<String>,
) -> Response {
    let user = match viewer.require(&format!("/profile/{username}/follow")) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.follows.follow(&user, &username).await {
        Ok(_) => Redirect::to(&format!("/profile/{username}")).into_response(),
        Err(FollowError::UnknownAuthor) => {
            render_not_found_response(LayoutChrome::for_viewer(Some(&user)))
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn unfollow_author(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(username): Path<String>,
) -> Response {
    let user = match viewer.require(&format!("/profile/{username}/unfollow")) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.follows.unfollow(&user, &username).await {
        Ok(_) => Redirect::to(&format!("/profile/{username}")).into_response(),
        Err(FollowError::UnknownAuthor) => {
            render_not_found_response(LayoutChrome::for_viewer(Some(&user)))
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.media.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(MediaStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Image not found",
            "The requested image is not available",
        )
        .into_response(),
        Err(MediaStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Image not found",
            "The requested image is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored image"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read stored image",
                err.to_string(),
            )
            .into_response()
        }
    }
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, mime.as_ref())
        .header(CACHE_CONTROL, "public, max-age=31536000, immutable")
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn health(State(state): State<HttpState>) -> Response {
    health_response(state.health.ping().await)
}

fn health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Maintenance path: wipe every cached feed page immediately. Ordinary
/// mutation handlers never call this.
async fn clear_page_cache(State(state): State<HttpState>) -> Response {
    if let Some(cache) = &state.cache {
        cache.pages.clear();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn fallback(viewer: Viewer) -> Response {
    render_not_found_response(LayoutChrome::for_viewer(viewer.user()))
}
