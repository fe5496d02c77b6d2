use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::format_description::{FormatItem, well_known::Rfc3339};
use time::macros::format_description;

use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::Page;
use crate::domain::entities::{CommentRecord, PostRecord, UserRecord};

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[month repr:long] [day padding:none], [year]");

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let view = LayoutContext::new(chrome, "Not found", ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// The authenticated identity shown in the navigation bar.
#[derive(Clone)]
pub struct ViewerBadge {
    pub username: String,
}

/// Per-request layout chrome shared by every screen.
#[derive(Clone)]
pub struct LayoutChrome {
    pub viewer: Option<ViewerBadge>,
}

impl LayoutChrome {
    pub fn for_viewer(viewer: Option<&UserRecord>) -> Self {
        Self {
            viewer: viewer.map(|user| ViewerBadge {
                username: user.username.clone(),
            }),
        }
    }
}

pub struct LayoutContext<T> {
    pub viewer: Option<ViewerBadge>,
    pub title: String,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, title: impl Into<String>, content: T) -> Self {
        Self {
            viewer: chrome.viewer,
            title: title.into(),
            content,
        }
    }
}

#[derive(Clone)]
pub struct GroupBadge {
    pub title: String,
    pub slug: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub text: String,
    pub author_username: String,
    pub group: Option<GroupBadge>,
    pub image_path: Option<String>,
    pub published: String,
    pub iso_date: String,
}

pub fn post_card(record: &PostRecord) -> PostCard {
    PostCard {
        id: record.id,
        text: record.text.clone(),
        author_username: record.author_username.clone(),
        group: record.group.as_ref().map(|group| GroupBadge {
            title: group.title.clone(),
            slug: group.slug.clone(),
        }),
        image_path: record.image_path.clone(),
        published: format_human_date(record.created_at),
        iso_date: record
            .created_at
            .format(&Rfc3339)
            .expect("RFC 3339 timestamp"),
    }
}

pub fn format_human_date(moment: time::OffsetDateTime) -> String {
    moment
        .date()
        .format(HUMAN_DATE_FORMAT)
        .expect("valid calendar date")
}

#[derive(Clone)]
pub struct PaginationView {
    pub number: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
    pub previous_page: u32,
    pub next_page: u32,
    pub base_path: String,
}

pub fn pagination_view<T>(page: &Page<T>, base_path: &str) -> PaginationView {
    PaginationView {
        number: page.number,
        total_pages: page.total_pages,
        has_next: page.has_next,
        has_previous: page.has_previous,
        previous_page: page.number.saturating_sub(1).max(1),
        next_page: page.number.saturating_add(1),
        base_path: base_path.to_string(),
    }
}

pub struct FeedContext {
    pub posts: Vec<PostCard>,
    pub total_count: u64,
    pub has_results: bool,
    pub pagination: PaginationView,
}

pub fn feed_context(page: &Page<PostRecord>, base_path: &str) -> FeedContext {
    let posts: Vec<PostCard> = page.items.iter().map(post_card).collect();
    FeedContext {
        has_results: !posts.is_empty(),
        total_count: page.total_items,
        pagination: pagination_view(page, base_path),
        posts,
    }
}

/// Content for screens that are nothing but a feed (index, subscriptions).
pub struct FeedScreenContext {
    pub feed: FeedContext,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<FeedScreenContext>,
}

pub struct GroupContext {
    pub title: String,
    pub description: String,
    pub feed: FeedContext,
}

#[derive(Template)]
#[template(path = "group_list.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupContext>,
}

pub struct ProfileContext {
    pub username: String,
    pub post_total: u64,
    /// `None` while anonymous, otherwise whether the viewer follows this author.
    pub following: Option<bool>,
    pub is_self: bool,
    pub feed: FeedContext,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileContext>,
}

#[derive(Clone)]
pub struct CommentView {
    pub author_username: String,
    pub text: String,
    pub published: String,
}

pub fn comment_view(record: &CommentRecord) -> CommentView {
    CommentView {
        author_username: record.author_username.clone(),
        text: record.text.clone(),
        published: format_human_date(record.created_at),
    }
}

pub struct PostDetailContext {
    pub post: PostCard,
    pub comments: Vec<CommentView>,
    pub can_edit: bool,
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

#[derive(Clone)]
pub struct GroupOption {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormContext {
    pub is_edit: bool,
    pub post_id: Option<i64>,
    pub text_value: String,
    pub groups: Vec<GroupOption>,
    pub text_error: Option<&'static str>,
    pub group_error: Option<&'static str>,
}

#[derive(Template)]
#[template(path = "create_post.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormContext>,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FeedScreenContext>,
}

pub struct LoginContext {
    pub next: String,
    pub failed: bool,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginContext>,
}

pub struct SignupContext {
    pub username_value: String,
    pub username_error: Option<&'static str>,
    pub password_error: Option<&'static str>,
}

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupTemplate {
    pub view: LayoutContext<SignupContext>,
}

pub struct ErrorPageView {
    pub status: u16,
    pub heading: &'static str,
    pub message: &'static str,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            status: 404,
            heading: "Page not found",
            message: "The page you were looking for does not exist.",
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
