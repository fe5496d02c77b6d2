//! Post mutation handlers: create, edit, comment.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;

use crate::{
    application::error::HttpError,
    application::posts::{
        CommentOutcome, CreateOutcome, EditLoad, EditOutcome, GROUP_UNKNOWN, PostDraft, PostError,
        PostFormErrors,
    },
    domain::entities::UserRecord,
    infra::media::MediaStorageError,
    presentation::views::{
        GroupOption, LayoutChrome, LayoutContext, PostFormContext, PostFormTemplate,
        render_not_found_response, render_template_response,
    },
};

use super::auth::Viewer;
use super::public::{HttpState, post_detail_path};
use super::repo_error_to_http;

/// A multipart submission of the post form, decoded but not yet validated.
#[derive(Debug, Default)]
struct PostFormPayload {
    text: String,
    group_raw: Option<String>,
    image: Option<PendingImage>,
}

#[derive(Debug)]
struct PendingImage {
    filename: String,
    data: Bytes,
}

async fn read_post_form(mut multipart: Multipart) -> Result<PostFormPayload, HttpError> {
    const SOURCE: &str = "infra::http::posts::read_post_form";

    let mut payload = PostFormPayload::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return Err(HttpError::new(
                    SOURCE,
                    StatusCode::BAD_REQUEST,
                    "Malformed form payload",
                    err.to_string(),
                ));
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("text") => {
                payload.text = field.text().await.map_err(|err| {
                    HttpError::new(
                        SOURCE,
                        StatusCode::BAD_REQUEST,
                        "Malformed form payload",
                        err.to_string(),
                    )
                })?;
            }
            Some("group") => {
                let value = field.text().await.map_err(|err| {
                    HttpError::new(
                        SOURCE,
                        StatusCode::BAD_REQUEST,
                        "Malformed form payload",
                        err.to_string(),
                    )
                })?;
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    payload.group_raw = Some(trimmed.to_string());
                }
            }
            Some("image") => {
                let filename = field.file_name().map(str::to_string);
                let data = field.bytes().await.map_err(|err| {
                    HttpError::new(
                        SOURCE,
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "Uploaded image is too large",
                        err.to_string(),
                    )
                })?;
                if let Some(filename) = filename
                    && !data.is_empty()
                {
                    payload.image = Some(PendingImage { filename, data });
                }
            }
            _ => {
                // Drain unknown fields so the stream stays consumable.
                let _ = field.bytes().await;
            }
        }
    }

    Ok(payload)
}

/// A group value that does not parse as an id can never reference an
/// existing group; surface it through the same field error.
fn resolve_group(raw: Option<&str>) -> Result<Option<i64>, PostFormErrors> {
    match raw {
        None => Ok(None),
        Some(raw) => match raw.parse::<i64>() {
            Ok(id) => Ok(Some(id)),
            Err(_) => Err(PostFormErrors {
                group: Some(GROUP_UNKNOWN),
                ..Default::default()
            }),
        },
    }
}

async fn store_image(
    state: &HttpState,
    image: PendingImage,
) -> Result<String, Response> {
    const SOURCE: &str = "infra::http::posts::store_image";

    match state.media.store(&image.filename, image.data).await {
        Ok(stored) => Ok(stored.stored_path),
        Err(MediaStorageError::EmptyPayload) => Err(HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Uploaded image is empty",
            "image field contained no data",
        )
        .into_response()),
        Err(err) => {
            error!(target = SOURCE, error = %err, "failed to store uploaded image");
            Err(HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to store uploaded image",
                err.to_string(),
            )
            .into_response())
        }
    }
}

async fn render_post_form(
    state: &HttpState,
    chrome: LayoutChrome,
    post_id: Option<i64>,
    text_value: &str,
    selected_group: Option<i64>,
    errors: PostFormErrors,
) -> Response {
    const SOURCE: &str = "infra::http::posts::render_post_form";

    let groups = match state.groups.list_all().await {
        Ok(groups) => groups,
        Err(err) => return repo_error_to_http(SOURCE, err).into_response(),
    };

    let content = PostFormContext {
        is_edit: post_id.is_some(),
        post_id,
        text_value: text_value.to_string(),
        groups: groups
            .into_iter()
            .map(|group| GroupOption {
                selected: selected_group == Some(group.id),
                id: group.id,
                title: group.title,
            })
            .collect(),
        text_error: errors.text,
        group_error: errors.group,
    };

    let title = if content.is_edit { "Edit post" } else { "New post" };
    let view = LayoutContext::new(chrome, title, content);
    render_template_response(PostFormTemplate { view }, StatusCode::OK)
}

pub(crate) async fn create_post_form(State(state): State<HttpState>, viewer: Viewer) -> Response {
    let user = match viewer.require("/create") {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = LayoutChrome::for_viewer(Some(&user));

    render_post_form(&state, chrome, None, "", None, PostFormErrors::default()).await
}

pub(crate) async fn create_post_submit(
    State(state): State<HttpState>,
    viewer: Viewer,
    multipart: Multipart,
) -> Response {
    const SOURCE: &str = "infra::http::posts::create_post_submit";

    let user = match viewer.require("/create") {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = LayoutChrome::for_viewer(Some(&user));

    let payload = match read_post_form(multipart).await {
        Ok(payload) => payload,
        Err(err) => return err.into_response(),
    };

    let (group_id, group_errors) = match resolve_group(payload.group_raw.as_deref()) {
        Ok(group_id) => (group_id, PostFormErrors::default()),
        Err(errors) => (None, errors),
    };

    let mut draft = PostDraft {
        text: payload.text.clone(),
        group_id,
        image_path: None,
    };

    let mut errors = match state.posts.validate(&draft).await {
        Ok(errors) => errors,
        Err(err) => return repo_error_to_http(SOURCE, err).into_response(),
    };
    if group_errors.group.is_some() {
        errors.group = group_errors.group;
    }

    if !errors.is_empty() {
        return render_post_form(&state, chrome, None, &payload.text, group_id, errors).await;
    }

    if let Some(image) = payload.image {
        match store_image(&state, image).await {
            Ok(stored_path) => draft.image_path = Some(stored_path),
            Err(response) => return response,
        }
    }

    match state.posts.create_post(&user, draft).await {
        Ok(CreateOutcome::Created(_)) => {
            Redirect::to(&format!("/profile/{}", user.username)).into_response()
        }
        Ok(CreateOutcome::Invalid(errors)) => {
            render_post_form(&state, chrome, None, &payload.text, group_id, errors).await
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub(crate) async fn edit_post_form(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(post_id): Path<String>,
) -> Response {
    let chrome_for_anonymous = LayoutChrome::for_viewer(viewer.user());
    let Some(post_id) = parse_post_id(&post_id) else {
        return render_not_found_response(chrome_for_anonymous);
    };

    let user = match viewer.require(&format!("/posts/{post_id}/edit")) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = LayoutChrome::for_viewer(Some(&user));

    match state.posts.load_for_edit(&user, post_id).await {
        Ok(EditLoad::Editable(post)) => {
            let selected_group = post.group.as_ref().map(|group| group.id);
            render_post_form(
                &state,
                chrome,
                Some(post.id),
                &post.text,
                selected_group,
                PostFormErrors::default(),
            )
            .await
        }
        Ok(EditLoad::Denied { post_id }) => {
            Redirect::to(&post_detail_path(post_id)).into_response()
        }
        Err(PostError::NotFound) => render_not_found_response(chrome),
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub(crate) async fn edit_post_submit(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(post_id): Path<String>,
    multipart: Multipart,
) -> Response {
    const SOURCE: &str = "infra::http::posts::edit_post_submit";

    let chrome_for_anonymous = LayoutChrome::for_viewer(viewer.user());
    let Some(post_id) = parse_post_id(&post_id) else {
        return render_not_found_response(chrome_for_anonymous);
    };

    let user = match viewer.require(&format!("/posts/{post_id}/edit")) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = LayoutChrome::for_viewer(Some(&user));

    // Ownership first: non-authors are redirected without validation,
    // exactly as on the GET path.
    let existing = match state.posts.load_for_edit(&user, post_id).await {
        Ok(EditLoad::Editable(post)) => post,
        Ok(EditLoad::Denied { post_id }) => {
            return Redirect::to(&post_detail_path(post_id)).into_response();
        }
        Err(PostError::NotFound) => return render_not_found_response(chrome),
        Err(err) => return HttpError::from(err).into_response(),
    };

    let payload = match read_post_form(multipart).await {
        Ok(payload) => payload,
        Err(err) => return err.into_response(),
    };

    let (group_id, group_errors) = match resolve_group(payload.group_raw.as_deref()) {
        Ok(group_id) => (group_id, PostFormErrors::default()),
        Err(errors) => (None, errors),
    };

    let mut draft = PostDraft {
        text: payload.text.clone(),
        group_id,
        image_path: None,
    };

    let mut errors = match state.posts.validate(&draft).await {
        Ok(errors) => errors,
        Err(err) => return repo_error_to_http(SOURCE, err).into_response(),
    };
    if group_errors.group.is_some() {
        errors.group = group_errors.group;
    }

    if !errors.is_empty() {
        return render_post_form(&state, chrome, Some(post_id), &payload.text, group_id, errors)
            .await;
    }

    if let Some(image) = payload.image {
        match store_image(&state, image).await {
            Ok(stored_path) => draft.image_path = Some(stored_path),
            Err(response) => return response,
        }
    }

    let replaced_image = draft.image_path.is_some();

    match state.posts.edit_post(&user, post_id, draft).await {
        Ok(EditOutcome::Updated(post)) => {
            // A freshly stored image supersedes the old file on disk.
            if replaced_image
                && let Some(old_path) = existing.image_path
                && post.image_path.as_deref() != Some(old_path.as_str())
                && let Err(err) = state.media.delete(&old_path).await
            {
                error!(
                    target = "infra::http::posts::edit_post_submit",
                    path = %old_path,
                    error = %err,
                    "failed to remove replaced image"
                );
            }
            Redirect::to(&post_detail_path(post.id)).into_response()
        }
        Ok(EditOutcome::Invalid(errors)) => {
            render_post_form(&state, chrome, Some(post_id), &payload.text, group_id, errors).await
        }
        Ok(EditOutcome::Denied { post_id }) => {
            Redirect::to(&post_detail_path(post_id)).into_response()
        }
        Err(PostError::NotFound) => render_not_found_response(chrome),
        Err(err) => HttpError::from(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentForm {
    #[serde(default)]
    text: String,
}

pub(crate) async fn add_comment(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(post_id): Path<String>,
    axum::Form(form): axum::Form<CommentForm>,
) -> Response {
    let chrome = LayoutChrome::for_viewer(viewer.user());
    let Some(post_id) = parse_post_id(&post_id) else {
        return render_not_found_response(chrome);
    };

    let user = match viewer_for_comment(viewer, post_id) {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.posts.add_comment(&user, post_id, &form.text).await {
        // Rejected submissions redirect like successful ones; the detail
        // page simply shows the thread without the comment.
        Ok(CommentOutcome::Created(_)) | Ok(CommentOutcome::Rejected) => {
            Redirect::to(&post_detail_path(post_id)).into_response()
        }
        Err(PostError::NotFound) => {
            render_not_found_response(LayoutChrome::for_viewer(Some(&user)))
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

fn viewer_for_comment(viewer: Viewer, post_id: i64) -> Result<UserRecord, Response> {
    viewer.require(&format!("/posts/{post_id}/comment"))
}

pub(crate) fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}
