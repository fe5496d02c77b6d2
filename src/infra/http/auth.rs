//! Session cookies, the viewer extractor, and the identity screens.

use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts, Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, SET_COOKIE},
        request::Parts,
    },
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    application::auth::{LoginOutcome, SignupErrors, SignupOutcome},
    application::error::HttpError,
    domain::entities::UserRecord,
    presentation::views::{
        LayoutChrome, LayoutContext, LoginContext, LoginTemplate, SignupContext, SignupTemplate,
        render_template_response,
    },
};

use super::public::HttpState;

pub const SESSION_COOKIE: &str = "sid";

/// The optionally-authenticated identity attached to a request.
///
/// Resolution failures degrade to anonymous (with a warning) so a flaky
/// session lookup turns into a login redirect instead of a 500.
pub struct Viewer(pub Option<UserRecord>);

impl Viewer {
    pub fn user(&self) -> Option<&UserRecord> {
        self.0.as_ref()
    }

    /// Demand an authenticated viewer; anonymous requests are redirected to
    /// the login screen with `next` preserving the intended target.
    pub fn require(self, next: &str) -> Result<UserRecord, Response> {
        match self.0 {
            Some(user) => Ok(user),
            None => Err(login_redirect(next)),
        }
    }
}

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
    HttpState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = HttpState::from_ref(state);

        let Some(token) = session_token(&parts.headers) else {
            return Ok(Viewer(None));
        };

        match state.auth.resolve(token).await {
            Ok(viewer) => Ok(Viewer(viewer)),
            Err(err) => {
                warn!(
                    target = "brusio::http::auth",
                    error = %err,
                    "session resolution failed, treating request as anonymous"
                );
                Ok(Viewer(None))
            }
        }
    }
}

/// Redirect to the login screen, preserving the intended destination.
pub fn login_redirect(next: &str) -> Response {
    let encoded: String = url::form_urlencoded::byte_serialize(next.as_bytes()).collect();
    Redirect::to(&format!("/auth/login?next={encoded}")).into_response()
}

pub(crate) fn session_token(headers: &HeaderMap) -> Option<Uuid> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE)
            .then(|| Uuid::parse_str(value.trim()).ok())
            .flatten()
    })
}

fn session_cookie(token: Uuid) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .expect("session cookie is valid header text")
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("sid=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Only same-site path targets are honored; anything else falls back to `/`.
fn safe_next(raw: Option<&str>) -> String {
    match raw {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => "/".to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginForm {
    username: String,
    password: String,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignupForm {
    username: String,
    password: String,
}

fn render_login(
    chrome: LayoutChrome,
    next: String,
    failed: bool,
    status: StatusCode,
) -> Response {
    let view = LayoutContext::new(chrome, "Log in", LoginContext { next, failed });
    render_template_response(LoginTemplate { view }, status)
}

fn render_signup(
    chrome: LayoutChrome,
    username_value: String,
    errors: SignupErrors,
    status: StatusCode,
) -> Response {
    let view = LayoutContext::new(
        chrome,
        "Sign up",
        SignupContext {
            username_value,
            username_error: errors.username,
            password_error: errors.password,
        },
    );
    render_template_response(SignupTemplate { view }, status)
}

pub(crate) async fn login_form(viewer: Viewer, Query(query): Query<NextQuery>) -> Response {
    let chrome = LayoutChrome::for_viewer(viewer.user());
    render_login(
        chrome,
        safe_next(query.next.as_deref()),
        false,
        StatusCode::OK,
    )
}

pub(crate) async fn login_submit(
    State(state): State<HttpState>,
    viewer: Viewer,
    axum::Form(form): axum::Form<LoginForm>,
) -> Response {
    const SOURCE: &str = "infra::http::auth::login_submit";
    let chrome = LayoutChrome::for_viewer(viewer.user());
    let next = safe_next(form.next.as_deref());

    match state.auth.login(&form.username, &form.password).await {
        Ok(LoginOutcome::LoggedIn { session, .. }) => {
            let mut response = Redirect::to(&next).into_response();
            response
                .headers_mut()
                .append(SET_COOKIE, session_cookie(session.token));
            response
        }
        Ok(LoginOutcome::InvalidCredentials) => render_login(chrome, next, true, StatusCode::OK),
        Err(err) => HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        )
        .into_response(),
    }
}

pub(crate) async fn signup_form(viewer: Viewer) -> Response {
    let chrome = LayoutChrome::for_viewer(viewer.user());
    render_signup(chrome, String::new(), SignupErrors::default(), StatusCode::OK)
}

pub(crate) async fn signup_submit(
    State(state): State<HttpState>,
    viewer: Viewer,
    axum::Form(form): axum::Form<SignupForm>,
) -> Response {
    const SOURCE: &str = "infra::http::auth::signup_submit";
    let chrome = LayoutChrome::for_viewer(viewer.user());

    match state.auth.signup(&form.username, &form.password).await {
        Ok(SignupOutcome::Created { session, .. }) => {
            let mut response = Redirect::to("/").into_response();
            response
                .headers_mut()
                .append(SET_COOKIE, session_cookie(session.token));
            response
        }
        Ok(SignupOutcome::Invalid(errors)) => {
            render_signup(chrome, form.username, errors, StatusCode::OK)
        }
        Err(err) => HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        )
        .into_response(),
    }
}

pub(crate) async fn logout(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers)
        && let Err(err) = state.auth.logout(token).await
    {
        warn!(
            target = "brusio::http::auth",
            error = %err,
            "failed to delete session on logout"
        );
    }

    let mut response = Redirect::to("/").into_response();
    response
        .headers_mut()
        .append(SET_COOKIE, clear_session_cookie());
    response
}
