//! End-to-end behavior of the HTTP surface over in-memory repositories.

mod support;

use axum::http::StatusCode;
use support::{MultipartForm, body_text, build_app, location, set_cookie_token};

#[tokio::test]
async fn protected_routes_redirect_anonymous_viewers_to_login() {
    let app = build_app(None);

    let response = app.get("/create").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response).as_deref(),
        Some("/auth/login?next=%2Fcreate")
    );

    let follow = app.get("/follow").await;
    assert_eq!(follow.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&follow).as_deref(),
        Some("/auth/login?next=%2Ffollow")
    );
}

#[tokio::test]
async fn signup_then_login_issues_a_working_session() {
    let app = build_app(None);

    let signup = app
        .post_form(
            "/auth/signup",
            None,
            "username=newcomer&password=long-enough-secret",
        )
        .await;
    assert_eq!(signup.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&signup).as_deref(), Some("/"));
    let token = set_cookie_token(&signup).expect("session cookie");

    // The session cookie opens protected screens.
    let form = app.get_as("/create", token).await;
    assert_eq!(form.status(), StatusCode::OK);
    assert!(body_text(form).await.contains("New post"));

    // A fresh login with the same credentials also works.
    let login = app
        .post_form(
            "/auth/login",
            None,
            "username=newcomer&password=long-enough-secret&next=%2Ffollow",
        )
        .await;
    assert_eq!(login.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&login).as_deref(), Some("/follow"));
    assert!(set_cookie_token(&login).is_some());

    let wrong = app
        .post_form("/auth/login", None, "username=newcomer&password=wrong")
        .await;
    assert_eq!(wrong.status(), StatusCode::OK);
    assert!(body_text(wrong).await.contains("Wrong username or password."));
}

#[tokio::test]
async fn create_post_via_multipart_redirects_to_profile() {
    let app = build_app(None);
    let author = app.store.add_user("author");
    let group = app.store.add_group("News", "news", "All the news");
    let token = app.store.open_session(author.id);

    let form = MultipartForm::new()
        .field("text", "shipped from a form")
        .field("group", &group.id.to_string());
    let response = app.post_multipart("/create", Some(token), &form).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response).as_deref(), Some("/profile/author"));
    assert_eq!(app.store.post_count(), 1);

    // The new post shows up on the author's profile and in the group feed.
    let profile = body_text(app.get("/profile/author").await).await;
    assert!(profile.contains("shipped from a form"));

    let group_page = body_text(app.get("/group/news").await).await;
    assert!(group_page.contains("shipped from a form"));
}

#[tokio::test]
async fn create_post_with_image_stores_and_serves_it() {
    let app = build_app(None);
    let author = app.store.add_user("author");
    let token = app.store.open_session(author.id);

    let form = MultipartForm::new()
        .field("text", "post with a picture")
        .image("photo.png", b"png-ish bytes");
    let response = app.post_multipart("/create", Some(token), &form).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let profile = body_text(app.get("/profile/author").await).await;
    let src_start = profile.find("/media/").expect("image tag present");
    let src_rest = &profile[src_start..];
    let src_end = src_rest.find('"').expect("closing quote");
    let media_path = &src_rest[..src_end];

    let image = app.get(media_path).await;
    assert_eq!(image.status(), StatusCode::OK);
    assert_eq!(
        image
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("image/png")
    );
}

#[tokio::test]
async fn blank_create_submission_rerenders_with_field_error() {
    let app = build_app(None);
    let author = app.store.add_user("author");
    let token = app.store.open_session(author.id);

    let form = MultipartForm::new().field("text", "   ");
    let response = app.post_multipart("/create", Some(token), &form).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Enter the post text."));
    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn non_author_edit_redirects_silently_without_mutation() {
    let app = build_app(None);
    let author = app.store.add_user("author");
    let intruder = app.store.add_user("intruder");
    let post_id = app.store.add_post(author.id, None, "untouchable");
    let token = app.store.open_session(intruder.id);

    let form = MultipartForm::new().field("text", "vandalized");
    let response = app
        .post_multipart(&format!("/posts/{post_id}/edit"), Some(token), &form)
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response).as_deref(),
        Some(format!("/posts/{post_id}").as_str())
    );
    assert_eq!(app.store.post_text(post_id).as_deref(), Some("untouchable"));

    // The edit form itself is also off limits.
    let form_page = app
        .get_as(&format!("/posts/{post_id}/edit"), token)
        .await;
    assert_eq!(form_page.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn comments_redirect_to_the_post_either_way() {
    let app = build_app(None);
    let author = app.store.add_user("author");
    let commenter = app.store.add_user("commenter");
    let post_id = app.store.add_post(author.id, None, "comment on me");
    let token = app.store.open_session(commenter.id);

    let created = app
        .post_form(
            &format!("/posts/{post_id}/comment"),
            Some(token),
            "text=nice+post",
        )
        .await;
    assert_eq!(created.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&created).as_deref(),
        Some(format!("/posts/{post_id}").as_str())
    );

    // A blank comment takes the same redirect but writes nothing.
    let blank = app
        .post_form(&format!("/posts/{post_id}/comment"), Some(token), "text=")
        .await;
    assert_eq!(blank.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.comment_count(), 1);

    let detail = body_text(app.get(&format!("/posts/{post_id}")).await).await;
    assert!(detail.contains("nice post"));
    assert!(detail.contains("commenter"));
}

#[tokio::test]
async fn follow_and_unfollow_redirect_to_the_profile() {
    let app = build_app(None);
    let fan = app.store.add_user("fan");
    let idol = app.store.add_user("idol");
    let token = app.store.open_session(fan.id);

    let follow = app.get_as("/profile/idol/follow", token).await;
    assert_eq!(follow.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&follow).as_deref(), Some("/profile/idol"));
    assert_eq!(app.store.follow_count(fan.id, idol.id), 1);

    // Repeating the follow is a no-op, not an error.
    let again = app.get_as("/profile/idol/follow", token).await;
    assert_eq!(again.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.follow_count(fan.id, idol.id), 1);

    let unfollow = app.get_as("/profile/idol/unfollow", token).await;
    assert_eq!(unfollow.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.follow_count(fan.id, idol.id), 0);
}

#[tokio::test]
async fn unknown_resources_render_not_found() {
    let app = build_app(None);
    app.store.add_user("existing");

    for path in [
        "/group/no-such-group",
        "/profile/no-such-user",
        "/posts/99999",
        "/posts/not-a-number",
        "/definitely/not/a/route",
    ] {
        let response = app.get(path).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "path {path}");
        assert!(body_text(response).await.contains("Page not found"));
    }
}

#[tokio::test]
async fn profile_shows_follow_state_for_the_viewer() {
    let app = build_app(None);
    let fan = app.store.add_user("fan");
    let idol = app.store.add_user("idol");
    app.store.add_post(idol.id, None, "idol content");
    let token = app.store.open_session(fan.id);

    let before = body_text(app.get_as("/profile/idol", token).await).await;
    assert!(before.contains("/profile/idol/follow"));

    app.store.add_follow(fan.id, idol.id);

    let after = body_text(app.get_as("/profile/idol", token).await).await;
    assert!(after.contains("/profile/idol/unfollow"));

    // Anonymous viewers see neither control.
    let anonymous = body_text(app.get("/profile/idol").await).await;
    assert!(!anonymous.contains("/profile/idol/follow\""));
}

#[tokio::test]
async fn health_probe_reports_no_content() {
    let app = build_app(None);
    let response = app.get("/_health/db").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
