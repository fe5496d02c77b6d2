//! Response cache middleware for the global feed route.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

use crate::application::pagination::PageNumber;

use super::keys::{PageKey, page_param};
use super::store::{CachedPage, PageCache};

const MAX_CACHED_BODY_BYTES: usize = 1024 * 1024;

/// Shared cache state injected into the router.
#[derive(Clone)]
pub struct CacheState {
    pub pages: Arc<PageCache>,
}

/// Serve `GET /` from the page cache when a fresh entry exists; otherwise
/// run the handler and store successful responses.
///
/// The key is the normalized page number, so every spelling of "page 1"
/// shares one entry.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.pages.config().enabled {
        return next.run(request).await;
    }

    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let query = request.uri().query().unwrap_or("");
    let page = PageNumber::parse(page_param(query).as_deref());
    let key = PageKey::index(page.get());

    if let Some(cached) = cache.pages.get(&key) {
        debug!(cache = "pages", outcome = "hit", page = page.get(), "serving cached feed page");
        return build_response(cached);
    }

    debug!(cache = "pages", outcome = "miss", page = page.get(), "rendering feed page");

    let response = next.run(request).await;

    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let cached = CachedPage::new(
        parts.status.as_u16(),
        parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect(),
        bytes.clone(),
    );
    cache.pages.set(key, cached);

    Response::from_parts(parts, Body::from(bytes))
}

fn build_response(cached: CachedPage) -> Response {
    use axum::http::HeaderValue;

    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
