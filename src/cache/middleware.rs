//! Page cache middleware.
//!
//! Persists successful GET responses as static artifacts. Caching is a side
//! effect: failures are logged and the client receives the response produced
//! by the handler. The one exception is a body that errors while being
//! buffered; it is answered with `500 Internal Server Error`.
//!
//! Routes can override the locale, page type or TTL by inserting a
//! [`CacheContext`] request extension ahead of this layer.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{Method, Request, StatusCode, header::CONTENT_LENGTH, request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use super::{CacheContext, PageCache};

/// Shared state for [`page_cache_layer`].
#[derive(Clone)]
pub struct PageCacheState {
    pub cache: Arc<PageCache>,
}

impl PageCacheState {
    pub fn new(cache: Arc<PageCache>) -> Self {
        Self { cache }
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(state): State<PageCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let ctx = request
        .extensions()
        .get::<CacheContext>()
        .cloned()
        .unwrap_or_else(|| state.cache.context());
    let identity = request_identity(&request);

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let limit = state.cache.config().max_body_bytes;
    if !fits_body_limit(&response, limit) {
        debug!(
            cache = "page",
            outcome = "skipped",
            limit,
            "response body unbounded or larger than cache body limit"
        );
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                cache = "page",
                outcome = "body_error",
                error = %err,
                "failed to buffer response body for caching"
            );
            // The handler's body is partially consumed and cannot be replayed.
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match state
        .cache
        .cache_if_needed(&ctx, &identity, &parts, &bytes)
        .await
    {
        Ok(Some(artifact)) => debug!(
            cache = "page",
            outcome = "stored",
            file = %artifact.file.display(),
            "response cached"
        ),
        Ok(None) => {}
        Err(err) => warn!(
            cache = "page",
            outcome = "error",
            error = %err,
            "failed to cache response"
        ),
    }

    Response::from_parts(parts, Body::from(bytes))
}

/// Method and URI of the request, detached from its body and extensions.
fn request_identity(request: &Request<Body>) -> request::Parts {
    let mut identity = Request::new(());
    *identity.method_mut() = request.method().clone();
    *identity.uri_mut() = request.uri().clone();
    identity.into_parts().0
}

fn declared_length(response: &Response) -> Option<usize> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// Only bodies with a known upper bound within `limit` are buffered, so an
/// oversized stream is never half-consumed.
fn fits_body_limit(response: &Response, limit: usize) -> bool {
    if declared_length(response).is_some_and(|length| length > limit) {
        return false;
    }
    response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|upper| upper <= limit as u64)
}
