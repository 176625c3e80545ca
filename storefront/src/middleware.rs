use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use shared_types::NETWORK_DEBUG_PATH;

use crate::api::ApiState;
use crate::observability::request_timing::{
    correlation_id, is_prefetch, now_millis, RequestInfo, REQUEST_GROUP_ID,
};
use crate::storefront_client::SubRequestContext;

/// Correlation id of the main request being served, shared with its sub-requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestGroupId(pub String);

impl RequestGroupId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sub-request context for handlers: group id from the middleware plus the
/// page's own prefetch flag.
pub fn sub_request_context(
    group: Option<&RequestGroupId>,
    headers: &axum::http::HeaderMap,
) -> SubRequestContext {
    SubRequestContext {
        request_group_id: group.map(|g| g.0.clone()),
        prefetch: is_prefetch(headers),
    }
}

/// Middleware: time every main request and record it once the inner
/// service has produced a response.
///
/// Reuses an incoming request group id when present, otherwise mints one.
/// The relay endpoint itself is never recorded.
pub async fn request_timing(
    State(state): State<ApiState>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == NETWORK_DEBUG_PATH {
        return next.run(req).await;
    }

    let start_time = now_millis();
    let group_id =
        correlation_id(req.headers()).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestGroupId(group_id.clone()));

    let info = RequestInfo {
        url: absolute_url(&req),
        headers: req.headers().clone(),
    };

    let mut response = next.run(req).await;

    let record = state
        .app_state
        .recorder()
        .record_main_request(&info, Some(&group_id), start_time);
    tracing::debug!(
        url = %record.url,
        status = %response.status(),
        ttfb_ms = record.duration(),
        "Main request recorded"
    );

    if let Ok(value) = HeaderValue::from_str(&group_id) {
        response.headers_mut().insert(REQUEST_GROUP_ID, value);
    }
    response
}

fn absolute_url(req: &Request) -> String {
    let uri = req.uri();
    if uri.scheme().is_some() {
        return uri.to_string();
    }

    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    match req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
    {
        Some(host) => format!("http://{host}{path}"),
        None => path.to_string(),
    }
}
