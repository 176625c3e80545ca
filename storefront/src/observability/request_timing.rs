//! Request Timing Module
//!
//! Records timing for the main document request and for every Storefront API
//! sub-request issued while rendering it. Records land in the EventStore and
//! are streamed to the network debug view by the relay.
//!
//! # Event Contract
//!
//! - `Request` - one per main request, `url` is the display URL
//! - `Sub request` - one per data fetch, `url` is the query label
//!
//! Both share the correlation id carried in `Custom-Storefront-Request-Group-ID`.
//!
//! # Clock Policy
//!
//! `endTime` is captured when the record is built. If the wall clock stepped
//! behind the caller-supplied `startTime`, the duration is clamped to zero.

use std::sync::OnceLock;

use axum::http::{HeaderMap, HeaderName, StatusCode};
use ractor::ActorRef;
use regex::Regex;
use shared_types::{ServerEventKind, TimingRecord, PREFETCH_PREFIX, PURPOSE_PREFETCH};

use crate::actors::event_store::{self, EventStoreMsg, RequestLog};

/// Lowercase form of `shared_types::REQUEST_GROUP_ID_HEADER`
pub const REQUEST_GROUP_ID: HeaderName =
    HeaderName::from_static("custom-storefront-request-group-id");

pub const PURPOSE: HeaderName = HeaderName::from_static("purpose");

/// Label used when a sub-request's query text carries no operation name
pub const FALLBACK_QUERY_LABEL: &str = "query";

static QUERY_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn query_name_re() -> &'static Regex {
    QUERY_NAME_RE.get_or_init(|| Regex::new(r"query \w*").expect("static regex"))
}

/// Main request as seen by the rendering pipeline
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Absolute or origin-relative request URL
    pub url: String,
    pub headers: HeaderMap,
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn is_prefetch(headers: &HeaderMap) -> bool {
    headers
        .get(PURPOSE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == PURPOSE_PREFETCH)
        .unwrap_or(false)
}

pub fn correlation_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_GROUP_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Strip scheme and host from absolute URLs; relative URLs pass through.
pub fn strip_origin(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) if parsed.has_host() => {
            let mut out = parsed.path().to_string();
            if let Some(query) = parsed.query() {
                out.push('?');
                out.push_str(query);
            }
            if let Some(fragment) = parsed.fragment() {
                out.push('#');
                out.push_str(fragment);
            }
            out
        }
        _ => url.to_string(),
    }
}

fn with_prefetch_prefix(label: String, headers: &HeaderMap) -> String {
    if is_prefetch(headers) {
        format!("{PREFETCH_PREFIX}{label}")
    } else {
        label
    }
}

/// Display URL for a main request
pub fn display_url(info: &RequestInfo) -> String {
    with_prefetch_prefix(strip_origin(&info.url), &info.headers)
}

/// First `query <name>` token of a GraphQL document, or `"query"`.
pub fn sub_request_label(query: &str) -> String {
    query_name_re()
        .find(query)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| FALLBACK_QUERY_LABEL.to_string())
}

/// Completion time that never precedes `start_time`
pub fn finalize_end_time(start_time: i64, now: i64) -> i64 {
    if now < start_time {
        tracing::debug!(
            start_time,
            now,
            "Clock behind request start; clamping duration to zero"
        );
        start_time
    } else {
        now
    }
}

pub fn build_main_record(
    info: &RequestInfo,
    correlation_id: Option<&str>,
    start_time: i64,
    now: i64,
) -> TimingRecord {
    TimingRecord {
        id: correlation_id.map(ToString::to_string),
        url: display_url(info),
        start_time,
        end_time: finalize_end_time(start_time, now),
    }
}

pub fn build_sub_record(
    query: &str,
    request_headers: &HeaderMap,
    start_time: i64,
    now: i64,
) -> TimingRecord {
    TimingRecord {
        id: correlation_id(request_headers),
        url: with_prefetch_prefix(sub_request_label(query), request_headers),
        start_time,
        end_time: finalize_end_time(start_time, now),
    }
}

/// Instrumentation hooks called by the rendering pipeline and the data layer.
///
/// Both hooks are synchronous: they finalize the record and cast it into the
/// EventStore without waiting. A store that has gone away is logged and the
/// record is dropped.
#[derive(Clone)]
pub struct RequestRecorder {
    store: ActorRef<EventStoreMsg>,
}

impl RequestRecorder {
    pub fn new(store: ActorRef<EventStoreMsg>) -> Self {
        Self { store }
    }

    pub fn record_main_request(
        &self,
        info: &RequestInfo,
        correlation_id: Option<&str>,
        start_time: i64,
    ) -> TimingRecord {
        let record = build_main_record(info, correlation_id, start_time, now_millis());
        self.emit(ServerEventKind::MainRequest, &record);
        record
    }

    pub fn record_sub_request(
        &self,
        query: &str,
        request_headers: &HeaderMap,
        response_status: StatusCode,
        start_time: i64,
    ) -> TimingRecord {
        let record = build_sub_record(query, request_headers, start_time, now_millis());
        if record.id.is_none() {
            tracing::debug!(
                label = %record.url,
                "Sub-request without request group id; it cannot be attributed to a page"
            );
        }
        tracing::debug!(
            label = %record.url,
            status = %response_status,
            duration_ms = record.duration(),
            "Sub-request recorded"
        );
        self.emit(ServerEventKind::SubRequest, &record);
        record
    }

    fn emit(&self, kind: ServerEventKind, record: &TimingRecord) {
        let entry = match RequestLog::new(kind, record) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, event = %kind, "Failed to serialize timing record");
                return;
            }
        };
        if let Err(e) = event_store::record(&self.store, entry) {
            tracing::warn!(error = %e, event = %kind, "Dropping timing record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::event_store::{drain, EventStoreActor, EventStoreArguments};
    use axum::http::HeaderValue;
    use proptest::prelude::*;
    use ractor::Actor;

    fn prefetch_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(PURPOSE, HeaderValue::from_static("prefetch"));
        headers
    }

    #[test]
    fn test_group_header_constant_matches_shared_name() {
        assert_eq!(
            REQUEST_GROUP_ID.as_str(),
            shared_types::REQUEST_GROUP_ID_HEADER.to_ascii_lowercase()
        );
        assert_eq!(PURPOSE.as_str(), shared_types::PURPOSE_HEADER);
    }

    #[test]
    fn test_prefetch_prefix_applied_only_for_prefetch_purpose() {
        let prefetch = RequestInfo {
            url: "https://shop.example.com/products/shoe?variant=2".to_string(),
            headers: prefetch_headers(),
        };
        assert_eq!(
            display_url(&prefetch),
            "(prefetch) /products/shoe?variant=2"
        );

        let normal = RequestInfo {
            url: "https://shop.example.com/products/shoe".to_string(),
            headers: HeaderMap::new(),
        };
        let url = display_url(&normal);
        assert!(!url.starts_with(PREFETCH_PREFIX));
        assert_eq!(url, "/products/shoe");

        let mut other_purpose = HeaderMap::new();
        other_purpose.insert(PURPOSE, HeaderValue::from_static("navigate"));
        let other = RequestInfo {
            url: "/collections".to_string(),
            headers: other_purpose,
        };
        assert_eq!(display_url(&other), "/collections");
    }

    #[test]
    fn test_sub_request_label_extraction() {
        assert_eq!(
            sub_request_label("query GetProduct($handle: String!) { product { id } }"),
            "query GetProduct"
        );
        assert_eq!(
            sub_request_label("#graphql\n  query Layout { shop { name } }"),
            "query Layout"
        );
        assert_eq!(sub_request_label("{ shop { name } }"), "query");
        assert_eq!(sub_request_label("mutation CartCreate { x }"), "query");
    }

    #[test]
    fn test_sub_record_uses_own_headers() {
        let mut headers = prefetch_headers();
        headers.insert(REQUEST_GROUP_ID, HeaderValue::from_static("abc"));

        let record = build_sub_record("query GetProduct { p }", &headers, 10, 40);
        assert_eq!(record.id.as_deref(), Some("abc"));
        assert_eq!(record.url, "(prefetch) query GetProduct");
        assert_eq!(record.duration(), 30);

        let orphan = build_sub_record("query Menu { m }", &HeaderMap::new(), 10, 40);
        assert_eq!(orphan.id, None);
        assert_eq!(orphan.url, "query Menu");
    }

    #[test]
    fn test_backwards_clock_clamps_to_zero_duration() {
        let info = RequestInfo {
            url: "/".to_string(),
            headers: HeaderMap::new(),
        };
        let record = build_main_record(&info, Some("1"), 500, 400);
        assert_eq!(record.end_time, 500);
        assert_eq!(record.duration(), 0);
    }

    proptest! {
        #[test]
        fn prop_main_record_end_never_precedes_start(
            start in 0i64..4_000_000_000_000,
            elapsed in -10_000i64..10_000_000,
        ) {
            let info = RequestInfo { url: "/".to_string(), headers: HeaderMap::new() };
            let record = build_main_record(&info, None, start, start + elapsed);
            prop_assert!(record.end_time >= record.start_time);
            prop_assert_eq!(record.start_time, start);
        }
    }

    #[tokio::test]
    async fn test_recorder_emits_typed_entries_into_store() {
        let (store_ref, _handle) =
            Actor::spawn(None, EventStoreActor, EventStoreArguments::default())
                .await
                .unwrap();
        let recorder = RequestRecorder::new(store_ref.clone());

        let start = now_millis();
        let info = RequestInfo {
            url: "http://localhost:8080/products/hat".to_string(),
            headers: HeaderMap::new(),
        };
        let main = recorder.record_main_request(&info, Some("group-7"), start);
        assert!(main.end_time >= start);

        let mut sub_headers = HeaderMap::new();
        sub_headers.insert(REQUEST_GROUP_ID, HeaderValue::from_static("group-7"));
        recorder.record_sub_request(
            "query GetProduct { product { id } }",
            &sub_headers,
            StatusCode::OK,
            start,
        );

        let entries = drain(&store_ref, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, ServerEventKind::MainRequest);
        assert_eq!(entries[1].event, ServerEventKind::SubRequest);

        let parsed: TimingRecord = serde_json::from_str(&entries[0].data).unwrap();
        assert_eq!(parsed, main);
        assert_eq!(parsed.url, "/products/hat");

        let sub: TimingRecord = serde_json::from_str(&entries[1].data).unwrap();
        assert_eq!(sub.id.as_deref(), Some("group-7"));
        assert_eq!(sub.url, "query GetProduct");

        store_ref.stop(None);
    }
}
