//! Shared types between the storefront server and the network debug UI
//!
//! These types are used by both:
//! - the storefront server (native Rust), which records and relays them
//! - the Dioxus network view (WASM), which aggregates and charts them
//!
//! Serializable with serde for JSON over Server-Sent Events.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Constants
// ============================================================================

/// Relay endpoint streaming timing events to the debug view
pub const NETWORK_DEBUG_PATH: &str = "/server-network-debug";

/// Route the network debug view is served from
pub const NETWORK_VIEW_PATH: &str = "/network";

/// Header carrying the correlation id shared by a main request and its sub-requests
pub const REQUEST_GROUP_ID_HEADER: &str = "Custom-Storefront-Request-Group-ID";

/// Header browsers set on speculative navigations
pub const PURPOSE_HEADER: &str = "purpose";

pub const PURPOSE_PREFETCH: &str = "prefetch";

/// Prepended to display URLs of prefetch traffic
pub const PREFETCH_PREFIX: &str = "(prefetch) ";

/// SSE event names
pub const EVENT_MAIN_REQUEST: &str = "Request";
pub const EVENT_SUB_REQUEST: &str = "Sub request";

// ============================================================================
// Timing Records
// ============================================================================

/// Timing of one main request or sub-request, in epoch milliseconds.
///
/// Records are immutable once emitted. `end_time >= start_time` holds for
/// records produced by the recorder; records parsed off the wire are not
/// re-validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TimingRecord {
    /// Correlation id; `None` when the request group could not be recovered
    pub id: Option<String>,
    pub url: String,
    #[ts(type = "number")]
    pub start_time: i64,
    #[ts(type = "number")]
    pub end_time: i64,
}

impl TimingRecord {
    pub fn duration(&self) -> i64 {
        self.end_time - self.start_time
    }
}

/// Which stream a timing record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ServerEventKind {
    #[serde(rename = "Request")]
    MainRequest,
    #[serde(rename = "Sub request")]
    SubRequest,
}

impl ServerEventKind {
    /// SSE event name for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerEventKind::MainRequest => EVENT_MAIN_REQUEST,
            ServerEventKind::SubRequest => EVENT_SUB_REQUEST,
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            EVENT_MAIN_REQUEST => Some(ServerEventKind::MainRequest),
            EVENT_SUB_REQUEST => Some(ServerEventKind::SubRequest),
            _ => None,
        }
    }

    pub fn all() -> [ServerEventKind; 2] {
        [ServerEventKind::MainRequest, ServerEventKind::SubRequest]
    }
}

impl std::fmt::Display for ServerEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed timing event as delivered over the push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    MainRequest(TimingRecord),
    SubRequest(TimingRecord),
}

impl ServerEvent {
    pub fn new(kind: ServerEventKind, record: TimingRecord) -> Self {
        match kind {
            ServerEventKind::MainRequest => ServerEvent::MainRequest(record),
            ServerEventKind::SubRequest => ServerEvent::SubRequest(record),
        }
    }

    /// Parse an SSE `(event, data)` pair.
    pub fn parse(event_name: &str, data: &str) -> Result<Self, ServerEventError> {
        let kind = ServerEventKind::from_event_name(event_name)
            .ok_or_else(|| ServerEventError::UnknownEvent(event_name.to_string()))?;
        let record = serde_json::from_str::<TimingRecord>(data)
            .map_err(|e| ServerEventError::MalformedPayload(e.to_string()))?;
        Ok(Self::new(kind, record))
    }

    pub fn kind(&self) -> ServerEventKind {
        match self {
            ServerEvent::MainRequest(_) => ServerEventKind::MainRequest,
            ServerEvent::SubRequest(_) => ServerEventKind::SubRequest,
        }
    }

    pub fn record(&self) -> &TimingRecord {
        match self {
            ServerEvent::MainRequest(record) | ServerEvent::SubRequest(record) => record,
        }
    }

    pub fn into_record(self) -> TimingRecord {
        match self {
            ServerEvent::MainRequest(record) | ServerEvent::SubRequest(record) => record,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerEventError {
    #[error("Unknown event name: {0}")]
    UnknownEvent(String),

    #[error("Malformed timing payload: {0}")]
    MalformedPayload(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ts_rs::Config;

    #[test]
    fn test_timing_record_uses_camel_case_wire_format() {
        let record = TimingRecord {
            id: Some("group-1".to_string()),
            url: "/products/shoe".to_string(),
            start_time: 1_000,
            end_time: 1_250,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "group-1",
                "url": "/products/shoe",
                "startTime": 1000,
                "endTime": 1250,
            })
        );
    }

    #[test]
    fn test_missing_correlation_id_serializes_as_null() {
        let record = TimingRecord {
            id: None,
            url: "query".to_string(),
            start_time: 5,
            end_time: 6,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"id\":null"));
    }

    #[test]
    fn test_parse_named_events() {
        let data = r#"{"id":"1","url":"/","startTime":0,"endTime":50}"#;

        let main = ServerEvent::parse("Request", data).unwrap();
        assert_eq!(main.kind(), ServerEventKind::MainRequest);
        assert_eq!(main.record().duration(), 50);

        let sub = ServerEvent::parse("Sub request", data).unwrap();
        assert_eq!(sub.kind(), ServerEventKind::SubRequest);
    }

    #[test]
    fn test_parse_rejects_unknown_event_and_bad_payload() {
        assert_eq!(
            ServerEvent::parse("message", "{}"),
            Err(ServerEventError::UnknownEvent("message".to_string()))
        );

        let missing_end = r#"{"id":"1","url":"/","startTime":0}"#;
        assert!(matches!(
            ServerEvent::parse("Request", missing_end),
            Err(ServerEventError::MalformedPayload(_))
        ));
        assert!(matches!(
            ServerEvent::parse("Request", "not json"),
            Err(ServerEventError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_event_kind_names_round_trip() {
        for kind in ServerEventKind::all() {
            assert_eq!(ServerEventKind::from_event_name(kind.as_str()), Some(kind));
        }
        assert_eq!(
            serde_json::to_string(&ServerEventKind::SubRequest).unwrap(),
            "\"Sub request\""
        );
    }

    #[test]
    fn export_types() {
        // The export attribute on each type writes into the default bindings dir
        let config = Config::default();
        TimingRecord::export(&config).unwrap();
        ServerEventKind::export(&config).unwrap();
    }
}
