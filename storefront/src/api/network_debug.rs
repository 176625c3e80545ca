//! Network debug relay
//!
//! `GET /server-network-debug` streams pending timing entries to the browser
//! as Server-Sent Events. Each connection polls the EventStore on its own
//! interval; an entry taken by one connection is never seen by another.
//! Streams end when the server starts shutting down.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream, StreamExt};
use ractor::ActorRef;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::{ApiError, ApiState};
use crate::actors::event_store::{self, EventStoreMsg, RequestLog};

/// Logs the connection's lifetime; dropped together with the stream.
struct RelayConnection {
    id: uuid::Uuid,
    delivered: u64,
}

impl RelayConnection {
    fn open() -> Self {
        let id = uuid::Uuid::new_v4();
        tracing::info!(connection_id = %id, "Network debug client connected");
        Self { id, delivered: 0 }
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        tracing::info!(
            connection_id = %self.id,
            delivered = self.delivered,
            "Network debug client disconnected"
        );
    }
}

pub async fn network_debug_stream(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let config = state.app_state.config();
    if !config.network_debug.enabled {
        return Err(ApiError::NotFound);
    }
    if !origin_allowed(&headers, &config.allowed_origins) {
        let origin = headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        tracing::warn!(origin = %origin, "Rejected network debug connection from foreign origin");
        return Err(ApiError::Forbidden(origin));
    }

    let events = relay_entries(
        state.app_state.event_store(),
        config.network_debug.poll_interval,
        config.network_debug.batch_limit,
        state.app_state.shutdown_receiver(),
    )
    .map(|entry| Ok(to_sse_event(entry)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Entries drained from the store every `poll_interval` until `shutdown`
/// turns true or its sender is dropped.
///
/// A failed drain is logged and the tick yields nothing.
pub fn relay_entries(
    store: ActorRef<EventStoreMsg>,
    poll_interval: Duration,
    batch_limit: usize,
    mut shutdown: watch::Receiver<bool>,
) -> impl Stream<Item = RequestLog> {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold(
        (ticker, store, RelayConnection::open()),
        move |(mut ticker, store, mut connection)| async move {
            ticker.tick().await;
            let batch = match event_store::drain(&store, batch_limit).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %connection.id,
                        error = %e,
                        "Failed to drain event store"
                    );
                    Vec::new()
                }
            };
            connection.delivered += batch.len() as u64;
            Some((batch, (ticker, store, connection)))
        },
    )
    .flat_map(stream::iter)
    .take_until(async move {
        let _ = shutdown.wait_for(|stopping| *stopping).await;
    })
}

pub fn to_sse_event(entry: RequestLog) -> Event {
    Event::default().event(entry.event.as_str()).data(entry.data)
}

/// No `Origin`, a configured origin, or the server's own host.
pub fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
        return true;
    };
    let origin = origin.trim_end_matches('/');

    if allowed
        .iter()
        .any(|a| a.trim_end_matches('/').eq_ignore_ascii_case(origin))
    {
        return true;
    }

    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    match (origin_authority(origin), host) {
        (Some(authority), Some(host)) => authority.eq_ignore_ascii_case(host),
        _ => false,
    }
}

fn origin_authority(origin: &str) -> Option<String> {
    let parsed = url::Url::parse(origin).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::event_store::{record, EventStoreActor, EventStoreArguments};
    use axum::http::HeaderValue;
    use ractor::Actor;
    use shared_types::{ServerEventKind, TimingRecord};

    fn headers(origin: Option<&'static str>, host: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(origin) = origin {
            headers.insert(header::ORIGIN, HeaderValue::from_static(origin));
        }
        if let Some(host) = host {
            headers.insert(header::HOST, HeaderValue::from_static(host));
        }
        headers
    }

    #[test]
    fn test_origin_policy() {
        let allowed = vec!["http://localhost:3000".to_string()];

        assert!(origin_allowed(&headers(None, Some("shop.test")), &allowed));
        assert!(origin_allowed(
            &headers(Some("http://localhost:3000"), Some("api.test")),
            &allowed
        ));
        assert!(origin_allowed(
            &headers(Some("https://shop.test:8443"), Some("shop.test:8443")),
            &allowed
        ));
        assert!(origin_allowed(
            &headers(Some("https://shop.test"), Some("shop.test")),
            &allowed
        ));
        assert!(!origin_allowed(
            &headers(Some("https://evil.test"), Some("shop.test")),
            &allowed
        ));
        assert!(!origin_allowed(&headers(Some("null"), None), &allowed));
    }

    #[tokio::test]
    async fn test_relay_entries_drain_in_order_across_ticks() {
        let (store_ref, _handle) =
            Actor::spawn(None, EventStoreActor, EventStoreArguments::default())
                .await
                .unwrap();

        let main = TimingRecord {
            id: Some("1".to_string()),
            url: "/".to_string(),
            start_time: 0,
            end_time: 50,
        };
        let sub = TimingRecord {
            id: Some("1".to_string()),
            url: "query GetProduct".to_string(),
            start_time: 10,
            end_time: 40,
        };
        record(
            &store_ref,
            RequestLog::new(ServerEventKind::MainRequest, &main).unwrap(),
        )
        .unwrap();
        record(
            &store_ref,
            RequestLog::new(ServerEventKind::SubRequest, &sub).unwrap(),
        )
        .unwrap();

        // batch limit of one forces the second entry onto a later tick
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let entries = relay_entries(store_ref.clone(), Duration::from_millis(10), 1, shutdown_rx);
        let entries: Vec<RequestLog> = tokio::time::timeout(
            Duration::from_secs(2),
            entries.take(2).collect::<Vec<_>>(),
        )
        .await
        .unwrap();

        assert_eq!(entries[0].event, ServerEventKind::MainRequest);
        assert_eq!(entries[1].event, ServerEventKind::SubRequest);
        let parsed: TimingRecord = serde_json::from_str(&entries[1].data).unwrap();
        assert_eq!(parsed, sub);

        store_ref.stop(None);
    }

    #[tokio::test]
    async fn test_relay_survives_stopped_store() {
        let (store_ref, _handle) =
            Actor::spawn(None, EventStoreActor, EventStoreArguments::default())
                .await
                .unwrap();
        store_ref.stop(None);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut entries = Box::pin(relay_entries(
            store_ref,
            Duration::from_millis(5),
            10,
            shutdown_rx,
        ));
        let next = tokio::time::timeout(Duration::from_millis(100), entries.next()).await;
        assert!(next.is_err(), "stream stays open and yields nothing");
    }

    #[tokio::test]
    async fn test_relay_ends_on_shutdown() {
        let (store_ref, _handle) =
            Actor::spawn(None, EventStoreActor, EventStoreArguments::default())
                .await
                .unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut entries = Box::pin(relay_entries(
            store_ref.clone(),
            Duration::from_millis(10),
            10,
            shutdown_rx,
        ));

        let idle = tokio::time::timeout(Duration::from_millis(50), entries.next()).await;
        assert!(idle.is_err(), "open while the server runs");

        shutdown_tx.send_replace(true);
        let end = tokio::time::timeout(Duration::from_secs(1), entries.next())
            .await
            .expect("stream finishes promptly after shutdown");
        assert!(end.is_none());

        store_ref.stop(None);
    }
}
