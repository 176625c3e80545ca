//! EventStoreActor - bounded in-memory log of request timing entries
//!
//! The recorder appends serialized timing records here and every attached
//! relay connection drains them. The actor mailbox serializes access, so an
//! append or a take is atomic and each entry is handed out at most once.
//!
//! # Architecture
//!
//! - Owned by the process, injected as `ActorRef<EventStoreMsg>`
//! - FIFO: entries are taken oldest first
//! - Bounded: when full, the oldest pending entry is evicted
//!
//! # Example
//!
//! ```rust,ignore
//! use ractor::Actor;
//!
//! let (store_ref, _handle) = Actor::spawn(
//!     None,
//!     EventStoreActor,
//!     EventStoreArguments::default(),
//! ).await?;
//!
//! record(&store_ref, RequestLog::new(ServerEventKind::MainRequest, &record)?)?;
//! let entries = drain(&store_ref, 100).await?;
//! ```

use std::collections::VecDeque;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use shared_types::{ServerEventKind, TimingRecord};

/// Capacity used when none is configured
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Actor that owns the pending timing log
#[derive(Debug, Default)]
pub struct EventStoreActor;

/// Arguments for spawning EventStoreActor
#[derive(Debug, Clone)]
pub struct EventStoreArguments {
    /// Maximum number of pending entries kept before the oldest is evicted
    pub capacity: usize,
}

impl Default for EventStoreArguments {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// State for EventStoreActor
pub struct EventStoreState {
    pending: VecDeque<RequestLog>,
    capacity: usize,
    recorded: u64,
    dropped: u64,
}

// ============================================================================
// Messages
// ============================================================================

/// Messages handled by EventStoreActor
#[derive(Debug)]
pub enum EventStoreMsg {
    /// Append an entry (fire-and-forget)
    Record { entry: RequestLog },
    /// Remove and return the oldest pending entry
    TakeNext {
        reply: RpcReplyPort<Option<RequestLog>>,
    },
    /// Remove and return up to `limit` pending entries, oldest first
    Drain {
        limit: usize,
        reply: RpcReplyPort<Vec<RequestLog>>,
    },
    /// Counters for health reporting
    Stats { reply: RpcReplyPort<EventStoreStats> },
}

#[async_trait]
impl Actor for EventStoreActor {
    type Msg = EventStoreMsg;
    type State = EventStoreState;
    type Arguments = EventStoreArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let capacity = args.capacity.max(1);
        tracing::info!(
            actor_id = %myself.get_id(),
            capacity,
            "EventStoreActor starting"
        );

        Ok(EventStoreState {
            pending: VecDeque::new(),
            capacity,
            recorded: 0,
            dropped: 0,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            EventStoreMsg::Record { entry } => {
                self.handle_record(entry, state);
            }
            EventStoreMsg::TakeNext { reply } => {
                let _ = reply.send(state.pending.pop_front());
            }
            EventStoreMsg::Drain { limit, reply } => {
                let count = limit.min(state.pending.len());
                let entries = state.pending.drain(..count).collect();
                let _ = reply.send(entries);
            }
            EventStoreMsg::Stats { reply } => {
                let _ = reply.send(EventStoreStats {
                    pending: state.pending.len(),
                    recorded: state.recorded,
                    dropped: state.dropped,
                });
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            pending = state.pending.len(),
            "EventStoreActor stopped"
        );
        Ok(())
    }
}

impl EventStoreActor {
    fn handle_record(&self, entry: RequestLog, state: &mut EventStoreState) {
        if state.pending.len() >= state.capacity {
            state.pending.pop_front();
            state.dropped += 1;
            if state.dropped == 1 || state.dropped % 1000 == 0 {
                tracing::warn!(
                    capacity = state.capacity,
                    dropped = state.dropped,
                    "Event store full; evicting oldest timing entries"
                );
            }
        }
        state.pending.push_back(entry);
        state.recorded += 1;
    }
}

// ============================================================================
// Data Types
// ============================================================================

/// A pending log entry: SSE event name plus the serialized timing record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLog {
    pub event: ServerEventKind,
    pub data: String,
}

impl RequestLog {
    pub fn new(event: ServerEventKind, record: &TimingRecord) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event,
            data: serde_json::to_string(record)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct EventStoreStats {
    pub pending: usize,
    pub recorded: u64,
    pub dropped: u64,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error, Clone)]
pub enum EventStoreError {
    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventStoreError {
    fn from(e: serde_json::Error) -> Self {
        EventStoreError::Serialization(e.to_string())
    }
}

impl From<ractor::RactorErr<EventStoreMsg>> for EventStoreError {
    fn from(e: ractor::RactorErr<EventStoreMsg>) -> Self {
        EventStoreError::Unavailable(e.to_string())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Append an entry without waiting for the actor
pub fn record(store: &ActorRef<EventStoreMsg>, entry: RequestLog) -> Result<(), EventStoreError> {
    store
        .cast(EventStoreMsg::Record { entry })
        .map_err(|e| EventStoreError::Unavailable(e.to_string()))
}

/// Pop the oldest pending entry, `None` when empty
pub async fn take_next(
    store: &ActorRef<EventStoreMsg>,
) -> Result<Option<RequestLog>, EventStoreError> {
    Ok(ractor::call!(store, |reply| EventStoreMsg::TakeNext { reply })?)
}

/// Pop up to `limit` entries, oldest first
pub async fn drain(
    store: &ActorRef<EventStoreMsg>,
    limit: usize,
) -> Result<Vec<RequestLog>, EventStoreError> {
    Ok(ractor::call!(store, |reply| EventStoreMsg::Drain {
        limit,
        reply
    })?)
}

pub async fn stats(store: &ActorRef<EventStoreMsg>) -> Result<EventStoreStats, EventStoreError> {
    Ok(ractor::call!(store, |reply| EventStoreMsg::Stats { reply })?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ractor::Actor;

    fn entry(kind: ServerEventKind, url: &str) -> RequestLog {
        RequestLog::new(
            kind,
            &TimingRecord {
                id: Some("group-1".to_string()),
                url: url.to_string(),
                start_time: 0,
                end_time: 10,
            },
        )
        .unwrap()
    }

    async fn spawn_store(capacity: usize) -> ActorRef<EventStoreMsg> {
        let (store_ref, _handle) =
            Actor::spawn(None, EventStoreActor, EventStoreArguments { capacity })
                .await
                .unwrap();
        store_ref
    }

    #[tokio::test]
    async fn test_take_next_is_fifo_and_signals_empty() {
        let store_ref = spawn_store(DEFAULT_CAPACITY).await;

        record(&store_ref, entry(ServerEventKind::MainRequest, "/a")).unwrap();
        record(&store_ref, entry(ServerEventKind::SubRequest, "query A")).unwrap();

        let first = take_next(&store_ref).await.unwrap().unwrap();
        assert_eq!(first.event, ServerEventKind::MainRequest);
        assert!(first.data.contains("\"/a\""));

        let second = take_next(&store_ref).await.unwrap().unwrap();
        assert_eq!(second.event, ServerEventKind::SubRequest);

        assert!(take_next(&store_ref).await.unwrap().is_none());

        store_ref.stop(None);
    }

    #[tokio::test]
    async fn test_drain_respects_limit_and_order() {
        let store_ref = spawn_store(DEFAULT_CAPACITY).await;

        for i in 0..5 {
            record(
                &store_ref,
                entry(ServerEventKind::MainRequest, &format!("/page/{i}")),
            )
            .unwrap();
        }

        let batch = drain(&store_ref, 3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch[0].data.contains("/page/0"));
        assert!(batch[2].data.contains("/page/2"));

        let rest = drain(&store_ref, 100).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest[0].data.contains("/page/3"));

        assert!(drain(&store_ref, 100).await.unwrap().is_empty());

        store_ref.stop(None);
    }

    #[tokio::test]
    async fn test_full_store_evicts_oldest() {
        let store_ref = spawn_store(2).await;

        record(&store_ref, entry(ServerEventKind::MainRequest, "/old")).unwrap();
        record(&store_ref, entry(ServerEventKind::MainRequest, "/mid")).unwrap();
        record(&store_ref, entry(ServerEventKind::MainRequest, "/new")).unwrap();

        let stats = stats(&store_ref).await.unwrap();
        assert_eq!(
            stats,
            EventStoreStats {
                pending: 2,
                recorded: 3,
                dropped: 1,
            }
        );

        let remaining = drain(&store_ref, 10).await.unwrap();
        assert!(remaining[0].data.contains("/mid"));
        assert!(remaining[1].data.contains("/new"));

        store_ref.stop(None);
    }

    #[tokio::test]
    async fn test_concurrent_drains_deliver_each_entry_once() {
        let store_ref = spawn_store(DEFAULT_CAPACITY).await;

        for i in 0..200 {
            record(
                &store_ref,
                entry(ServerEventKind::SubRequest, &format!("query Q{i}")),
            )
            .unwrap();
        }

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let store = store_ref.clone();
            tasks.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                loop {
                    let batch = drain(&store, 7).await.unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    seen.extend(batch);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for task in tasks {
            all.extend(task.await.unwrap());
        }
        assert_eq!(all.len(), 200);

        let mut urls: Vec<String> = all.into_iter().map(|e| e.data).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 200, "no entry may be delivered twice");

        store_ref.stop(None);
    }

    #[tokio::test]
    async fn test_record_fails_once_store_stopped() {
        let store_ref = spawn_store(DEFAULT_CAPACITY).await;
        store_ref.stop(None);
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let result = record(&store_ref, entry(ServerEventKind::MainRequest, "/late"));
        assert!(matches!(result, Err(EventStoreError::Unavailable(_))));
    }
}
