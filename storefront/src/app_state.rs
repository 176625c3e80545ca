use ractor::{Actor, ActorRef};
use std::sync::Arc;
use tokio::sync::watch;

use crate::actors::event_store::{EventStoreActor, EventStoreArguments, EventStoreMsg};
use crate::config::Config;
use crate::observability::request_timing::RequestRecorder;
use crate::storefront_client::StorefrontClient;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    event_store: ActorRef<EventStoreMsg>,
    recorder: RequestRecorder,
    storefront: StorefrontClient,
    config: Config,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(event_store: ActorRef<EventStoreMsg>, config: Config) -> Self {
        let recorder = RequestRecorder::new(event_store.clone());
        let storefront = StorefrontClient::new(
            config.storefront_api_url.clone(),
            config.storefront_api_token.clone(),
            recorder.clone(),
        );
        Self {
            inner: Arc::new(AppStateInner {
                event_store,
                recorder,
                storefront,
                config,
                shutdown: watch::Sender::new(false),
            }),
        }
    }

    /// Spawn the EventStoreActor sized from `config` and wire everything to it.
    pub async fn spawn(config: Config) -> Result<Self, String> {
        let (event_store, _handle) = Actor::spawn(
            Some(format!("event_store:{}", uuid::Uuid::new_v4())),
            EventStoreActor,
            EventStoreArguments {
                capacity: config.event_store_capacity,
            },
        )
        .await
        .map_err(|e| e.to_string())?;

        Ok(Self::new(event_store, config))
    }

    pub fn event_store(&self) -> ActorRef<EventStoreMsg> {
        self.inner.event_store.clone()
    }

    pub fn recorder(&self) -> &RequestRecorder {
        &self.inner.recorder
    }

    pub fn storefront(&self) -> &StorefrontClient {
        &self.inner.storefront
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Tell long-lived streams to finish so the server can drain.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }

    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }
}
