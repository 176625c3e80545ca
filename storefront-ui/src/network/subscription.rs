use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use shared_types::{ServerEvent, ServerEventError, ServerEventKind};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, EventSource, EventSourceInit, MessageEvent};

pub type SubscriptionItem = Result<ServerEvent, ServerEventError>;

/// Credentialed `EventSource` on the relay endpoint, exposed as a stream of
/// typed events.
///
/// Dropping the subscription removes its listeners and closes the source.
/// While it is alive the browser reconnects on its own after a drop.
pub struct NetworkSubscription {
    source: EventSource,
    listeners: Vec<(ServerEventKind, Closure<dyn FnMut(MessageEvent)>)>,
    _on_error: Closure<dyn FnMut(Event)>,
    receiver: mpsc::UnboundedReceiver<SubscriptionItem>,
}

impl NetworkSubscription {
    pub fn open(url: &str) -> Result<Self, JsValue> {
        let init = EventSourceInit::new();
        init.set_with_credentials(true);
        let source = EventSource::new_with_event_source_init_dict(url, &init)?;

        let (sender, receiver) = mpsc::unbounded();
        let mut listeners = Vec::new();
        for kind in ServerEventKind::all() {
            let sender = sender.clone();
            let listener = Closure::wrap(Box::new(move |e: MessageEvent| {
                let data = e.data().as_string().unwrap_or_default();
                let _ = sender.unbounded_send(ServerEvent::parse(kind.as_str(), &data));
            }) as Box<dyn FnMut(MessageEvent)>);
            source.add_event_listener_with_callback(
                kind.as_str(),
                listener.as_ref().unchecked_ref(),
            )?;
            listeners.push((kind, listener));
        }

        let url_for_log = url.to_string();
        let on_error = Closure::wrap(Box::new(move |_e: Event| {
            dioxus_logger::tracing::warn!("Network debug stream interrupted: {}", url_for_log);
        }) as Box<dyn FnMut(Event)>);
        source.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        dioxus_logger::tracing::info!("Subscribed to network debug stream: {}", url);

        Ok(Self {
            source,
            listeners,
            _on_error: on_error,
            receiver,
        })
    }

    /// `EventSource.readyState`: 0 connecting, 1 open, 2 closed
    pub fn ready_state(&self) -> u16 {
        self.source.ready_state()
    }
}

impl Stream for NetworkSubscription {
    type Item = SubscriptionItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}

impl Drop for NetworkSubscription {
    fn drop(&mut self) {
        for (kind, listener) in &self.listeners {
            let _ = self
                .source
                .remove_event_listener_with_callback(kind.as_str(), listener.as_ref().unchecked_ref());
        }
        self.source.set_onerror(None);
        self.source.close();
        dioxus_logger::tracing::info!("Network debug stream closed");
    }
}
