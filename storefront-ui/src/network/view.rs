use dioxus::prelude::*;
use gloo_timers::future::TimeoutFuture;
use shared_types::NETWORK_DEBUG_PATH;

use super::aggregator::ServerEvents;
use super::batch::next_batch;
use super::subscription::NetworkSubscription;
use super::waterfall::{build_waterfall, MainRequestRow};

const SERVER_COLOR: &str = "#00a846";
const STREAMING_COLOR: &str = "#0599de";
const SUB_REQUEST_COLOR: &str = "#00a846";

fn page_origin() -> Option<String> {
    web_sys::window().and_then(|w| w.location().origin().ok())
}

/// Live request waterfall fed by the relay.
///
/// Subscribes on mount and unsubscribes when unmounted.
#[component]
pub fn NetworkView(
    #[props(default = NETWORK_DEBUG_PATH.to_string())] relay_url: String,
) -> Element {
    let mut server_events = use_signal(|| ServerEvents::for_page(page_origin()));

    use_future(move || {
        let relay_url = relay_url.clone();
        async move {
            let mut subscription = match NetworkSubscription::open(&relay_url) {
                Ok(subscription) => subscription,
                Err(e) => {
                    dioxus_logger::tracing::error!("Failed to open network debug stream: {:?}", e);
                    return;
                }
            };

            // One scheduling cycle of coalescing per re-render
            while let Some(batch) = next_batch(&mut subscription, TimeoutFuture::new(0)).await {
                let mut events = server_events.write();
                for item in batch {
                    match item {
                        Ok(event) => {
                            events.apply(event);
                        }
                        Err(e) => {
                            dioxus_logger::tracing::warn!("Skipping network debug event: {}", e);
                        }
                    }
                }
            }
        }
    });

    let rows = build_waterfall(&server_events.read());
    let unassociated = server_events.read().unassociated.len();

    rsx! {
        div {
            style: "display: flex; flex-direction: column; gap: 0.5rem; font-family: ui-monospace, monospace; font-size: 0.8rem;",
            div {
                style: "display: flex; align-items: center; gap: 1rem;",
                button {
                    style: "padding: 0.4rem 1rem; border: 1px solid #374151; border-radius: 0.25rem; background: #111827; color: white; cursor: pointer;",
                    onclick: move |_| server_events.write().clear(),
                    "Clear"
                }
                if unassociated > 0 {
                    span {
                        style: "color: #9ca3af;",
                        "{unassociated} sub-requests without a request group id"
                    }
                }
            }
            for (idx, row) in rows.into_iter().enumerate() {
                WaterfallRow { key: "{idx}", row }
            }
        }
    }
}

#[component]
fn WaterfallRow(row: MainRequestRow) -> Element {
    let server_width = row.server_width_pct();
    // A zero-length row still needs room for its labels
    let streaming_width = if row.total > 0 {
        row.streaming_width_pct()
    } else {
        100.0
    };
    let ttfb = row.ttfb;
    let total = row.total;
    let url = row.url.clone();

    let subs = row
        .sub_requests
        .iter()
        .map(|sub| {
            (
                sub.url.clone(),
                sub.duration,
                row.offset_pct(sub),
                row.width_pct(sub),
            )
        })
        .collect::<Vec<_>>();

    rsx! {
        details {
            summary {
                div {
                    style: "display: flex; color: white; background-color: {STREAMING_COLOR};",
                    div {
                        style: "overflow: hidden; white-space: nowrap; background-color: {SERVER_COLOR}; width: {server_width:.3}%;",
                        "{url}"
                    }
                    div {
                        style: "display: flex; justify-content: space-between; width: {streaming_width:.3}%;",
                        div { "TTFB: {ttfb}ms" }
                        div { "{total}ms" }
                    }
                }
            }
            for (idx, (sub_url, duration, offset, width)) in subs.into_iter().enumerate() {
                div {
                    key: "{idx}",
                    style: if idx % 2 == 0 { "display: flex; opacity: 0.8;" } else { "display: flex;" },
                    div { style: "width: {offset:.3}%;", "\u{a0}" }
                    div {
                        style: "position: relative; width: {width:.3}%;",
                        div {
                            style: "position: absolute; white-space: nowrap;",
                            "{sub_url} {duration}ms"
                        }
                        div { style: "background-color: {SUB_REQUEST_COLOR}; width: 100%;", "\u{a0}" }
                    }
                }
            }
        }
    }
}
