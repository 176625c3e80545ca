use std::collections::HashMap;

use shared_types::{
    ServerEvent, TimingRecord, NETWORK_DEBUG_PATH, NETWORK_VIEW_PATH, PREFETCH_PREFIX,
};

/// Everything received on the relay since the view opened or was last cleared
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerEvents {
    pub main_requests: Vec<TimingRecord>,
    /// Sub-requests keyed by correlation id, in arrival order
    pub sub_requests: HashMap<String, Vec<TimingRecord>>,
    /// Sub-requests whose correlation id was lost; counted, never charted
    pub unassociated: Vec<TimingRecord>,
    /// Earliest start time seen; the chart's time origin
    pub smallest_start_time: Option<i64>,
    page_origin: Option<String>,
}

impl ServerEvents {
    /// Empty aggregate that strips `origin` (e.g. `http://localhost:8080`)
    /// from main request URLs.
    pub fn for_page(origin: Option<String>) -> Self {
        Self {
            page_origin: origin.map(|o| o.trim_end_matches('/').to_string()),
            ..Self::default()
        }
    }

    /// Fold one event into the aggregate. Returns false when it was filtered
    /// out as the view's own traffic.
    pub fn apply(&mut self, event: ServerEvent) -> bool {
        if is_self_traffic(&event.record().url, self.page_origin.as_deref()) {
            return false;
        }

        let start_time = event.record().start_time;
        self.smallest_start_time = Some(match self.smallest_start_time {
            Some(current) => current.min(start_time),
            None => start_time,
        });

        match event {
            ServerEvent::MainRequest(mut record) => {
                record.url = strip_page_origin(&record.url, self.page_origin.as_deref());
                self.main_requests.push(record);
            }
            ServerEvent::SubRequest(record) => match record.id.clone() {
                Some(id) => self.sub_requests.entry(id).or_default().push(record),
                None => self.unassociated.push(record),
            },
        }
        true
    }

    /// Back to the empty initial value; the page origin is kept.
    pub fn clear(&mut self) {
        *self = Self::for_page(self.page_origin.take());
    }

    pub fn is_empty(&self) -> bool {
        self.main_requests.is_empty() && self.sub_requests.is_empty() && self.unassociated.is_empty()
    }

    /// Sub-requests charted under a main request
    pub fn sub_requests_for(&self, id: Option<&str>) -> &[TimingRecord] {
        id.and_then(|id| self.sub_requests.get(id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn strip_page_origin(url: &str, origin: Option<&str>) -> String {
    let (prefix, rest) = match url.strip_prefix(PREFETCH_PREFIX) {
        Some(rest) => (PREFETCH_PREFIX, rest),
        None => ("", url),
    };
    match origin.and_then(|o| rest.strip_prefix(o)) {
        Some(path) if path.is_empty() => format!("{prefix}/"),
        Some(path) => format!("{prefix}{path}"),
        None => url.to_string(),
    }
}

/// Path component of a display URL: no prefetch prefix, origin, query or fragment.
fn url_path<'a>(url: &'a str, origin: Option<&str>) -> &'a str {
    let url = url.strip_prefix(PREFETCH_PREFIX).unwrap_or(url);
    let url = match origin.and_then(|o| url.strip_prefix(o)) {
        Some(rest) => rest,
        None => match url.split_once("://") {
            Some((_, after_scheme)) => after_scheme
                .find('/')
                .map(|i| &after_scheme[i..])
                .unwrap_or("/"),
            None => url,
        },
    };
    let end = url.find(&['?', '#'][..]).unwrap_or(url.len());
    &url[..end]
}

/// Requests made by the network view itself or by its relay connection
pub fn is_self_traffic(url: &str, origin: Option<&str>) -> bool {
    let path = url_path(url, origin);
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    path == NETWORK_DEBUG_PATH
        || path == NETWORK_VIEW_PATH
        || path
            .strip_prefix(NETWORK_VIEW_PATH)
            .is_some_and(|rest| rest.starts_with('/'))
}
