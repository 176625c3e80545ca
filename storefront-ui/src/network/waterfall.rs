//! Waterfall layout
//!
//! Maps the aggregate to rows of intervals relative to the earliest start
//! time seen. A main request bar has a server phase (until first byte) and a
//! streaming phase that lasts until its slowest sub-request finishes.
//!
//! Negative intervals from clock skew are clamped to zero length. The
//! streaming phase still ends at each sub-request's reported end time, so a
//! skewed sub-request cannot stretch its row to its own start.

use shared_types::TimingRecord;

use super::aggregator::ServerEvents;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainRequestRow {
    pub id: Option<String>,
    pub url: String,
    pub request_start: i64,
    pub response_start: i64,
    pub response_end: i64,
    /// Server phase, `response_start - request_start`
    pub ttfb: i64,
    /// Whole row, `response_end - request_start`
    pub total: i64,
    pub sub_requests: Vec<SubRequestRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubRequestRow {
    pub url: String,
    pub request_start: i64,
    pub request_end: i64,
    pub duration: i64,
}

pub fn build_waterfall(events: &ServerEvents) -> Vec<MainRequestRow> {
    let origin = events.smallest_start_time.unwrap_or(0);
    let normalize = |t: i64| t - origin;

    events
        .main_requests
        .iter()
        .map(|main| {
            let request_start = normalize(main.start_time);
            let response_start = normalize(main.end_time).max(request_start);

            let subs = events.sub_requests_for(main.id.as_deref());
            let sub_requests: Vec<SubRequestRow> = subs
                .iter()
                .map(|sub| sub_request_row(sub, normalize))
                .collect();

            let response_end = subs
                .iter()
                .map(|sub| normalize(sub.end_time))
                .fold(response_start, i64::max);

            MainRequestRow {
                id: main.id.clone(),
                url: main.url.clone(),
                request_start,
                response_start,
                response_end,
                ttfb: response_start - request_start,
                total: response_end - request_start,
                sub_requests,
            }
        })
        .collect()
}

fn sub_request_row(sub: &TimingRecord, normalize: impl Fn(i64) -> i64) -> SubRequestRow {
    let request_start = normalize(sub.start_time);
    let request_end = normalize(sub.end_time).max(request_start);
    SubRequestRow {
        url: sub.url.clone(),
        request_start,
        request_end,
        duration: request_end - request_start,
    }
}

fn pct(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 100.0).clamp(0.0, 100.0)
}

impl MainRequestRow {
    pub fn server_width_pct(&self) -> f64 {
        pct(self.ttfb, self.total)
    }

    pub fn streaming_width_pct(&self) -> f64 {
        pct(self.response_end - self.response_start, self.total)
    }

    /// Where `sub` starts inside this row's span
    pub fn offset_pct(&self, sub: &SubRequestRow) -> f64 {
        pct(sub.request_start - self.request_start, self.total)
    }

    /// Width of `sub`, never running past the end of the row
    pub fn width_pct(&self, sub: &SubRequestRow) -> f64 {
        pct(sub.duration, self.total).min(100.0 - self.offset_pct(sub))
    }
}
