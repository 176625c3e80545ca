//! Storefront API client
//!
//! Data-fetching layer used while rendering a page. Every GraphQL query is
//! tagged with the page's request group id and timed as a sub-request.

use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::observability::request_timing::{
    now_millis, RequestRecorder, PURPOSE, REQUEST_GROUP_ID,
};

const ACCESS_TOKEN_HEADER: &str = "x-shopify-storefront-access-token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-page context propagated into each sub-request
#[derive(Debug, Clone, Default)]
pub struct SubRequestContext {
    pub request_group_id: Option<String>,
    pub prefetch: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StorefrontClientError {
    #[error("Storefront request failed: {0}")]
    Transport(String),

    #[error("Storefront returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode storefront response: {0}")]
    Decode(String),

    #[error("Storefront GraphQL errors: {0}")]
    GraphQl(String),

    #[error("Storefront response had no data")]
    EmptyData,
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Clone)]
pub struct StorefrontClient {
    http: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
    recorder: RequestRecorder,
}

impl StorefrontClient {
    pub fn new(endpoint: String, access_token: Option<String>, recorder: RequestRecorder) -> Self {
        Self::with_timeout(endpoint, access_token, recorder, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: String,
        access_token: Option<String>,
        recorder: RequestRecorder,
        timeout: Duration,
    ) -> Self {
        let http = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to build Storefront HTTP client; falling back to one without a timeout"
                );
                reqwest::Client::new()
            }
        };
        Self {
            http,
            endpoint,
            access_token,
            recorder,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Headers sent with a sub-request; the recorder reads the same map.
    pub fn request_headers(&self, ctx: &SubRequestContext) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(group_id) = ctx
            .request_group_id
            .as_deref()
            .and_then(|id| HeaderValue::from_str(id).ok())
        {
            headers.insert(REQUEST_GROUP_ID, group_id);
        }
        if ctx.prefetch {
            headers.insert(PURPOSE, HeaderValue::from_static("prefetch"));
        }
        if let Some(token) = self
            .access_token
            .as_deref()
            .and_then(|t| HeaderValue::from_str(t).ok())
        {
            headers.insert(ACCESS_TOKEN_HEADER, token);
        }
        headers
    }

    /// Run a GraphQL query and decode its `data` member.
    ///
    /// The sub-request is recorded once a response body has been read,
    /// whatever its status; transport failures before a response are not.
    pub async fn query<T: DeserializeOwned>(
        &self,
        ctx: &SubRequestContext,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, StorefrontClientError> {
        let headers = self.request_headers(ctx);
        let start_time = now_millis();

        let response = self
            .http
            .post(&self.endpoint)
            .headers(headers.clone())
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .map_err(|e| StorefrontClientError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.bytes().await;
        self.recorder
            .record_sub_request(query, &headers, status, start_time);
        let body = body.map_err(|e| StorefrontClientError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(StorefrontClientError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).chars().take(512).collect(),
            });
        }

        let parsed: GraphQlResponse<T> = serde_json::from_slice(&body)
            .map_err(|e| StorefrontClientError::Decode(e.to_string()))?;

        if !parsed.errors.is_empty() {
            let messages = parsed
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(StorefrontClientError::GraphQl(messages));
        }

        parsed.data.ok_or(StorefrontClientError::EmptyData)
    }
}
