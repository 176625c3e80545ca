//! Product page
//!
//! Renders a product as JSON. Its data fetch is a Storefront API sub-request
//! grouped under the page's request group id.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::middleware::{sub_request_context, RequestGroupId};
use crate::storefront_client::StorefrontClientError;

pub const PRODUCT_QUERY: &str = r#"#graphql
  query GetProduct($handle: String!) {
    product(handle: $handle) {
      id
      title
      handle
      description
    }
  }
"#;

#[derive(Debug, Deserialize)]
struct ProductData {
    product: Option<Product>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub handle: String,
    #[serde(default)]
    pub description: String,
}

pub async fn get_product(
    State(state): State<ApiState>,
    Path(handle): Path<String>,
    group: Option<Extension<RequestGroupId>>,
    headers: HeaderMap,
) -> Result<Json<Product>, ApiError> {
    let ctx = sub_request_context(group.as_ref().map(|g| &g.0), &headers);

    let data: ProductData = state
        .app_state
        .storefront()
        .query(
            &ctx,
            PRODUCT_QUERY,
            serde_json::json!({ "handle": handle }),
        )
        .await
        .map_err(|e| match e {
            StorefrontClientError::Transport(_) | StorefrontClientError::Status { .. } => {
                tracing::warn!(handle = %handle, error = %e, "Storefront API unreachable");
                ApiError::BadGateway(e.to_string())
            }
            other => {
                tracing::error!(handle = %handle, error = %other, "Product query failed");
                ApiError::Internal(other.to_string())
            }
        })?;

    data.product.map(Json).ok_or(ApiError::NotFound)
}
