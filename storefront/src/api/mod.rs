//! HTTP API routes for the storefront
//!
//! Page routes run behind the request timing middleware; the network debug
//! relay streams the recorded timings to the browser.

use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde_json::json;
use shared_types::{NETWORK_DEBUG_PATH, NETWORK_VIEW_PATH};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

pub mod network_debug;
pub mod products;

use crate::actors::event_store;
use crate::app_state::AppState;
use crate::config::Config;

#[derive(Clone)]
pub struct ApiState {
    pub app_state: AppState,
}

/// Errors returned by route handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found")]
    NotFound,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Upstream error: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Configure all API routes
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health_check))
        .route(NETWORK_DEBUG_PATH, get(network_debug::network_debug_stream))
        .route("/products/{handle}", get(products::get_product))
}

/// Full application: routes, timing middleware, optional network view assets.
///
/// CORS is left to the caller so tests can drive the router without it.
pub fn app(state: ApiState) -> Router {
    let mut router = router();

    if let Some(dist) = state.app_state.config().network_ui_dist.clone() {
        let index = std::path::Path::new(&dist).join("index.html");
        router = router.nest_service(
            NETWORK_VIEW_PATH,
            ServeDir::new(&dist).fallback(ServeFile::new(index)),
        );
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::request_timing,
        ))
        .with_state(state)
}

/// Serve `app` until `signal` resolves, then end the relay streams so open
/// debug connections do not hold up the graceful shutdown.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    app: Router,
    app_state: AppState,
    signal: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            tracing::info!("Shutdown requested; closing network debug streams");
            app_state.shutdown();
        })
        .await
}

/// Credentialed CORS restricted to the configured origins
pub fn cors_layer(config: &Config) -> CorsLayer {
    let origins = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Health check endpoint
pub async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    let store = match event_store::stats(&state.app_state.event_store()).await {
        Ok(stats) => json!(stats),
        Err(e) => {
            tracing::warn!(error = %e, "Event store stats unavailable");
            serde_json::Value::Null
        }
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "storefront",
            "version": env!("CARGO_PKG_VERSION"),
            "network_debug": state.app_state.config().network_debug.enabled,
            "event_store": store,
        })),
    )
}
