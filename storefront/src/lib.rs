//! Storefront server with request timing telemetry
//!
//! Records the main document request and every Storefront API sub-request it
//! issues, and relays the timings to the network debug view over SSE.

pub mod actors;
pub mod api;
pub mod app_state;
pub mod config;
pub mod middleware;
pub mod observability;
pub mod storefront_client;
