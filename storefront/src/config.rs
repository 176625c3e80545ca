use std::time::Duration;

use crate::actors::event_store::DEFAULT_CAPACITY;

pub const MIN_POLL_MS: u64 = 50;
pub const MAX_POLL_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the storefront listens on
    pub port: u16,
    /// Storefront GraphQL endpoint sub-requests are sent to
    pub storefront_api_url: String,
    /// Public access token for the Storefront API
    pub storefront_api_token: Option<String>,
    /// Pending timing entries kept before the oldest is evicted
    pub event_store_capacity: usize,
    /// Origins allowed to make credentialed requests
    pub allowed_origins: Vec<String>,
    /// Directory with the built network view, served at `/network`
    pub network_ui_dist: Option<String>,
    pub network_debug: NetworkDebugConfig,
}

#[derive(Debug, Clone)]
pub struct NetworkDebugConfig {
    /// Serve the relay endpoint at all; development aid only
    pub enabled: bool,
    /// How often each connection drains the event store
    pub poll_interval: Duration,
    /// Max entries taken from the store per tick
    pub batch_limit: usize,
}

impl Default for NetworkDebugConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_millis(250),
            batch_limit: 200,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            storefront_api_url: "http://127.0.0.1:8081/api/graphql.json".to_string(),
            storefront_api_token: None,
            event_store_capacity: DEFAULT_CAPACITY,
            allowed_origins: default_origins(),
            network_ui_dist: None,
            network_debug: NetworkDebugConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let poll_ms: u64 = env_parse("NETWORK_DEBUG_POLL_MS", 250)?;
        let batch_limit: usize = env_parse("NETWORK_DEBUG_BATCH_LIMIT", 200)?;
        if batch_limit == 0 {
            return Err(anyhow::anyhow!("NETWORK_DEBUG_BATCH_LIMIT must be positive"));
        }

        Ok(Self {
            port: env_parse("STOREFRONT_PORT", 8080)?,
            storefront_api_url: env_str(
                "STOREFRONT_API_URL",
                "http://127.0.0.1:8081/api/graphql.json",
            ),
            storefront_api_token: std::env::var("STOREFRONT_API_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            event_store_capacity: env_parse("EVENT_STORE_CAPACITY", DEFAULT_CAPACITY)?,
            allowed_origins: env_csv("ALLOWED_ORIGINS", &default_origins()),
            network_ui_dist: std::env::var("NETWORK_UI_DIST").ok(),
            network_debug: NetworkDebugConfig {
                enabled: env_bool("NETWORK_DEBUG_ENABLED", true),
                poll_interval: Duration::from_millis(poll_ms.clamp(MIN_POLL_MS, MAX_POLL_MS)),
                batch_limit,
            },
        })
    }
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://localhost:8080".to_string(),
        "http://127.0.0.1:8080".to_string(),
    ]
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_csv(key: &str, default: &[String]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Err(_) => default.to_vec(),
    }
}

/// Load `.env` from the current directory or the nearest ancestor that has one.
pub fn load_env_file() {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current directory for .env lookup");
            return;
        }
    };

    let mut current = cwd.clone();
    loop {
        let candidate = current.join(".env");
        if candidate.exists() {
            match dotenvy::from_path(&candidate) {
                Ok(_) => {
                    tracing::info!(path = %candidate.display(), "Loaded environment from .env");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %candidate.display(),
                        error = %e,
                        "Failed to load .env file"
                    );
                }
            }
            return;
        }

        if !current.pop() {
            break;
        }
    }

    tracing::info!(
        cwd = %cwd.display(),
        "No .env file found in current directory or ancestors; using process environment only"
    );
}
