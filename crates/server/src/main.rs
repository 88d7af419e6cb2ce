//! HTTP front end for the extraction engine.
//!
//! Configured from the environment:
//!
//! | variable | default |
//! |---|---|
//! | `GRANTSCOPE_ADDR` | `127.0.0.1:3000` |
//! | `GRANTSCOPE_PROFILES` | user config dir, if present |
//! | `GRANTSCOPE_CACHE_TTL_SECS` | `1800` |
//! | `GRANTSCOPE_REQUEST_TIMEOUT_SECS` | `180` |
//! | `RUST_LOG` | `info` |

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{Method, StatusCode};
use grantscope_core::{Extractor, ExtractorConfig};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::routes::{AppState, create_router};

#[derive(Debug, Clone, PartialEq)]
struct ServerConfig {
    addr: SocketAddr,
    profiles_dir: Option<String>,
    cache_ttl: Duration,
    request_timeout: Duration,
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let addr = lookup("GRANTSCOPE_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse()
            .context("Invalid GRANTSCOPE_ADDR")?;
        let cache_ttl = seconds(&lookup, "GRANTSCOPE_CACHE_TTL_SECS", 1800)?;
        let request_timeout = seconds(&lookup, "GRANTSCOPE_REQUEST_TIMEOUT_SECS", 180)?;

        Ok(Self { addr, profiles_dir: lookup("GRANTSCOPE_PROFILES"), cache_ttl, request_timeout })
    }

    fn extractor_config(&self) -> ExtractorConfig {
        let builder = ExtractorConfig::builder().cache_ttl(self.cache_ttl);
        match &self.profiles_dir {
            Some(dir) => builder.profiles_dir(dir).build(),
            None => builder.build(),
        }
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    let secs = match lookup(key) {
        Some(value) => value.trim().parse().with_context(|| format!("Invalid {key}: {value}"))?,
        None => default,
    };
    Ok(Duration::from_secs(secs))
}

async fn shutdown_signal() {
    log_shutdown(tokio::signal::ctrl_c().await);
}

/// Logs why the server stops. Returns whether Ctrl-C was actually received.
fn log_shutdown(signal: std::io::Result<()>) -> bool {
    match signal {
        Ok(()) => {
            info!("shutting down");
            true
        }
        Err(e) => {
            error!(error = %e, "cannot listen for Ctrl-C, shutting down");
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env()?;
    let extractor = Extractor::with_config(config.extractor_config());

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    let app = create_router(AppState { extractor: Arc::new(extractor) })
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, config.request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.addr))?;

    info!(addr = %config.addr, cache_ttl_secs = config.cache_ttl.as_secs(), "grantscope server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.cache_ttl, Duration::from_secs(1800));
        assert_eq!(config.profiles_dir, None);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("GRANTSCOPE_ADDR", "0.0.0.0:8080"),
            ("GRANTSCOPE_CACHE_TTL_SECS", "60"),
            ("GRANTSCOPE_PROFILES", "/etc/grantscope"),
        ])
        .unwrap();

        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.extractor_config().cache_ttl, Duration::from_secs(60));
        assert_eq!(
            config.extractor_config().profiles_dir.as_deref(),
            Some(std::path::Path::new("/etc/grantscope"))
        );
    }

    #[test]
    fn test_shutdown_signal_errors_are_reported() {
        assert!(log_shutdown(Ok(())));
        assert!(!log_shutdown(Err(std::io::Error::other("signal handler unavailable"))));
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("GRANTSCOPE_ADDR", "nowhere")]).is_err());
        assert!(config(&[("GRANTSCOPE_CACHE_TTL_SECS", "soon")]).is_err());
    }
}
