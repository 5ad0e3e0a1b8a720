use mdhub::{CacheConfig, CacheServer, MarketDataCache};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    init_logging();

    info!("starting mdhub cache server");

    // Configurable via MDHUB_ADDR env var (default: 127.0.0.1:9100)
    let addr_str = std::env::var("MDHUB_ADDR").unwrap_or_else(|_| "127.0.0.1:9100".to_string());
    let addr = match addr_str.parse::<SocketAddr>() {
        Ok(addr) => addr,
        Err(error) => {
            error!(%addr_str, %error, "invalid MDHUB_ADDR");
            std::process::exit(1);
        }
    };

    // Shared key every producer/consumer process must present.
    let auth_key = std::env::var("MDHUB_AUTH_KEY").unwrap_or_else(|_| {
        warn!("MDHUB_AUTH_KEY not set, falling back to local development key");
        "local-dev".to_string()
    });

    // Per-symbol candle ring capacity via MDHUB_MAX_CANDLES (default: 200)
    let max_candles = std::env::var("MDHUB_MAX_CANDLES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(200);

    let cache = Arc::new(MarketDataCache::new(CacheConfig {
        max_candles,
        ..CacheConfig::default()
    }));

    info!(%addr, max_candles, "cache server configuration loaded");

    let server = CacheServer::new(cache, auth_key);
    tokio::select! {
        result = server.bind(addr) => {
            if let Err(error) = result {
                warn!(%error, "cache server terminated");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, stopping cache server");
        }
    }
}

/// Initialize logging
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
