//! TCP server that owns a [`MarketDataCache`] and serves it to other processes.

use crate::{
    cache::MarketDataCache,
    error::HubError,
    rpc::protocol::{self, Request, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// RPC surface over a shared cache, authenticated with a shared key.
#[derive(Debug, Clone)]
pub struct CacheServer {
    cache: Arc<MarketDataCache>,
    auth_key: String,
}

impl CacheServer {
    pub fn new(cache: Arc<MarketDataCache>, auth_key: impl Into<String>) -> Self {
        Self {
            cache,
            auth_key: auth_key.into(),
        }
    }

    /// Bind the address and serve forever.
    pub async fn bind(self, addr: SocketAddr) -> Result<(), HubError> {
        let listener = TcpListener::bind(addr).await?;
        self.run(listener).await
    }

    /// Serve connections from an already-bound listener (lets tests bind to
    /// an ephemeral port first).
    pub async fn run(self, listener: TcpListener) -> Result<(), HubError> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "cache server listening");
        }

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            info!(%peer_addr, "new cache client connection");
            let cache = Arc::clone(&self.cache);
            let auth_key = self.auth_key.clone();
            tokio::spawn(async move {
                handle_client(stream, peer_addr, cache, auth_key).await;
            });
        }
    }
}

async fn handle_client(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    cache: Arc<MarketDataCache>,
    auth_key: String,
) {
    // Handshake: the first frame must be Hello with the shared key.
    match protocol::read_frame::<_, Request>(&mut stream).await {
        Ok(Request::Hello { key }) if key == auth_key => {
            if let Err(error) = protocol::write_frame(&mut stream, &Response::HelloOk).await {
                warn!(%peer_addr, %error, "failed to acknowledge handshake");
                return;
            }
            info!(%peer_addr, "cache client authenticated");
        }
        Ok(_) => {
            warn!(%peer_addr, "rejecting unauthenticated cache client");
            let rejection = Response::Error {
                message: protocol::UNAUTHORIZED.to_string(),
            };
            let _ = protocol::write_frame(&mut stream, &rejection).await;
            return;
        }
        Err(error) => {
            warn!(%peer_addr, %error, "handshake failed");
            return;
        }
    }

    loop {
        let request = match protocol::read_frame::<_, Request>(&mut stream).await {
            Ok(request) => request,
            Err(HubError::Transport(error)) => {
                debug!(%peer_addr, %error, "cache client disconnected");
                break;
            }
            Err(error) => {
                warn!(%peer_addr, %error, "dropping client after protocol violation");
                break;
            }
        };

        let response = dispatch(&cache, request);
        if let Err(error) = protocol::write_frame(&mut stream, &response).await {
            debug!(%peer_addr, %error, "failed to write response, closing");
            break;
        }
    }
}

/// Map one request onto the in-process cache. Pure in-memory work; nothing
/// here blocks on I/O.
fn dispatch(cache: &MarketDataCache, request: Request) -> Response {
    match request {
        // A second Hello on an authenticated connection is harmless.
        Request::Hello { .. } => Response::HelloOk,
        Request::UpdateTick { tick } => {
            cache.update_tick(tick);
            Response::Ack
        }
        Request::UpdateCandle { candle } => {
            cache.update_candle(candle);
            Response::Ack
        }
        Request::UpdateOrderFlow { snapshot } => {
            cache.update_order_flow(snapshot);
            Response::Ack
        }
        Request::GetLatestTick { symbol } => Response::Tick {
            tick: cache.get_latest_tick(&symbol),
        },
        Request::GetLatestCandles { symbol, limit } => Response::Candles {
            candles: cache.get_latest_candles(&symbol, limit),
        },
        Request::GetLatestOrderFlow { symbol } => Response::OrderFlow {
            snapshot: cache.get_latest_order_flow(&symbol),
        },
        Request::WarmStartCandles { symbol, candles } => {
            cache.warm_start_candles(&symbol, candles);
            Response::Ack
        }
        Request::CheckStaleness { symbol, thresholds } => Response::Staleness {
            stale: cache.check_staleness(&symbol, &thresholds),
        },
        Request::GetStatus => Response::Status {
            status: cache.status(),
        },
        Request::ClearSymbol { symbol } => {
            cache.clear_symbol(&symbol);
            Response::Ack
        }
        Request::ClearAll => {
            cache.clear_all();
            Response::Ack
        }
    }
}
