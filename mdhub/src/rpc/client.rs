//! Typed client stub exposing the cache method set across a process boundary.
//!
//! Every method is one synchronous request/response round trip over the
//! connection; callers should treat them as I/O that may fail, and keep any
//! retry/backoff loop on their side.

use crate::{
    cache::{CacheStatus, DataType},
    error::HubError,
    rpc::protocol::{self, Request, Response},
    types::{Candle, OrderFlowSnapshot, Tick},
};
use std::{collections::HashMap, net::SocketAddr, time::Duration};
use tokio::{net::TcpStream, sync::Mutex};

/// Handle to a remote [`MarketDataCache`](crate::cache::MarketDataCache).
#[derive(Debug)]
pub struct CacheClient {
    stream: Mutex<TcpStream>,
}

impl CacheClient {
    /// Connect and authenticate. Connection refusal surfaces as
    /// [`HubError::Transport`], a rejected key as [`HubError::Unauthorized`].
    pub async fn connect(addr: SocketAddr, key: impl Into<String>) -> Result<Self, HubError> {
        let mut stream = TcpStream::connect(addr).await?;

        protocol::write_frame(&mut stream, &Request::Hello { key: key.into() }).await?;
        match protocol::read_frame::<_, Response>(&mut stream).await? {
            Response::HelloOk => Ok(Self {
                stream: Mutex::new(stream),
            }),
            Response::Error { message } if message == protocol::UNAUTHORIZED => {
                Err(HubError::Unauthorized)
            }
            other => Err(HubError::Protocol(format!(
                "unexpected handshake response: {other:?}"
            ))),
        }
    }

    pub async fn update_tick(&self, tick: Tick) -> Result<(), HubError> {
        self.expect_ack(Request::UpdateTick { tick }).await
    }

    pub async fn update_candle(&self, candle: Candle) -> Result<(), HubError> {
        self.expect_ack(Request::UpdateCandle { candle }).await
    }

    pub async fn update_order_flow(&self, snapshot: OrderFlowSnapshot) -> Result<(), HubError> {
        self.expect_ack(Request::UpdateOrderFlow { snapshot }).await
    }

    pub async fn get_latest_tick(&self, symbol: &str) -> Result<Option<Tick>, HubError> {
        match self
            .call(Request::GetLatestTick {
                symbol: symbol.to_string(),
            })
            .await?
        {
            Response::Tick { tick } => Ok(tick),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_latest_candles(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, HubError> {
        match self
            .call(Request::GetLatestCandles {
                symbol: symbol.to_string(),
                limit,
            })
            .await?
        {
            Response::Candles { candles } => Ok(candles),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_latest_order_flow(
        &self,
        symbol: &str,
    ) -> Result<Option<OrderFlowSnapshot>, HubError> {
        match self
            .call(Request::GetLatestOrderFlow {
                symbol: symbol.to_string(),
            })
            .await?
        {
            Response::OrderFlow { snapshot } => Ok(snapshot),
            other => Err(unexpected(other)),
        }
    }

    pub async fn warm_start_candles(
        &self,
        symbol: &str,
        candles: Vec<Candle>,
    ) -> Result<(), HubError> {
        self.expect_ack(Request::WarmStartCandles {
            symbol: symbol.to_string(),
            candles,
        })
        .await
    }

    pub async fn check_staleness(
        &self,
        symbol: &str,
        thresholds: HashMap<DataType, Duration>,
    ) -> Result<HashMap<DataType, bool>, HubError> {
        match self
            .call(Request::CheckStaleness {
                symbol: symbol.to_string(),
                thresholds,
            })
            .await?
        {
            Response::Staleness { stale } => Ok(stale),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_status(&self) -> Result<CacheStatus, HubError> {
        match self.call(Request::GetStatus).await? {
            Response::Status { status } => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub async fn clear_symbol(&self, symbol: &str) -> Result<(), HubError> {
        self.expect_ack(Request::ClearSymbol {
            symbol: symbol.to_string(),
        })
        .await
    }

    pub async fn clear_all(&self) -> Result<(), HubError> {
        self.expect_ack(Request::ClearAll).await
    }

    async fn call(&self, request: Request) -> Result<Response, HubError> {
        let mut stream = self.stream.lock().await;
        protocol::write_frame(&mut *stream, &request).await?;
        protocol::read_frame(&mut *stream).await
    }

    async fn expect_ack(&self, request: Request) -> Result<(), HubError> {
        match self.call(request).await? {
            Response::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> HubError {
    match response {
        Response::Error { message } => HubError::Protocol(message),
        other => HubError::Protocol(format!("unexpected response: {other:?}")),
    }
}
