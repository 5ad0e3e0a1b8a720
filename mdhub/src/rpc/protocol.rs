//! Wire protocol for the cache RPC boundary.
//!
//! Frames are a u32 big-endian byte length followed by a JSON-encoded
//! [`Request`] or [`Response`]. The first frame on a connection must be
//! [`Request::Hello`]; a key mismatch is answered with an error frame and the
//! connection is closed, so authentication failure is distinguishable from
//! connection failure on the client side.

use crate::{
    cache::{CacheStatus, DataType},
    error::HubError,
    types::{Candle, OrderFlowSnapshot, Tick},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{collections::HashMap, time::Duration};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Upper bound on a single frame; anything larger is a protocol violation.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Error message sent for a failed handshake.
pub const UNAUTHORIZED: &str = "unauthorized";

/// Client-to-server calls, mirroring the in-process cache method set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Hello { key: String },
    UpdateTick { tick: Tick },
    UpdateCandle { candle: Candle },
    UpdateOrderFlow { snapshot: OrderFlowSnapshot },
    GetLatestTick { symbol: String },
    GetLatestCandles { symbol: String, limit: usize },
    GetLatestOrderFlow { symbol: String },
    WarmStartCandles { symbol: String, candles: Vec<Candle> },
    CheckStaleness {
        symbol: String,
        thresholds: HashMap<DataType, Duration>,
    },
    GetStatus,
    ClearSymbol { symbol: String },
    ClearAll,
}

/// Server-to-client results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    HelloOk,
    Ack,
    Tick { tick: Option<Tick> },
    Candles { candles: Vec<Candle> },
    OrderFlow { snapshot: Option<OrderFlowSnapshot> },
    Staleness { stale: HashMap<DataType, bool> },
    Status { status: CacheStatus },
    Error { message: String },
}

/// Serialize and write one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), HubError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let payload =
        serde_json::to_vec(frame).map_err(|error| HubError::Protocol(error.to_string()))?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(HubError::Protocol(format!(
            "frame of {} bytes exceeds maximum {}",
            payload.len(),
            MAX_FRAME_BYTES
        )));
    }

    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and deserialize one length-prefixed frame.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, HubError>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_BYTES {
        return Err(HubError::Protocol(format!(
            "frame of {len} bytes exceeds maximum {MAX_FRAME_BYTES}"
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    serde_json::from_slice(&payload).map_err(|error| HubError::Protocol(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_request_json_shape() {
        let request = Request::GetLatestCandles {
            symbol: "EURUSD".to_string(),
            limit: 50,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["op"], "get_latest_candles");
        assert_eq!(json["symbol"], "EURUSD");

        let back: Request = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_staleness_thresholds_round_trip() {
        let request = Request::CheckStaleness {
            symbol: "EURUSD".to_string(),
            thresholds: HashMap::from([
                (DataType::Tick, Duration::from_secs(2)),
                (DataType::OrderFlow, Duration::from_secs(5)),
            ]),
        };
        let json = serde_json::to_string(&request).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }

    #[tokio::test]
    async fn test_frame_round_trip() {
        let tick = Tick::new("EURUSD", 1.1000, 1.1002, Utc::now());
        let frame = Response::Tick { tick: Some(tick) };

        let mut buffer = Vec::new();
        write_frame(&mut buffer, &frame).await.unwrap();

        let mut cursor = std::io::Cursor::new(buffer);
        let back: Response = read_frame(&mut cursor).await.unwrap();
        assert_eq!(back, frame);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        // Hand-craft a header claiming an absurd length.
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(u32::MAX).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buffer);
        let result: Result<Response, _> = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(HubError::Protocol(_))));
    }
}
