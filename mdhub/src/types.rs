//! Core value types shared between the producer-side maintainers and the cache.
//!
//! Everything here is a plain, serde-friendly value: producers build these and
//! publish immutable copies into the [`MarketDataCache`](crate::cache::MarketDataCache),
//! so no shared mutable state ever crosses a component boundary.

use chrono::{DateTime, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trade aggressor side (buyer vs seller initiated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, Side::Sell)
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pip size for a symbol: 0.01 for JPY-quoted pairs, 0.0001 otherwise.
pub fn pip_size(symbol: &str) -> f64 {
    if symbol.to_uppercase().contains("JPY") {
        0.01
    } else {
        0.0001
    }
}

/// A single bid/ask quote snapshot for one instrument.
///
/// Replaced wholesale on every update (last-write-wins), never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    /// Derived as (bid + ask) / 2 when both sides are positive.
    pub mid: f64,
    /// Spread expressed in pips for the symbol, never negative.
    pub spread_pips: f64,
    pub time: DateTime<Utc>,
}

impl Tick {
    /// Build a tick, deriving mid and pip spread from the quoted sides.
    pub fn new(symbol: impl Into<String>, bid: f64, ask: f64, time: DateTime<Utc>) -> Self {
        let symbol = symbol.into();
        let mid = if bid > 0.0 && ask > 0.0 {
            (bid + ask) / 2.0
        } else {
            0.0
        };
        let spread_pips = ((ask - bid) / pip_size(&symbol)).max(0.0);

        Self {
            symbol,
            bid,
            ask,
            mid,
            spread_pips,
            time,
        }
    }
}

/// Where a candle's prices came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandleSource {
    /// Authoritative exchange feed.
    Exchange,
    /// Derived locally from a quote stream.
    Proxy,
}

/// Whether a candle's volume field carries true traded size or a tick-count proxy.
///
/// Downstream consumers (VWAP, toxicity) must distinguish a true VWAP from a
/// time-weighted approximation, so producers tag every candle they emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeKind {
    Real,
    TickCount,
}

/// One-minute OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    /// Bar start, floored to the minute.
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub source: CandleSource,
    pub volume_kind: VolumeKind,
}

impl Candle {
    /// Structural validity for a complete candle: all prices positive,
    /// high is the maximum and low the minimum of the OHLC set.
    pub fn is_well_formed(&self) -> bool {
        self.open > 0.0
            && self.high > 0.0
            && self.low > 0.0
            && self.close > 0.0
            && self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// Price/size level in an order book ladder.
#[derive(Debug, Clone, Copy, PartialEq, Constructor, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

impl BookLevel {
    /// Incomplete depth levels (non-positive price or size) are dropped
    /// individually rather than failing the whole update.
    pub fn is_valid(&self) -> bool {
        self.price > 0.0 && self.size > 0.0
    }
}

/// Directional bias derived from sign agreement of net volume delta and OFI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowBias {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl FlowBias {
    pub fn label(&self) -> &'static str {
        match self {
            FlowBias::Bullish => "bullish",
            FlowBias::Bearish => "bearish",
            FlowBias::Neutral => "neutral",
        }
    }
}

/// Rolling order-flow state for one instrument, recomputed wholesale on each
/// qualifying trade/book event and published into the cache as an immutable
/// snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFlowSnapshot {
    pub symbol: String,
    /// Paired futures/alt symbol when the flow is tracked cross-instrument.
    pub paired_symbol: Option<String>,
    /// Rolling window length the snapshot was computed over.
    pub window: Duration,
    /// Sum of same-price liquidity deltas over the window.
    pub ofi: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub total_volume: f64,
    /// buy_volume - sell_volume.
    pub net_delta: f64,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub bid_size: f64,
    pub ask_size: f64,
    /// Top-of-book size imbalance in [-1, 1], 0 when both sides are empty.
    pub top_imbalance: f64,
    pub sweep_count: u64,
    /// Volume-weighted average price over the window; None when no trades.
    pub vwap: Option<f64>,
    pub bias: FlowBias,
    /// VPIN-style one-sidedness of recent flow, clamped to [0, 1].
    pub toxicity: f64,
    pub update_count: u64,
    /// True when the rolling window held no trades and no book deltas at
    /// computation time.
    pub is_stale: bool,
    pub time: DateTime<Utc>,
}
