//! mdhub — the real-time market-data backbone of an automated trading stack.
//!
//! A shared, low-latency cache holding the freshest view of price, depth and
//! order-flow state per instrument, fed by multiple independent producers and
//! read by multiple independent consumers. Four pieces form the backbone:
//!
//! - [`cache::MarketDataCache`]: bounded, thread-safe, staleness-aware store.
//! - [`book::OrderBook`]: top-10 L2 maintainer with sequence-gap rejection
//!   and microstructure metrics (microprice, queue imbalance, OFI).
//! - [`bars::BarAggregator`]: minute-boundary OHLCV construction with a
//!   real-volume / tick-volume distinction.
//! - [`flow::OrderFlowCalculator`]: 60-second rolling VWAP, volume delta,
//!   sweep counts and a VPIN-style toxicity score.
//!
//! The [`rpc`] module makes the cache visible across process boundaries: a
//! server process owns the cache and authenticated clients receive a typed
//! stub with the identical method set.

pub mod bars;
pub mod book;
pub mod cache;
pub mod config;
pub mod error;
pub mod flow;
pub mod rpc;
pub mod types;

// Re-export commonly used types for convenience
pub use bars::BarAggregator;
pub use book::OrderBook;
pub use cache::{CacheStatus, DataType, MarketDataCache, UpdateStamps};
pub use config::{BookConfig, CacheConfig, FlowConfig};
pub use error::HubError;
pub use flow::OrderFlowCalculator;
pub use rpc::{CacheClient, CacheServer};
pub use types::{
    BookLevel, Candle, CandleSource, FlowBias, OrderFlowSnapshot, Side, Tick, VolumeKind,
};
