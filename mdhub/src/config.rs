//! Configuration surface for the cache and its satellite structures.
//!
//! All configuration is explicit and passed at construction time; there is no
//! ambient global state. Defaults match the expected cadence of a live feed:
//! ticks arrive sub-second, 1-minute candles at most two minutes apart, and
//! order-flow snapshots every few seconds.

use std::time::Duration;

/// [`MarketDataCache`](crate::cache::MarketDataCache) settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Per-symbol candle ring capacity; insertion evicts the oldest.
    pub max_candles: usize,
    /// A tick older than this is reported stale.
    pub tick_staleness: Duration,
    /// A candle older than this is reported stale.
    pub candle_staleness: Duration,
    /// An order-flow snapshot older than this is reported stale.
    pub order_flow_staleness: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_candles: 200,
            tick_staleness: Duration::from_secs(2),
            candle_staleness: Duration::from_secs(120),
            order_flow_staleness: Duration::from_secs(5),
        }
    }
}

/// [`OrderBook`](crate::book::OrderBook) settings.
#[derive(Debug, Clone)]
pub struct BookConfig {
    /// Ladder depth retained per side.
    pub depth: usize,
    /// Pacing gate for full-book snapshot generation.
    pub snapshot_interval: Duration,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            depth: 10,
            snapshot_interval: Duration::from_millis(250),
        }
    }
}

/// [`OrderFlowCalculator`](crate::flow::OrderFlowCalculator) settings.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Rolling window over which trades and OFI contributions are summed.
    pub window: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
        }
    }
}
