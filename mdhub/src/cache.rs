//! The shared, process-wide market-data store.
//!
//! Holds the latest [`Tick`] per symbol, a bounded ring of recent [`Candle`]s
//! per symbol, the latest [`OrderFlowSnapshot`] per symbol, and per-field
//! last-update stamps for staleness checks.
//!
//! Locking discipline: a separate `RwLock` guards each data-type's storage so
//! a writer touching ticks never blocks a reader of candles. Operations that
//! must appear atomic across stores (bulk clear, full status snapshot)
//! acquire the locks in one fixed global order: ticks, candles, order-flow,
//! stamps. No operation blocks on network or disk I/O while holding a lock.

use crate::{
    config::CacheConfig,
    error::HubError,
    types::{Candle, OrderFlowSnapshot, Tick},
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::{debug, info, warn};

/// The three data types the cache tracks staleness for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Tick,
    Candle,
    OrderFlow,
}

/// Fixed-shape per-symbol last-update record, one named field per data type.
///
/// An absent stamp means no update was ever recorded, which the staleness
/// rule treats as stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStamps {
    pub tick: Option<DateTime<Utc>>,
    pub candle: Option<DateTime<Utc>>,
    pub order_flow: Option<DateTime<Utc>>,
}

impl UpdateStamps {
    pub fn get(&self, data_type: DataType) -> Option<DateTime<Utc>> {
        match data_type {
            DataType::Tick => self.tick,
            DataType::Candle => self.candle,
            DataType::OrderFlow => self.order_flow,
        }
    }

    fn mark(&mut self, data_type: DataType, now: DateTime<Utc>) {
        match data_type {
            DataType::Tick => self.tick = Some(now),
            DataType::Candle => self.candle = Some(now),
            DataType::OrderFlow => self.order_flow = Some(now),
        }
    }
}

/// Cumulative observability counters, bumped by every mutating/serving call.
#[derive(Debug, Default)]
struct CacheCounters {
    ticks_received: AtomicU64,
    candles_received: AtomicU64,
    candles_warm_started: AtomicU64,
    order_flow_received: AtomicU64,
    ticks_served: AtomicU64,
    candles_served: AtomicU64,
    order_flow_served: AtomicU64,
}

/// Operational diagnostics snapshot, cheap enough to serve over RPC.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbols: Vec<String>,
    pub candle_counts: HashMap<String, usize>,
    pub ticks_received: u64,
    pub candles_received: u64,
    pub candles_warm_started: u64,
    pub order_flow_received: u64,
    pub ticks_served: u64,
    pub candles_served: u64,
    pub order_flow_served: u64,
    pub last_updates: HashMap<String, UpdateStamps>,
}

/// Shared, staleness-aware market-data cache.
///
/// Safe under arbitrary-many concurrent writers across all instruments and
/// data types and arbitrary-many concurrent readers. Across different writers
/// for the same symbol the cache guarantees last-write-wins with no merge;
/// callers are responsible for at most one authoritative producer per symbol
/// per data type.
#[derive(Debug)]
pub struct MarketDataCache {
    config: CacheConfig,
    ticks: RwLock<HashMap<String, Tick>>,
    candles: RwLock<HashMap<String, VecDeque<Candle>>>,
    order_flow: RwLock<HashMap<String, OrderFlowSnapshot>>,
    stamps: RwLock<HashMap<String, UpdateStamps>>,
    counters: CacheCounters,
}

impl MarketDataCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            ticks: RwLock::new(HashMap::new()),
            candles: RwLock::new(HashMap::new()),
            order_flow: RwLock::new(HashMap::new()),
            stamps: RwLock::new(HashMap::new()),
            counters: CacheCounters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Default per-data-type staleness thresholds from the cache config.
    pub fn default_thresholds(&self) -> HashMap<DataType, Duration> {
        HashMap::from([
            (DataType::Tick, self.config.tick_staleness),
            (DataType::Candle, self.config.candle_staleness),
            (DataType::OrderFlow, self.config.order_flow_staleness),
        ])
    }

    /// Replace the latest tick for its symbol (last-write-wins).
    pub fn update_tick(&self, tick: Tick) {
        let symbol = tick.symbol.clone();
        self.ticks.write().insert(symbol.clone(), tick);
        self.mark(&symbol, DataType::Tick);
        self.counters.ticks_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Append a candle to its symbol's ring, evicting the oldest beyond
    /// `max_candles`.
    pub fn update_candle(&self, candle: Candle) {
        if !candle.is_well_formed() {
            warn!(symbol = %candle.symbol, "skipping malformed candle");
            return;
        }

        let symbol = candle.symbol.clone();
        {
            let mut candles = self.candles.write();
            let ring = candles.entry(symbol.clone()).or_default();
            if ring.len() >= self.config.max_candles {
                ring.pop_front();
            }
            ring.push_back(candle);
        }
        self.mark(&symbol, DataType::Candle);
        self.counters
            .candles_received
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Replace the latest order-flow snapshot for its symbol.
    pub fn update_order_flow(&self, snapshot: OrderFlowSnapshot) {
        let symbol = snapshot.symbol.clone();
        self.order_flow.write().insert(symbol.clone(), snapshot);
        self.mark(&symbol, DataType::OrderFlow);
        self.counters
            .order_flow_received
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_latest_tick(&self, symbol: &str) -> Option<Tick> {
        let tick = self.ticks.read().get(symbol).cloned();
        if tick.is_some() {
            self.counters.ticks_served.fetch_add(1, Ordering::Relaxed);
        }
        tick
    }

    /// Up to `limit` most recent candles, oldest to newest.
    pub fn get_latest_candles(&self, symbol: &str, limit: usize) -> Vec<Candle> {
        let candles = self.candles.read();
        let out = match candles.get(symbol) {
            Some(ring) => {
                let skip = ring.len().saturating_sub(limit);
                ring.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        };
        drop(candles);

        if !out.is_empty() {
            self.counters
                .candles_served
                .fetch_add(1, Ordering::Relaxed);
        }
        out
    }

    pub fn get_latest_order_flow(&self, symbol: &str) -> Option<OrderFlowSnapshot> {
        let snapshot = self.order_flow.read().get(symbol).cloned();
        if snapshot.is_some() {
            self.counters
                .order_flow_served
                .fetch_add(1, Ordering::Relaxed);
        }
        snapshot
    }

    /// Bulk-load historical candles for one symbol, expected pre-sorted
    /// oldest to newest.
    ///
    /// Append semantics, deliberately: calling twice with the same candles
    /// stores them twice (no dedupe, no merge). Ticks, order-flow, and the
    /// candle staleness stamp are untouched since historical data says
    /// nothing about feed freshness. Loads are tracked in their own counter,
    /// separate from live `candles_received`.
    pub fn warm_start_candles(&self, symbol: &str, history: Vec<Candle>) -> usize {
        let loaded = history.len();
        let mut candles = self.candles.write();
        let ring = candles.entry(symbol.to_string()).or_default();
        for candle in history {
            if ring.len() >= self.config.max_candles {
                ring.pop_front();
            }
            ring.push_back(candle);
        }
        self.counters
            .candles_warm_started
            .fetch_add(loaded as u64, Ordering::Relaxed);
        debug!(symbol, loaded, "warm-started candle history");
        loaded
    }

    /// Warm-start every symbol through a caller-supplied fetch function.
    ///
    /// Individual symbol failures are logged and skipped; the overall call
    /// reports how many candles were loaded and never fails for a single
    /// symbol's sake.
    pub fn warm_start_all<F>(&self, symbols: &[String], fetch: F, limit: usize) -> usize
    where
        F: Fn(&str, usize) -> Result<Vec<Candle>, HubError>,
    {
        let mut total = 0;
        for symbol in symbols {
            match fetch(symbol, limit) {
                Ok(history) => {
                    total += self.warm_start_candles(symbol, history);
                }
                Err(error) => {
                    warn!(%symbol, %error, "warm start fetch failed, skipping symbol");
                }
            }
        }
        info!(total, symbols = symbols.len(), "warm start complete");
        total
    }

    /// For each requested data type: true if no update has ever been
    /// recorded, or the most recent update is older than the threshold.
    pub fn check_staleness(
        &self,
        symbol: &str,
        thresholds: &HashMap<DataType, Duration>,
    ) -> HashMap<DataType, bool> {
        self.check_staleness_at(symbol, thresholds, Utc::now())
    }

    /// Clock-injectable staleness check, for deterministic callers and tests.
    pub fn check_staleness_at(
        &self,
        symbol: &str,
        thresholds: &HashMap<DataType, Duration>,
        now: DateTime<Utc>,
    ) -> HashMap<DataType, bool> {
        let stamps = self.stamps.read();
        let record = stamps.get(symbol).copied().unwrap_or_default();
        drop(stamps);

        thresholds
            .iter()
            .map(|(&data_type, &threshold)| {
                let stale = match record.get(data_type) {
                    None => true,
                    Some(last) => {
                        let age = now - last;
                        age > chrono::Duration::from_std(threshold)
                            .unwrap_or_else(|_| chrono::Duration::MAX)
                    }
                };
                (data_type, stale)
            })
            .collect()
    }

    /// Full diagnostics snapshot. Takes all store locks in the fixed global
    /// order so the counts are mutually consistent.
    pub fn status(&self) -> CacheStatus {
        let ticks = self.ticks.read();
        let candles = self.candles.read();
        let order_flow = self.order_flow.read();
        let stamps = self.stamps.read();

        let mut symbols: Vec<String> = ticks
            .keys()
            .chain(candles.keys())
            .chain(order_flow.keys())
            .chain(stamps.keys())
            .cloned()
            .collect();
        symbols.sort();
        symbols.dedup();

        CacheStatus {
            symbols,
            candle_counts: candles
                .iter()
                .map(|(symbol, ring)| (symbol.clone(), ring.len()))
                .collect(),
            ticks_received: self.counters.ticks_received.load(Ordering::Relaxed),
            candles_received: self.counters.candles_received.load(Ordering::Relaxed),
            candles_warm_started: self
                .counters
                .candles_warm_started
                .load(Ordering::Relaxed),
            order_flow_received: self.counters.order_flow_received.load(Ordering::Relaxed),
            ticks_served: self.counters.ticks_served.load(Ordering::Relaxed),
            candles_served: self.counters.candles_served.load(Ordering::Relaxed),
            order_flow_served: self.counters.order_flow_served.load(Ordering::Relaxed),
            last_updates: stamps.clone(),
        }
    }

    /// Drop all cached state for one symbol.
    pub fn clear_symbol(&self, symbol: &str) {
        let mut ticks = self.ticks.write();
        let mut candles = self.candles.write();
        let mut order_flow = self.order_flow.write();
        let mut stamps = self.stamps.write();

        ticks.remove(symbol);
        candles.remove(symbol);
        order_flow.remove(symbol);
        stamps.remove(symbol);
        info!(symbol, "cleared cached state");
    }

    /// Drop all cached state for every symbol. Cumulative counters are kept.
    pub fn clear_all(&self) {
        let mut ticks = self.ticks.write();
        let mut candles = self.candles.write();
        let mut order_flow = self.order_flow.write();
        let mut stamps = self.stamps.write();

        ticks.clear();
        candles.clear();
        order_flow.clear();
        stamps.clear();
        info!("cleared all cached state");
    }

    fn mark(&self, symbol: &str, data_type: DataType) {
        self.stamps
            .write()
            .entry(symbol.to_string())
            .or_default()
            .mark(data_type, Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandleSource, VolumeKind};
    use chrono::TimeZone;

    fn candle(symbol: &str, minute: u32, close: f64) -> Candle {
        let open_time = Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap();
        Candle {
            symbol: symbol.to_string(),
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            source: CandleSource::Exchange,
            volume_kind: VolumeKind::Real,
        }
    }

    fn cache_with(max_candles: usize) -> MarketDataCache {
        MarketDataCache::new(CacheConfig {
            max_candles,
            ..CacheConfig::default()
        })
    }

    #[test]
    fn test_tick_last_write_wins() {
        let cache = cache_with(200);
        assert!(cache.get_latest_tick("EURUSD").is_none());

        cache.update_tick(Tick::new("EURUSD", 1.1000, 1.1002, Utc::now()));
        cache.update_tick(Tick::new("EURUSD", 1.2000, 1.2002, Utc::now()));

        let tick = cache.get_latest_tick("EURUSD").unwrap();
        assert_eq!(tick.bid, 1.2000);
    }

    #[test]
    fn test_candle_ring_eviction() {
        let cache = cache_with(3);
        for minute in 0..5 {
            cache.update_candle(candle("EURUSD", minute, 1.10 + minute as f64 * 0.01));
        }

        let stored = cache.get_latest_candles("EURUSD", 10);
        assert_eq!(stored.len(), 3);
        // Oldest to newest, the last three inserted.
        assert_eq!(stored[0].close, 1.12);
        assert_eq!(stored[2].close, 1.14);
    }

    #[test]
    fn test_get_latest_candles_limit() {
        let cache = cache_with(200);
        for minute in 0..5 {
            cache.update_candle(candle("EURUSD", minute, 1.10 + minute as f64 * 0.01));
        }
        let last_two = cache.get_latest_candles("EURUSD", 2);
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[1].close, 1.14);
        assert!(cache.get_latest_candles("GBPUSD", 2).is_empty());
    }

    #[test]
    fn test_malformed_candle_skipped() {
        let cache = cache_with(200);
        let mut bad = candle("EURUSD", 0, 1.10);
        bad.low = 2.0;
        cache.update_candle(bad);
        assert!(cache.get_latest_candles("EURUSD", 10).is_empty());
    }

    #[test]
    fn test_staleness_absent_fresh_elapsed() {
        let cache = cache_with(200);
        let thresholds = HashMap::from([(DataType::Tick, Duration::from_secs(2))]);

        let stale = cache.check_staleness("EURUSD", &thresholds);
        assert_eq!(stale.get(&DataType::Tick), Some(&true));

        cache.update_tick(Tick::new("EURUSD", 1.10, 1.1002, Utc::now()));
        let fresh = cache.check_staleness("EURUSD", &thresholds);
        assert_eq!(fresh.get(&DataType::Tick), Some(&false));

        let later = Utc::now() + chrono::Duration::seconds(3);
        let elapsed = cache.check_staleness_at("EURUSD", &thresholds, later);
        assert_eq!(elapsed.get(&DataType::Tick), Some(&true));
    }

    #[test]
    fn test_warm_start_appends_without_dedupe() {
        let cache = cache_with(200);
        let history: Vec<Candle> = (0..4).map(|m| candle("EURUSD", m, 1.10)).collect();

        assert_eq!(cache.warm_start_candles("EURUSD", history.clone()), 4);
        assert_eq!(cache.warm_start_candles("EURUSD", history), 4);
        assert_eq!(cache.get_latest_candles("EURUSD", 100).len(), 8);

        // Warm start must not disturb staleness: candles were never "updated".
        let thresholds = HashMap::from([(DataType::Candle, Duration::from_secs(120))]);
        let stale = cache.check_staleness("EURUSD", &thresholds);
        assert_eq!(stale.get(&DataType::Candle), Some(&true));

        // Loads land in their own counter so the stored count is always
        // accounted for; the live-feed counter stays untouched.
        let status = cache.status();
        assert_eq!(status.candle_counts.get("EURUSD"), Some(&8));
        assert_eq!(status.candles_warm_started, 8);
        assert_eq!(status.candles_received, 0);
    }

    #[test]
    fn test_warm_start_all_tolerates_failures() {
        let cache = cache_with(200);
        let symbols = vec!["EURUSD".to_string(), "BROKEN".to_string(), "GBPUSD".to_string()];

        let loaded = cache.warm_start_all(
            &symbols,
            |symbol, limit| {
                if symbol == "BROKEN" {
                    Err(HubError::WarmStart {
                        symbol: symbol.to_string(),
                        reason: "db timeout".to_string(),
                    })
                } else {
                    Ok((0..limit.min(3) as u32)
                        .map(|m| candle(symbol, m, 1.10))
                        .collect())
                }
            },
            10,
        );

        assert_eq!(loaded, 6);
        assert_eq!(cache.get_latest_candles("EURUSD", 10).len(), 3);
        assert!(cache.get_latest_candles("BROKEN", 10).is_empty());
    }

    #[test]
    fn test_status_and_counters() {
        let cache = cache_with(200);
        cache.update_tick(Tick::new("EURUSD", 1.10, 1.1002, Utc::now()));
        cache.update_candle(candle("GBPUSD", 0, 1.25));
        cache.warm_start_candles("GBPUSD", vec![candle("GBPUSD", 1, 1.26)]);
        cache.get_latest_tick("EURUSD");
        cache.get_latest_tick("UNKNOWN");

        let status = cache.status();
        assert_eq!(status.symbols, vec!["EURUSD".to_string(), "GBPUSD".to_string()]);
        assert_eq!(status.candle_counts.get("GBPUSD"), Some(&2));
        assert_eq!(status.ticks_received, 1);
        assert_eq!(status.candles_received, 1);
        assert_eq!(status.candles_warm_started, 1);
        // A miss does not count as served.
        assert_eq!(status.ticks_served, 1);
        assert!(status.last_updates.get("EURUSD").unwrap().tick.is_some());
        assert!(status.last_updates.get("EURUSD").unwrap().candle.is_none());
    }

    #[test]
    fn test_clear_symbol_and_all() {
        let cache = cache_with(200);
        cache.update_tick(Tick::new("EURUSD", 1.10, 1.1002, Utc::now()));
        cache.update_tick(Tick::new("GBPUSD", 1.25, 1.2502, Utc::now()));

        cache.clear_symbol("EURUSD");
        assert!(cache.get_latest_tick("EURUSD").is_none());
        assert!(cache.get_latest_tick("GBPUSD").is_some());

        cache.clear_all();
        assert!(cache.get_latest_tick("GBPUSD").is_none());
        assert!(cache.status().symbols.is_empty());
        // Counters are cumulative and survive resets.
        assert_eq!(cache.status().ticks_received, 2);
    }
}
