//! Level-2 order book maintainer.
//!
//! Keeps the top-10 bid/ask ladder for one instrument from sequenced depth
//! updates and derives short-horizon microstructure signals: microprice,
//! queue imbalance, and same-price order-flow imbalance (OFI).
//!
//! The structure is a monotonic sequence-gated replace-and-diff: an update
//! whose sequence does not advance past the last applied one is rejected
//! outright, which is the duplicate/out-of-order guard for an unreliable or
//! replaying upstream feed.

use crate::{
    config::BookConfig,
    types::{BookLevel, Side},
};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::debug;

/// Top-10 L2 ladder plus derived microstructure state for one instrument.
///
/// Single-writer per instrument: callers must not invoke [`OrderBook::update`]
/// concurrently for the same symbol.
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: String,
    depth: usize,
    snapshot_interval: chrono::Duration,
    last_sequence: i64,
    /// Bids sorted descending by price, at most `depth` entries.
    bids: Vec<BookLevel>,
    /// Asks sorted ascending by price, at most `depth` entries.
    asks: Vec<BookLevel>,
    prev_bids: Vec<BookLevel>,
    prev_asks: Vec<BookLevel>,
    last_snapshot_at: Option<DateTime<Utc>>,
    rejected_updates: u64,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>, config: BookConfig) -> Self {
        Self {
            symbol: symbol.into(),
            depth: config.depth,
            snapshot_interval: chrono::Duration::from_std(config.snapshot_interval)
                .unwrap_or_else(|_| chrono::Duration::milliseconds(250)),
            last_sequence: 0,
            bids: Vec::new(),
            asks: Vec::new(),
            prev_bids: Vec::new(),
            prev_asks: Vec::new(),
            last_snapshot_at: None,
            rejected_updates: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn last_sequence(&self) -> i64 {
        self.last_sequence
    }

    /// Count of updates dropped by the sequence gate.
    pub fn rejected_updates(&self) -> u64 {
        self.rejected_updates
    }

    pub fn bids(&self) -> &[BookLevel] {
        &self.bids
    }

    pub fn asks(&self) -> &[BookLevel] {
        &self.asks
    }

    /// Ladders as they stood before the last accepted update, for OFI deltas.
    pub fn previous_bids(&self) -> &[BookLevel] {
        &self.prev_bids
    }

    pub fn previous_asks(&self) -> &[BookLevel] {
        &self.prev_asks
    }

    /// Apply a sequenced depth update. Returns false (no-op) when the
    /// sequence does not advance past the last applied one.
    ///
    /// Accepted levels are filtered of non-positive price/size entries,
    /// sorted (bids descending, asks ascending) and truncated to depth.
    pub fn update(&mut self, sequence: i64, bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> bool {
        if sequence <= self.last_sequence {
            self.rejected_updates += 1;
            debug!(
                symbol = %self.symbol,
                sequence,
                last_sequence = self.last_sequence,
                "rejecting stale depth update"
            );
            return false;
        }

        self.prev_bids = std::mem::take(&mut self.bids);
        self.prev_asks = std::mem::take(&mut self.asks);

        let mut bids: Vec<BookLevel> = bids.into_iter().filter(BookLevel::is_valid).collect();
        bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(Ordering::Equal));
        bids.truncate(self.depth);

        let mut asks: Vec<BookLevel> = asks.into_iter().filter(BookLevel::is_valid).collect();
        asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal));
        asks.truncate(self.depth);

        self.bids = bids;
        self.asks = asks;
        self.last_sequence = sequence;

        true
    }

    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    pub fn spread_bps(&self) -> Option<f64> {
        let spread = self.spread()?;
        let mid = self.mid()?;
        if mid > 0.0 {
            Some(spread / mid * 10_000.0)
        } else {
            None
        }
    }

    /// Size-weighted mid: (ask·bid_size + bid·ask_size) / (bid_size + ask_size).
    ///
    /// Weighting the mid by opposing-side size is a better predictor of the
    /// next trade price than the naive mid; falls back to the simple mid when
    /// both top-of-book sizes are zero.
    pub fn microprice(&self) -> Option<f64> {
        let (bid, ask) = match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => (bid, ask),
            _ => return None,
        };

        let total_size = bid.size + ask.size;
        if total_size <= 0.0 {
            return self.mid();
        }

        Some((ask.price * bid.size + bid.price * ask.size) / total_size)
    }

    /// (Σbid size − Σask size) / (Σbid size + Σask size) over the first
    /// `n_levels`, in [-1, 1]. 0 when both sides are empty.
    pub fn queue_imbalance(&self, n_levels: usize) -> f64 {
        let bid_size: f64 = self.bids.iter().take(n_levels).map(|l| l.size).sum();
        let ask_size: f64 = self.asks.iter().take(n_levels).map(|l| l.size).sum();

        let total = bid_size + ask_size;
        if total <= 0.0 {
            return 0.0;
        }
        (bid_size - ask_size) / total
    }

    /// Same-price liquidity delta against the previous ladder snapshot:
    /// bid-side additions count positive, ask-side additions negative.
    pub fn order_flow_imbalance(&self) -> f64 {
        same_price_delta(
            &self.prev_bids,
            &self.bids,
            &self.prev_asks,
            &self.asks,
        )
    }

    /// Pacing gate for full-book broadcast/logging: true at most once per
    /// configured interval so it does not run on every tick-level update.
    pub fn should_generate_snapshot(&mut self, now: DateTime<Utc>) -> bool {
        let due = match self.last_snapshot_at {
            None => true,
            Some(last) => now - last >= self.snapshot_interval,
        };
        if due {
            self.last_snapshot_at = Some(now);
        }
        due
    }

    /// Classify a trade as a sweep when its size would consume at least two
    /// visible price levels of the opposing side.
    pub fn is_sweep(&self, side: Side, size: f64) -> bool {
        let levels = match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        };
        match levels.first() {
            Some(top) => levels.len() >= 2 && size > top.size,
            None => false,
        }
    }
}

/// Accumulate same-price-level size deltas between two ladder snapshots.
///
/// For bid levels whose price is unchanged from the previous snapshot the
/// size delta is added; for unchanged ask levels it is subtracted. Price
/// changes at a level contribute nothing directly, they are captured by the
/// level reshuffling itself.
pub fn same_price_delta(
    prev_bids: &[BookLevel],
    new_bids: &[BookLevel],
    prev_asks: &[BookLevel],
    new_asks: &[BookLevel],
) -> f64 {
    let mut delta = 0.0;

    for level in new_bids {
        if let Some(prev) = prev_bids.iter().find(|p| p.price == level.price) {
            delta += level.size - prev.size;
        }
    }
    for level in new_asks {
        if let Some(prev) = prev_asks.iter().find(|p| p.price == level.price) {
            delta -= level.size - prev.size;
        }
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn book() -> OrderBook {
        OrderBook::new("EURUSD", BookConfig::default())
    }

    fn levels(raw: &[(f64, f64)]) -> Vec<BookLevel> {
        raw.iter().map(|&(p, s)| BookLevel::new(p, s)).collect()
    }

    #[test]
    fn test_ladders_sorted_and_truncated() {
        let mut book = book();
        let bids: Vec<BookLevel> = (0..15)
            .map(|i| BookLevel::new(1.1000 - i as f64 * 0.0001, 1.0))
            .rev()
            .collect();
        let asks: Vec<BookLevel> = (0..15)
            .map(|i| BookLevel::new(1.1002 + i as f64 * 0.0001, 1.0))
            .rev()
            .collect();

        assert!(book.update(1, bids, asks));
        assert_eq!(book.bids().len(), 10);
        assert_eq!(book.asks().len(), 10);
        assert!(
            book.bids()
                .windows(2)
                .all(|w| w[0].price > w[1].price)
        );
        assert!(
            book.asks()
                .windows(2)
                .all(|w| w[0].price < w[1].price)
        );
        assert_eq!(book.best_bid().map(|l| l.price), Some(1.1000));
        assert_eq!(book.best_ask().map(|l| l.price), Some(1.1002));
    }

    #[test]
    fn test_stale_sequence_leaves_state_unchanged() {
        let mut book = book();
        assert!(book.update(5, levels(&[(1.10, 2.0)]), levels(&[(1.11, 3.0)])));

        let mid_before = book.mid();
        assert!(!book.update(5, levels(&[(9.0, 9.0)]), levels(&[(10.0, 9.0)])));
        assert!(!book.update(4, levels(&[(9.0, 9.0)]), levels(&[(10.0, 9.0)])));

        assert_eq!(book.mid(), mid_before);
        assert_eq!(book.best_bid().map(|l| l.price), Some(1.10));
        assert_eq!(book.rejected_updates(), 2);
        assert_eq!(book.last_sequence(), 5);
    }

    #[test]
    fn test_invalid_levels_dropped_individually() {
        let mut book = book();
        assert!(book.update(
            1,
            levels(&[(1.10, 2.0), (0.0, 5.0), (1.09, -1.0)]),
            levels(&[(1.11, 3.0), (-1.0, 1.0)]),
        ));
        assert_eq!(book.bids().len(), 1);
        assert_eq!(book.asks().len(), 1);
    }

    #[test]
    fn test_microprice_weighted_and_fallback() {
        let mut book = book();
        book.update(1, levels(&[(1.10, 3.0)]), levels(&[(1.12, 1.0)]));

        // (1.12*3 + 1.10*1) / 4 = 1.115
        let microprice = book.microprice().unwrap();
        assert!((microprice - 1.115).abs() < 1e-9);

        // Zero sizes survive filtering only via direct field write; emulate
        // with a fresh book whose sizes sum to zero through the fallback path.
        let mut flat = OrderBook::new("EURUSD", BookConfig::default());
        flat.bids = vec![BookLevel::new(1.10, 0.0)];
        flat.asks = vec![BookLevel::new(1.12, 0.0)];
        assert_eq!(flat.microprice(), flat.mid());
    }

    #[test]
    fn test_queue_imbalance_bounds() {
        let mut book = book();
        assert_eq!(book.queue_imbalance(1), 0.0);

        book.update(1, levels(&[(1.10, 6.0)]), levels(&[(1.11, 2.0)]));
        let imbalance = book.queue_imbalance(1);
        assert!((-1.0..=1.0).contains(&imbalance));
        assert!((imbalance - 0.5).abs() < 1e-9);

        book.update(2, levels(&[(1.10, 1.0)]), levels(&[(1.11, 3.0)]));
        assert!((book.queue_imbalance(1) + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_order_flow_imbalance_same_price_deltas() {
        let mut book = book();
        book.update(1, levels(&[(1.10, 2.0), (1.09, 4.0)]), levels(&[(1.11, 3.0)]));

        // Bid at 1.10 grows by 1.5, ask at 1.11 shrinks by 1.0, bid at 1.09
        // is replaced by a different price so it contributes nothing.
        book.update(
            2,
            levels(&[(1.10, 3.5), (1.0899, 4.0)]),
            levels(&[(1.11, 2.0)]),
        );

        let ofi = book.order_flow_imbalance();
        assert!((ofi - 2.5).abs() < 1e-9); // +1.5 bid, -(-1.0) ask
    }

    #[test]
    fn test_snapshot_pacing() {
        let mut book = OrderBook::new(
            "EURUSD",
            BookConfig {
                snapshot_interval: Duration::from_millis(250),
                ..BookConfig::default()
            },
        );

        let t0 = Utc::now();
        assert!(book.should_generate_snapshot(t0));
        assert!(!book.should_generate_snapshot(t0 + chrono::Duration::milliseconds(100)));
        assert!(book.should_generate_snapshot(t0 + chrono::Duration::milliseconds(300)));
    }

    #[test]
    fn test_sweep_classification() {
        let mut book = book();
        assert!(!book.is_sweep(Side::Buy, 100.0));

        book.update(
            1,
            levels(&[(1.10, 2.0), (1.09, 2.0)]),
            levels(&[(1.11, 2.0), (1.12, 2.0)]),
        );
        // Consumes more than the top ask level.
        assert!(book.is_sweep(Side::Buy, 3.0));
        assert!(!book.is_sweep(Side::Buy, 1.5));
        assert!(book.is_sweep(Side::Sell, 2.5));
    }
}
