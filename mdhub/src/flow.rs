//! Rolling order-flow analytics.
//!
//! Maintains a 60-second sliding window of signed trade volume per instrument
//! plus a parallel window of same-price book deltas (OFI), and derives VWAP,
//! net delta, sweep counts, a directional bias, and a VPIN-style toxicity
//! score. Snapshots are recomputed from scratch on demand, never patched
//! incrementally.

use crate::{
    book::same_price_delta,
    config::FlowConfig,
    types::{BookLevel, FlowBias, OrderFlowSnapshot, Side},
};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone)]
struct TradeEntry {
    time: DateTime<Utc>,
    price: f64,
    size: f64,
    side: Side,
    sweep: bool,
}

/// Rolling-window order-flow calculator for one instrument.
///
/// Single-writer per instrument; publishes immutable
/// [`OrderFlowSnapshot`]s into the cache.
#[derive(Debug, Clone)]
pub struct OrderFlowCalculator {
    symbol: String,
    paired_symbol: Option<String>,
    window: chrono::Duration,
    window_std: std::time::Duration,
    trades: VecDeque<TradeEntry>,
    ofi_contributions: VecDeque<(DateTime<Utc>, f64)>,
    best_bid: Option<f64>,
    best_ask: Option<f64>,
    bid_size: f64,
    ask_size: f64,
    update_count: u64,
}

impl OrderFlowCalculator {
    pub fn new(symbol: impl Into<String>, config: FlowConfig) -> Self {
        Self {
            symbol: symbol.into(),
            paired_symbol: None,
            window: chrono::Duration::from_std(config.window)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            window_std: config.window,
            trades: VecDeque::new(),
            ofi_contributions: VecDeque::new(),
            best_bid: None,
            best_ask: None,
            bid_size: 0.0,
            ask_size: 0.0,
            update_count: 0,
        }
    }

    /// Track flow against a paired futures/alt symbol.
    pub fn with_paired_symbol(mut self, paired: impl Into<String>) -> Self {
        self.paired_symbol = Some(paired.into());
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Append a classified trade to the rolling window. The upstream feed is
    /// responsible for the aggressor side and the sweep flag.
    pub fn record_trade(
        &mut self,
        time: DateTime<Utc>,
        price: f64,
        size: f64,
        side: Side,
        sweep: bool,
    ) {
        if price <= 0.0 || size <= 0.0 {
            warn!(
                symbol = %self.symbol,
                price,
                size,
                "skipping malformed trade"
            );
            return;
        }

        self.trades.push_back(TradeEntry {
            time,
            price,
            size,
            side,
            sweep,
        });
        self.update_count += 1;
    }

    /// Feed same-price-level size deltas between two ladder snapshots into
    /// the parallel OFI window, using the book's accumulation rule.
    pub fn record_book_delta(
        &mut self,
        time: DateTime<Utc>,
        prev_bids: &[BookLevel],
        new_bids: &[BookLevel],
        prev_asks: &[BookLevel],
        new_asks: &[BookLevel],
    ) {
        let contribution = same_price_delta(prev_bids, new_bids, prev_asks, new_asks);
        if contribution != 0.0 {
            self.ofi_contributions.push_back((time, contribution));
            self.update_count += 1;
        }
    }

    /// Latest top-of-book, carried into the published snapshot.
    pub fn update_top_of_book(&mut self, bid: f64, bid_size: f64, ask: f64, ask_size: f64) {
        self.best_bid = (bid > 0.0).then_some(bid);
        self.best_ask = (ask > 0.0).then_some(ask);
        self.bid_size = bid_size.max(0.0);
        self.ask_size = ask_size.max(0.0);
    }

    /// Recompute the full snapshot from the live window. Entries older than
    /// `now - window` are dropped first.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> OrderFlowSnapshot {
        self.prune(now);

        let mut buy_volume = 0.0;
        let mut sell_volume = 0.0;
        let mut sum_pv = 0.0;
        let mut sweep_count = 0u64;

        for trade in &self.trades {
            match trade.side {
                Side::Buy => buy_volume += trade.size,
                Side::Sell => sell_volume += trade.size,
            }
            sum_pv += trade.price * trade.size;
            if trade.sweep {
                sweep_count += 1;
            }
        }

        let total_volume = buy_volume + sell_volume;
        let net_delta = buy_volume - sell_volume;
        let vwap = (total_volume > 0.0).then(|| sum_pv / total_volume);
        let ofi: f64 = self.ofi_contributions.iter().map(|(_, c)| c).sum();

        // Agreement between two independent signals is required so a single
        // noisy metric cannot flip the label.
        let bias = if net_delta > 0.0 && ofi > 0.0 {
            FlowBias::Bullish
        } else if net_delta < 0.0 && ofi < 0.0 {
            FlowBias::Bearish
        } else {
            FlowBias::Neutral
        };

        let toxicity = if total_volume > 0.0 {
            (net_delta.abs() / total_volume).min(1.0)
        } else {
            0.0
        };

        let top_size = self.bid_size + self.ask_size;
        let top_imbalance = if top_size > 0.0 {
            (self.bid_size - self.ask_size) / top_size
        } else {
            0.0
        };

        OrderFlowSnapshot {
            symbol: self.symbol.clone(),
            paired_symbol: self.paired_symbol.clone(),
            window: self.window_std,
            ofi,
            buy_volume,
            sell_volume,
            total_volume,
            net_delta,
            best_bid: self.best_bid,
            best_ask: self.best_ask,
            bid_size: self.bid_size,
            ask_size: self.ask_size,
            top_imbalance,
            sweep_count,
            vwap,
            bias,
            toxicity,
            update_count: self.update_count,
            is_stale: self.trades.is_empty() && self.ofi_contributions.is_empty(),
            time: now,
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        while self
            .trades
            .front()
            .is_some_and(|entry| entry.time < cutoff)
        {
            self.trades.pop_front();
        }
        while self
            .ofi_contributions
            .front()
            .is_some_and(|(time, _)| *time < cutoff)
        {
            self.ofi_contributions.pop_front();
        }
    }
}
