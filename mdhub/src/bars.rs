//! Tick-to-candle bar aggregation on minute boundaries.
//!
//! Uses event timestamps (not wall clock) for bar boundaries so backfilled or
//! replayed streams aggregate identically to live traffic. A gap of several
//! minutes finalises exactly one bar, the one that was open; intermediate
//! minutes are never synthesised.

use crate::types::{Candle, CandleSource, VolumeKind};
use chrono::{DateTime, Timelike, Utc};
use tracing::warn;

/// Floor a timestamp to its minute boundary.
pub fn floor_to_minute(time: DateTime<Utc>) -> DateTime<Utc> {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// Builds 1-minute OHLCV candles for one instrument from a price stream.
///
/// Single-writer per instrument. In [`VolumeKind::TickCount`] mode each price
/// update contributes 1 to volume as a proxy; in [`VolumeKind::Real`] mode
/// volume comes solely from [`BarAggregator::add_trade_volume`].
#[derive(Debug, Clone)]
pub struct BarAggregator {
    symbol: String,
    source: CandleSource,
    volume_kind: VolumeKind,
    current: Option<Candle>,
}

impl BarAggregator {
    pub fn new(symbol: impl Into<String>, source: CandleSource, volume_kind: VolumeKind) -> Self {
        Self {
            symbol: symbol.into(),
            source,
            volume_kind,
            current: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The bar currently being built, if any.
    pub fn current_bar(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    /// Feed one price observation. Returns the finalised candle when the
    /// observation's minute is strictly greater than the open bar's minute.
    pub fn update_price(&mut self, time: DateTime<Utc>, price: f64) -> Option<Candle> {
        if price <= 0.0 {
            warn!(symbol = %self.symbol, price, "skipping non-positive price");
            return None;
        }

        let minute = floor_to_minute(time);
        let tick_volume = match self.volume_kind {
            VolumeKind::TickCount => 1.0,
            VolumeKind::Real => 0.0,
        };

        let rolls_over = match &self.current {
            None => {
                self.current = Some(self.open_bar(minute, price, tick_volume));
                return None;
            }
            Some(bar) => minute > bar.open_time,
        };

        if rolls_over {
            // Boundary crossed: freeze the open bar and start the new one at
            // the current minute, regardless of how many minutes were skipped
            // in between.
            let next = self.open_bar(minute, price, tick_volume);
            return self.current.replace(next);
        }

        if let Some(bar) = &mut self.current {
            bar.high = bar.high.max(price);
            bar.low = bar.low.min(price);
            bar.close = price;
            bar.volume += tick_volume;
        }
        None
    }

    /// Accumulate real trade size into the current bar only; a finalised bar
    /// is never retroactively affected.
    pub fn add_trade_volume(&mut self, size: f64) {
        if size <= 0.0 {
            warn!(symbol = %self.symbol, size, "skipping non-positive trade volume");
            return;
        }
        if let Some(bar) = &mut self.current {
            bar.volume += size;
        }
    }

    fn open_bar(&self, open_time: DateTime<Utc>, price: f64, volume: f64) -> Candle {
        Candle {
            symbol: self.symbol.clone(),
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            source: self.source,
            volume_kind: self.volume_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, second).unwrap()
    }

    #[test]
    fn test_single_minute_ohlc() {
        let mut agg = BarAggregator::new("EURUSD", CandleSource::Proxy, VolumeKind::TickCount);

        assert!(agg.update_price(at(0, 1), 1.1000).is_none());
        assert!(agg.update_price(at(0, 10), 1.1050).is_none());
        assert!(agg.update_price(at(0, 30), 1.0950).is_none());
        assert!(agg.update_price(at(0, 59), 1.1020).is_none());

        // Crossing into the next minute emits exactly one candle.
        let candle = agg.update_price(at(1, 0), 1.1021).unwrap();
        assert_eq!(candle.open_time, at(0, 0));
        assert_eq!(candle.open, 1.1000);
        assert_eq!(candle.high, 1.1050);
        assert_eq!(candle.low, 1.0950);
        assert_eq!(candle.close, 1.1020);
        assert_eq!(candle.volume, 4.0); // tick-count proxy
        assert_eq!(candle.volume_kind, VolumeKind::TickCount);
        assert!(candle.is_well_formed());

        let next = agg.current_bar().unwrap();
        assert_eq!(next.open_time, at(1, 0));
        assert_eq!(next.open, 1.1021);
    }

    #[test]
    fn test_multi_minute_gap_emits_one_bar() {
        let mut agg = BarAggregator::new("EURUSD", CandleSource::Proxy, VolumeKind::TickCount);

        agg.update_price(at(0, 5), 1.10);
        let candle = agg.update_price(at(7, 30), 1.12).unwrap();

        assert_eq!(candle.open_time, at(0, 0));
        // The new bar opens at the current minute, not at a skipped one.
        assert_eq!(agg.current_bar().unwrap().open_time, at(7, 0));
    }

    #[test]
    fn test_real_volume_accumulates_into_current_bar_only() {
        let mut agg = BarAggregator::new("EURUSD", CandleSource::Exchange, VolumeKind::Real);

        agg.update_price(at(0, 1), 1.10);
        agg.add_trade_volume(250.0);
        agg.add_trade_volume(100.0);
        agg.add_trade_volume(-5.0); // ignored

        let candle = agg.update_price(at(1, 0), 1.11).unwrap();
        assert_eq!(candle.volume, 350.0);
        assert_eq!(candle.volume_kind, VolumeKind::Real);

        // Volume added after finalisation lands in the new bar.
        agg.add_trade_volume(40.0);
        assert_eq!(agg.current_bar().unwrap().volume, 40.0);
    }

    #[test]
    fn test_non_positive_price_skipped() {
        let mut agg = BarAggregator::new("EURUSD", CandleSource::Proxy, VolumeKind::TickCount);
        assert!(agg.update_price(at(0, 1), 0.0).is_none());
        assert!(agg.current_bar().is_none());

        agg.update_price(at(0, 2), 1.10);
        assert!(agg.update_price(at(0, 3), -1.0).is_none());
        assert_eq!(agg.current_bar().unwrap().close, 1.10);
    }
}
