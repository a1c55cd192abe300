//! Candle: the fundamental market data unit.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when constructing candles or validating a candle sequence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleError {
    #[error("candle at {timestamp} has high {high} below low {low}")]
    InvalidRange {
        timestamp: NaiveDateTime,
        high: f64,
        low: f64,
    },

    #[error("candle at {0} has a non-finite price")]
    NonFinite(NaiveDateTime),

    #[error("timestamp at index {index} does not increase on the previous candle")]
    NonIncreasingTimestamp { index: usize },
}

/// OHLC bar for a single period.
///
/// Derived ratios (`body_size`, `range`, `body_percentage`) are computed on
/// demand and never cached, so a candle is fully described by its five fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// Build a candle, rejecting non-finite prices and `high < low`.
    pub fn new(
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Result<Self, CandleError> {
        if !(open.is_finite() && high.is_finite() && low.is_finite() && close.is_finite()) {
            return Err(CandleError::NonFinite(timestamp));
        }
        if high < low {
            return Err(CandleError::InvalidRange {
                timestamp,
                high,
                low,
            });
        }
        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
        })
    }

    /// Build a candle stamped at midnight of `date` (daily and coarser series).
    pub fn on_date(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Result<Self, CandleError> {
        Self::new(date.and_time(chrono::NaiveTime::MIN), open, high, low, close)
    }

    /// `|close - open|`
    pub fn body_size(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// `high - low`
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Body as a percentage of the range. Zero-range candles report 0.
    pub fn body_percentage(&self) -> f64 {
        let range = self.range();
        if range == 0.0 {
            return 0.0;
        }
        self.body_size() / range * 100.0
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Open and close both lie inside `[low, high]`.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// Check that timestamps are strictly increasing. Gaps are allowed.
pub fn validate_sequence(candles: &[Candle]) -> Result<(), CandleError> {
    for (i, pair) in candles.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(CandleError::NonIncreasingTimestamp { index: i + 1 });
        }
    }
    Ok(())
}
