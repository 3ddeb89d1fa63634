//! OHLCV bar representation.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub code: String,
    pub exchange: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Names accepted by [`OhlcvBar::field`].
pub const PRICE_FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

impl OhlcvBar {
    /// Look up a price field by the name used in expressions.
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "open" => Some(self.open),
            "high" => Some(self.high),
            "low" => Some(self.low),
            "close" => Some(self.close),
            "volume" => Some(self.volume as f64),
            _ => None,
        }
    }
}
