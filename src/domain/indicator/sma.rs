//! Simple moving average of closes.
//!
//! SMA(n)[i] = mean(C[i-n+1..=i]), kept as a running window sum.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_sma(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    IndicatorSeries::simple(IndicatorType::Sma(period), bars, sma_values(bars, period))
}

/// Window means, `None` until `period` closes have been seen.
pub(crate) fn sma_values(bars: &[OhlcvBar], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; bars.len()];
    }
    let mut sum = 0.0;
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            sum += bar.close;
            if i >= period {
                sum -= bars[i - period].close;
            }
            (i + 1 >= period).then(|| sum / period as f64)
        })
        .collect()
}
