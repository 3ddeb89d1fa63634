//! Population standard deviation of closes over n bars (divides by n).
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_stddev(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let values = (0..bars.len()).map(|i| window_stats(bars, i, period).map(|(_, sd)| sd));
    IndicatorSeries::simple(IndicatorType::Stddev(period), bars, values)
}

/// Mean and population standard deviation of the `period` closes ending at
/// `end`, or `None` if fewer are available.
pub(crate) fn window_stats(bars: &[OhlcvBar], end: usize, period: usize) -> Option<(f64, f64)> {
    if period == 0 || end + 1 < period {
        return None;
    }
    let window = &bars[end + 1 - period..=end];
    let n = period as f64;
    let mean = window.iter().map(|b| b.close).sum::<f64>() / n;
    let variance = window.iter().map(|b| (b.close - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}
