//! Linearly weighted moving average of closes.
//!
//! WMA(n) = (1*C[i-n+1] + 2*C[i-n+2] + ... + n*C[i]) / (n*(n+1)/2), updated
//! in O(1) per bar from the previous weighted and plain window sums.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_wma(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let values: Vec<Option<f64>> = if period == 0 {
        vec![None; bars.len()]
    } else {
        let divisor = (period * (period + 1)) as f64 / 2.0;
        let mut weighted = 0.0;
        let mut window = 0.0;
        bars.iter()
            .enumerate()
            .map(|(i, bar)| {
                if i < period {
                    weighted += (i + 1) as f64 * bar.close;
                    window += bar.close;
                } else {
                    weighted += period as f64 * bar.close - window;
                    window += bar.close - bars[i - period].close;
                }
                (i + 1 >= period).then(|| weighted / divisor)
            })
            .collect()
    };
    IndicatorSeries::simple(IndicatorType::Wma(period), bars, values)
}
